use crate::feature::Tags;
use crate::osm::{OsmElement, OsmNode, OsmWay};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::{self, Write};

pub const OSM_VERSION: &str = "0.6";
pub const GENERATOR: &str = "geojson-to-osm";

pub fn header() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<osm version=\"{}\" generator=\"{}\">\n",
        OSM_VERSION, GENERATOR
    )
}

pub const FOOTER: &str = "</osm>\n";

/// Serializes one fragment as a single line of OSM XML, newline included.
pub fn render_element(element: &OsmElement) -> String {
    let mut out = String::new();
    match element {
        OsmElement::Node(node) => render_node(&mut out, node),
        OsmElement::Way(way) => render_way(&mut out, way),
    }
    out.push('\n');
    out
}

/// Negative zero prints as `0`.
fn coordinate(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

fn render_node(out: &mut String, node: &OsmNode) {
    let _ = write!(
        out,
        "<node id=\"{}\" lat=\"{}\" lon=\"{}\"",
        node.id,
        coordinate(node.lat),
        coordinate(node.lon)
    );
    if node.tags.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        render_tags(out, &node.tags);
        out.push_str("</node>");
    }
}

fn render_way(out: &mut String, way: &OsmWay) {
    let _ = write!(out, "<way id=\"{}\">", way.id);
    for node_ref in &way.node_refs {
        let _ = write!(out, "<nd ref=\"{}\"/>", node_ref);
    }
    render_tags(out, &way.tags);
    out.push_str("</way>");
}

fn render_tags(out: &mut String, tags: &Tags) {
    for (key, value) in tags {
        let _ = write!(out, "<tag k=\"{}\" v=\"{}\"/>", escape(key), escape(value));
    }
}

/// Incremental OSM XML document writer.
///
/// The header goes out on construction, fragments as they arrive and the
/// footer only in [`OsmXmlWriter::finish`]. A writer dropped without
/// `finish` leaves the document unterminated, which is how an aborted run
/// shows up in the output.
pub struct OsmXmlWriter<W: Write> {
    inner: W,
    nodes: u64,
    ways: u64,
}

impl<W: Write> OsmXmlWriter<W> {
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(header().as_bytes())?;
        Ok(OsmXmlWriter {
            inner,
            nodes: 0,
            ways: 0,
        })
    }

    pub fn write_element(&mut self, element: &OsmElement) -> io::Result<()> {
        match element {
            OsmElement::Node(_) => self.nodes += 1,
            OsmElement::Way(_) => self.ways += 1,
        }
        self.inner.write_all(render_element(element).as_bytes())
    }

    /// Writes text produced by [`render_element`] for `nodes` nodes and `ways` ways.
    pub fn write_rendered(&mut self, rendered: &str, nodes: u64, ways: u64) -> io::Result<()> {
        self.nodes += nodes;
        self.ways += ways;
        self.inner.write_all(rendered.as_bytes())
    }

    pub fn nodes_written(&self) -> u64 {
        self.nodes
    }

    pub fn ways_written(&self) -> u64 {
        self.ways
    }

    /// Writes the footer, flushes and hands back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(FOOTER.as_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}
