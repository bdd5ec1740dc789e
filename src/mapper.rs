use crate::error::Result;
use crate::feature::{Coord, Feature, Geometry, Tags};
use crate::ids::IdAllocator;
use crate::osm::{OsmElement, OsmNode, OsmWay};
use crate::reproject::Reprojector;

/// Options that change how geometries become nodes and ways.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapOptions {
    /// Emit the repeated closing position of a ring as its own node instead
    /// of closing the way by reference to the first node.
    pub keep_closing_vertex: bool,
}

/// Converts one feature into OSM fragments, in emission order.
///
/// Nodes always come before the way that references them. Node and way ids
/// are taken from `ids` in that same order. Unsupported geometries yield no
/// fragments and consume no ids.
pub fn map_feature(
    feature: &Feature,
    reprojector: &Reprojector,
    ids: &mut IdAllocator,
    options: MapOptions,
) -> Result<Vec<OsmElement>> {
    let mut elements = Vec::new();

    match &feature.geometry {
        Geometry::Point(coord) => {
            let node = make_node(*coord, feature.tags.clone(), reprojector, ids)?;
            elements.push(OsmElement::Node(node));
        }
        Geometry::LineString(coords) => {
            if let Some(refs) = push_nodes(coords, reprojector, ids, &mut elements)? {
                push_way(refs, &feature.tags, ids, &mut elements);
            }
        }
        Geometry::Polygon(ring) => {
            push_ring(ring, &feature.tags, reprojector, ids, options, &mut elements)?;
        }
        Geometry::MultiPolygon(rings) => {
            for ring in rings {
                push_ring(ring, &feature.tags, reprojector, ids, options, &mut elements)?;
            }
        }
        Geometry::Other(_) => {}
    }

    Ok(elements)
}

/// Predicts how many node and way ids `map_feature` will consume.
pub fn element_counts(feature: &Feature, options: MapOptions) -> (usize, usize) {
    match &feature.geometry {
        Geometry::Point(_) => (1, 0),
        Geometry::LineString(coords) if coords.is_empty() => (0, 0),
        Geometry::LineString(coords) => (coords.len(), 1),
        Geometry::Polygon(ring) => ring_counts(ring, options),
        Geometry::MultiPolygon(rings) => rings.iter().fold((0, 0), |(nodes, ways), ring| {
            let (n, w) = ring_counts(ring, options);
            (nodes + n, ways + w)
        }),
        Geometry::Other(_) => (0, 0),
    }
}

fn ring_counts(ring: &[Coord], options: MapOptions) -> (usize, usize) {
    let vertices = ring_vertices(ring, options);
    if vertices.is_empty() {
        (0, 0)
    } else {
        (vertices.len(), 1)
    }
}

/// Positions of a ring that become nodes.
///
/// GeoJSON rings repeat their first position at the end; that copy is
/// dropped unless asked for, since the way is closed by reference anyway.
fn ring_vertices(ring: &[Coord], options: MapOptions) -> &[Coord] {
    match ring {
        [first, .., last] if !options.keep_closing_vertex && first == last => {
            &ring[..ring.len() - 1]
        }
        _ => ring,
    }
}

fn make_node(
    coord: Coord,
    tags: Tags,
    reprojector: &Reprojector,
    ids: &mut IdAllocator,
) -> Result<OsmNode> {
    let projected = reprojector.reproject(coord)?;
    Ok(OsmNode {
        id: ids.next_node_id(),
        lat: projected.y,
        lon: projected.x,
        tags,
    })
}

/// Emits an untagged node per coordinate and returns their references,
/// or `None` when there is nothing to emit.
fn push_nodes(
    coords: &[Coord],
    reprojector: &Reprojector,
    ids: &mut IdAllocator,
    elements: &mut Vec<OsmElement>,
) -> Result<Option<Vec<i64>>> {
    if coords.is_empty() {
        return Ok(None);
    }

    let mut refs = Vec::with_capacity(coords.len() + 1);
    for coord in coords {
        let node = make_node(*coord, Tags::new(), reprojector, ids)?;
        refs.push(node.id);
        elements.push(OsmElement::Node(node));
    }
    Ok(Some(refs))
}

fn push_way(node_refs: Vec<i64>, tags: &Tags, ids: &mut IdAllocator, elements: &mut Vec<OsmElement>) {
    elements.push(OsmElement::Way(OsmWay {
        id: ids.next_way_id(),
        node_refs,
        tags: tags.clone(),
    }));
}

fn push_ring(
    ring: &[Coord],
    tags: &Tags,
    reprojector: &Reprojector,
    ids: &mut IdAllocator,
    options: MapOptions,
    elements: &mut Vec<OsmElement>,
) -> Result<()> {
    let vertices = ring_vertices(ring, options);
    if let Some(mut refs) = push_nodes(vertices, reprojector, ids, elements)? {
        let first = refs[0];
        refs.push(first);
        push_way(refs, tags, ids, elements);
    }
    Ok(())
}
