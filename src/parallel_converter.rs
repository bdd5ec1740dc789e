// Parallel GeoJSON to OSM conversion with ordered streaming output
use crate::config::ConvertOptions;
use crate::converter::{ConversionSummary, Progress};
use crate::error::{ConvertError, Result};
use crate::extractor::Batch;
use crate::ids::IdAllocator;
use crate::mapper::{element_counts, map_feature};
use crate::osm::OsmElement;
use crate::reproject::Reprojector;
use crate::writer::{OsmXmlWriter, render_element};
use log::debug;
use rayon::prelude::*;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

/// Rendered batches allowed in flight between the mapper and the writer.
const CHANNEL_DEPTH: usize = 2;

struct RenderedFeature {
    text: String,
    nodes: u64,
    ways: u64,
}

enum Message {
    Batch(Vec<RenderedFeature>),
    /// Every batch was sent; write the footer.
    Finish,
}

struct Finished<W> {
    output: W,
    nodes: u64,
    ways: u64,
}

/// Same contract and byte-identical output as
/// [`crate::converter::convert_batches`], with features mapped on the rayon
/// pool.
///
/// Ids are reserved per feature in input order before mapping, so each
/// feature gets the ids the sequential path would give it. A single output
/// thread receives rendered batches in order over a bounded channel.
pub fn convert_batches_parallel<I, W>(
    batches: I,
    output: W,
    reprojector: &Reprojector,
    options: &ConvertOptions,
    estimated_batches: usize,
) -> Result<(ConversionSummary, W)>
where
    I: IntoIterator<Item = Result<Batch>>,
    W: Write + Send + 'static,
{
    debug!(
        "Mapping features on {} worker threads",
        rayon::current_num_threads()
    );

    let (tx, rx) = mpsc::sync_channel::<Message>(CHANNEL_DEPTH);
    let output_thread = thread::spawn(move || write_messages(output, rx));

    let produced = produce(batches, &tx, reprojector, options, estimated_batches);
    drop(tx);

    let written = output_thread
        .join()
        .map_err(|_| ConvertError::WorkerPanicked)?;
    let mut summary = produced?;
    let finished = written?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::BrokenPipe,
            "output thread stopped before the document was finished",
        )
    })?;

    summary.nodes = finished.nodes;
    summary.ways = finished.ways;
    Ok((summary, finished.output))
}

fn produce<I>(
    batches: I,
    tx: &SyncSender<Message>,
    reprojector: &Reprojector,
    options: &ConvertOptions,
    estimated_batches: usize,
) -> Result<ConversionSummary>
where
    I: IntoIterator<Item = Result<Batch>>,
{
    let mut ids = IdAllocator::new();
    let mut progress = Progress::new(estimated_batches);
    let mut summary = ConversionSummary::default();

    for batch in batches {
        let batch = batch?;
        let blocks: Vec<IdAllocator> = batch
            .iter()
            .map(|feature| {
                let (nodes, ways) = element_counts(feature, options.map);
                ids.reserve(nodes, ways)
            })
            .collect();

        let rendered = batch
            .par_iter()
            .zip(blocks.into_par_iter())
            .map(|(feature, mut block)| -> Result<RenderedFeature> {
                let elements = map_feature(feature, reprojector, &mut block, options.map)?;
                Ok(render_feature(&elements))
            })
            .collect::<Result<Vec<_>>>()?;

        for feature in &batch {
            summary.record_feature(&feature.geometry);
        }
        if tx.send(Message::Batch(rendered)).is_err() {
            // the writer failed; its error is reported on join
            return Ok(summary);
        }
        summary.batches += 1;
        progress.batch_done();
    }

    // a failed send means the writer already stopped with an error
    let _ = tx.send(Message::Finish);
    Ok(summary)
}

fn render_feature(elements: &[OsmElement]) -> RenderedFeature {
    let mut rendered = RenderedFeature {
        text: String::new(),
        nodes: 0,
        ways: 0,
    };
    for element in elements {
        match element {
            OsmElement::Node(_) => rendered.nodes += 1,
            OsmElement::Way(_) => rendered.ways += 1,
        }
        rendered.text.push_str(&render_element(element));
    }
    rendered
}

fn write_messages<W: Write>(output: W, rx: Receiver<Message>) -> Result<Option<Finished<W>>> {
    let mut writer = OsmXmlWriter::new(output)?;
    for message in rx {
        match message {
            Message::Batch(features) => {
                for feature in &features {
                    writer.write_rendered(&feature.text, feature.nodes, feature.ways)?;
                }
            }
            Message::Finish => {
                let nodes = writer.nodes_written();
                let ways = writer.ways_written();
                let output = writer.finish()?;
                return Ok(Some(Finished {
                    output,
                    nodes,
                    ways,
                }));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::convert_batches;
    use crate::feature::{Coord, Feature, Geometry};

    fn sample_batches() -> Vec<Batch> {
        let mut batches = Vec::new();
        for b in 0..4 {
            let mut batch = Batch::new();
            for i in 0..25 {
                let x = f64::from(b * 100 + i);
                let geometry = match i % 4 {
                    0 => Geometry::Point(Coord::new(x, 1.0)),
                    1 => Geometry::LineString(vec![Coord::new(x, 0.0), Coord::new(x, 1.0)]),
                    2 => Geometry::Polygon(vec![
                        Coord::new(x, 0.0),
                        Coord::new(x + 1.0, 0.0),
                        Coord::new(x + 1.0, 1.0),
                        Coord::new(x, 0.0),
                    ]),
                    _ => Geometry::Other("MultiLineString".to_string()),
                };
                batch.push(Feature::new(
                    geometry,
                    vec![("ref".to_string(), format!("{}-{}", b, i))],
                ));
            }
            batches.push(batch);
        }
        batches
    }

    #[test]
    fn test_parallel_output_matches_sequential() {
        let options = ConvertOptions::default();
        let reprojector = Reprojector::identity();

        let (sequential_summary, sequential) = convert_batches(
            sample_batches().into_iter().map(Ok),
            Vec::new(),
            &reprojector,
            &options,
            4,
        )
        .unwrap();
        let (parallel_summary, parallel) = convert_batches_parallel(
            sample_batches().into_iter().map(Ok),
            Vec::new(),
            &reprojector,
            &options,
            4,
        )
        .unwrap();

        assert_eq!(sequential_summary, parallel_summary);
        assert_eq!(String::from_utf8(sequential).unwrap(), String::from_utf8(parallel).unwrap());
    }

    #[test]
    fn test_source_error_leaves_document_open() {
        let options = ConvertOptions::default();
        let mut batches: Vec<Result<Batch>> = sample_batches().into_iter().map(Ok).collect();
        batches.insert(
            1,
            Err(ConvertError::MalformedRecord {
                line: 42,
                reason: "test".to_string(),
            }),
        );

        let err = convert_batches_parallel(
            batches,
            Vec::new(),
            &Reprojector::identity(),
            &options,
            4,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedRecord { line: 42, .. }));
    }
}
