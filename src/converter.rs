use crate::config::{ConvertOptions, ExtractionMode, ProgressEstimate};
use crate::error::{ConvertError, Result};
use crate::extractor::{Batch, LineExtractor, count_feature_lines};
use crate::feature::Geometry;
use crate::ids::IdAllocator;
use crate::mapper::map_feature;
use crate::parallel_converter::convert_batches_parallel;
use crate::reproject::Reprojector;
use crate::stream_extractor::StreamExtractor;
use crate::writer::OsmXmlWriter;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Counters collected over one conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub batches: usize,
    pub features: usize,
    /// Features whose geometry kind has no mapping.
    pub skipped: usize,
    pub nodes: u64,
    pub ways: u64,
}

impl ConversionSummary {
    pub(crate) fn record_feature(&mut self, geometry: &Geometry) {
        self.features += 1;
        if let Geometry::Other(kind) = geometry {
            debug!("Skipping feature with unsupported geometry type {}", kind);
            self.skipped += 1;
        }
    }
}

/// Rough number of batches a run will produce, fixed before reading starts.
pub fn estimate_total_batches(units: usize, chunk_size: usize) -> usize {
    units.div_ceil(chunk_size.max(1))
}

/// Batch progress tracker. The estimate is a proxy, so the percentage may
/// overshoot or never reach 100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    processed: usize,
    estimated: usize,
}

impl Progress {
    pub fn new(estimated: usize) -> Self {
        Progress {
            processed: 0,
            estimated,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn estimated(&self) -> usize {
        self.estimated
    }

    pub fn percent(&self) -> Option<f64> {
        if self.estimated == 0 {
            None
        } else {
            Some(self.processed as f64 / self.estimated as f64 * 100.0)
        }
    }

    /// Records one more emitted batch and logs the new percentage.
    pub fn batch_done(&mut self) {
        self.processed += 1;
        match self.percent() {
            Some(percent) => info!(
                "Progress: {:.2}% (Chunk {}/{})",
                percent, self.processed, self.estimated
            ),
            None => info!("Progress: chunk {} (no estimate)", self.processed),
        }
    }
}

/// Counts lines the way a line reader would see them, including a final
/// line without a trailing newline.
pub fn count_lines<R: BufRead>(mut reader: R) -> io::Result<usize> {
    let mut lines = 0;
    let mut last = b'\n';
    loop {
        let buffer = reader.fill_buf()?;
        if buffer.is_empty() {
            break;
        }
        lines += buffer.iter().filter(|&&b| b == b'\n').count();
        last = buffer[buffer.len() - 1];
        let len = buffer.len();
        reader.consume(len);
    }
    if last != b'\n' {
        lines += 1;
    }
    Ok(lines)
}

/// Builds the batch source for the configured extraction mode.
///
/// The document shape is checked here, before any output exists. In stream
/// mode that means waiting for the first batch; a document that is not a
/// collection reports its shape error as the first item.
pub fn batch_source<R>(
    reader: R,
    options: &ConvertOptions,
) -> Result<Box<dyn Iterator<Item = Result<Batch>>>>
where
    R: BufRead + Send + 'static,
{
    let source: Box<dyn Iterator<Item = Result<Batch>>> = match options.mode {
        ExtractionMode::Lines => Box::new(LineExtractor::new(
            reader,
            options.batch_limit(),
            options.skip_lines,
        )?),
        ExtractionMode::Stream => {
            let mut extractor = StreamExtractor::spawn(reader, options.batch_limit());
            let first = match extractor.next() {
                Some(Err(err @ ConvertError::InvalidDocumentShape { .. })) => return Err(err),
                first => first,
            };
            Box::new(first.into_iter().chain(extractor))
        }
    };
    Ok(source)
}

/// Maps every feature of every batch and writes the fragments immediately.
///
/// The header is written before the first batch is pulled and the footer
/// after the last one. Any error returns early, leaving the document
/// without its closing root element.
pub fn convert_batches<I, W>(
    batches: I,
    output: W,
    reprojector: &Reprojector,
    options: &ConvertOptions,
    estimated_batches: usize,
) -> Result<(ConversionSummary, W)>
where
    I: IntoIterator<Item = Result<Batch>>,
    W: Write,
{
    let mut writer = OsmXmlWriter::new(output)?;
    let mut ids = IdAllocator::new();
    let mut progress = Progress::new(estimated_batches);
    let mut summary = ConversionSummary::default();

    for batch in batches {
        let batch = batch?;
        debug!("Converting batch of {} feature(s)", batch.len());
        for feature in &batch {
            for element in map_feature(feature, reprojector, &mut ids, options.map)? {
                writer.write_element(&element)?;
            }
            summary.record_feature(&feature.geometry);
        }
        summary.batches += 1;
        progress.batch_done();
    }

    summary.nodes = writer.nodes_written();
    summary.ways = writer.ways_written();
    let output = writer.finish()?;
    Ok((summary, output))
}

/// Runs a whole conversion over an already opened reader and writer.
pub fn convert_reader<R, W>(
    reader: R,
    output: W,
    options: &ConvertOptions,
    estimated_batches: usize,
) -> Result<(ConversionSummary, W)>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let batches = batch_source(reader, options)?;
    let reprojector = Reprojector::new(&options.source_crs, &options.target_crs)?;
    run_batches(batches, output, &reprojector, options, estimated_batches)
}

fn run_batches<W>(
    batches: Box<dyn Iterator<Item = Result<Batch>>>,
    output: W,
    reprojector: &Reprojector,
    options: &ConvertOptions,
    estimated_batches: usize,
) -> Result<(ConversionSummary, W)>
where
    W: Write + Send + 'static,
{
    if options.parallel {
        convert_batches_parallel(batches, output, reprojector, options, estimated_batches)
    } else {
        convert_batches(batches, output, reprojector, options, estimated_batches)
    }
}

fn check_input(input_path: &Path) -> Result<u64> {
    let metadata = fs::metadata(input_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ConvertError::InputNotFound {
            path: input_path.to_path_buf(),
        },
        _ => ConvertError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(ConvertError::InputNotFound {
            path: input_path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(ConvertError::EmptyInput {
            path: input_path.to_path_buf(),
        });
    }
    Ok(metadata.len())
}

/// Converts the GeoJSON file at `input_path` into an OSM XML file at `output_path`.
pub fn convert_file(
    input_path: &Path,
    output_path: &Path,
    options: &ConvertOptions,
) -> Result<ConversionSummary> {
    let start = Instant::now();
    let file_size = check_input(input_path)?;
    info!(
        "GeoJSON file size: {:.2} MB",
        file_size as f64 / (1024.0 * 1024.0)
    );

    let units = match options.progress {
        ProgressEstimate::Lines => {
            let lines = count_lines(BufReader::new(File::open(input_path)?))?;
            info!("Lines in file: {}", lines);
            lines
        }
        ProgressEstimate::Features => {
            let features =
                count_feature_lines(BufReader::new(File::open(input_path)?), options.skip_lines)?;
            info!("Feature lines in file: {}", features);
            features
        }
    };
    let estimated_batches = estimate_total_batches(units, options.batch_limit());

    let reader = BufReader::new(File::open(input_path)?);
    let batches = batch_source(reader, options)?;
    let reprojector = Reprojector::new(&options.source_crs, &options.target_crs)?;

    // only created once the document shape and CRS pair are known to be good
    let output = BufWriter::new(File::create(output_path)?);
    let (summary, _) = run_batches(batches, output, &reprojector, options, estimated_batches)?;

    info!("Number of chunks: {}", summary.batches);
    if summary.skipped > 0 {
        warn!(
            "Skipped {} feature(s) with unsupported geometry types",
            summary.skipped
        );
    }
    info!(
        "Conversion complete: {} features, {} nodes, {} ways written to {}",
        summary.features,
        summary.nodes,
        summary.ways,
        output_path.display()
    );
    info!(
        "Total conversion time: {:.3} seconds",
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_total_batches(0, 10), 0);
        assert_eq!(estimate_total_batches(10, 10), 1);
        assert_eq!(estimate_total_batches(11, 10), 2);
        assert_eq!(estimate_total_batches(11, 0), 11);
        assert_eq!(estimate_total_batches(5, usize::MAX), 1);
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = Progress::new(4);
        assert_eq!(progress.percent(), Some(0.0));
        progress.batch_done();
        assert_eq!(progress.percent(), Some(25.0));
        progress.batch_done();
        progress.batch_done();
        progress.batch_done();
        progress.batch_done();
        assert_eq!(progress.processed(), 5);
        assert_eq!(progress.percent(), Some(125.0));

        let mut unknown = Progress::new(0);
        unknown.batch_done();
        assert_eq!(unknown.percent(), None);
        assert_eq!(unknown.estimated(), 0);
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(Cursor::new("")).unwrap(), 0);
        assert_eq!(count_lines(Cursor::new("a\nb\n")).unwrap(), 2);
        assert_eq!(count_lines(Cursor::new("a\nb")).unwrap(), 2);
        assert_eq!(count_lines(Cursor::new("\n\n\n")).unwrap(), 3);
    }

    #[test]
    fn test_zero_batches_still_framed() {
        let options = ConvertOptions {
            skip_lines: 0,
            ..ConvertOptions::default()
        };
        let (summary, output) = convert_reader(
            Cursor::new("{\"type\":\"FeatureCollection\",\"features\":[]}\n"),
            Vec::new(),
            &options,
            1,
        )
        .unwrap();
        assert_eq!(summary, ConversionSummary::default());
        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(text.ends_with("</osm>\n"));
    }

    #[test]
    fn test_unsupported_geometry_counted_as_skipped() {
        let options = ConvertOptions {
            skip_lines: 0,
            ..ConvertOptions::default()
        };
        let input = "{\"type\":\"FeatureCollection\",\"features\":[\
            {\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"MultiPoint\",\"coordinates\":[[0,0]]}},\
            {\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"Point\",\"coordinates\":[1,1]}}]}\n";
        let (summary, _) = convert_reader(Cursor::new(input), Vec::new(), &options, 1).unwrap();
        assert_eq!(summary.features, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.nodes, 1);
        assert_eq!(summary.ways, 0);
    }

    #[test]
    fn test_stream_source_reports_shape_before_output() {
        let options = ConvertOptions {
            mode: ExtractionMode::Stream,
            ..ConvertOptions::default()
        };
        let err = batch_source(Cursor::new("{\"type\":\"Topology\"}"), &options)
            .err()
            .unwrap();
        assert!(matches!(err, ConvertError::InvalidDocumentShape { line: 1, .. }));

        let options = ConvertOptions {
            chunk_size: 1,
            ..options
        };
        let input = "{\"type\":\"FeatureCollection\",\"features\":[\
            {\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"Point\",\"coordinates\":[0,0]}},\
            {\"type\":\"Feature\",\"properties\":{},\"geometry\":{\"type\":\"Point\",\"coordinates\":[1,1]}}]}";
        let sizes: Vec<usize> = batch_source(Cursor::new(input), &options)
            .unwrap()
            .map(|batch| batch.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![1, 1]);
    }
}
