//! Line-per-record feature extraction.
//!
//! The input is expected to be pretty-printed with one feature object per
//! line, like the output of `ogr2ogr -f GeoJSON`:
//!
//! ```text
//! {
//! "type": "FeatureCollection",
//! "name": "parcels",
//! "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
//! "features": [
//! { "type": "Feature", "properties": { ... }, "geometry": { ... } },
//! { "type": "Feature", "properties": { ... }, "geometry": { ... } }
//! ]
//! }
//! ```
//!
//! A fixed number of header lines is skipped, the next line decides the
//! document shape and every following line that starts with `{` is parsed as
//! one feature. Features spanning several lines are not supported in this
//! mode; see [`crate::stream_extractor`] for a tokenizer that does not care
//! about formatting.

use crate::error::{ConvertError, Result};
use crate::feature::{Feature, Geometry};
use geojson::{JsonObject, JsonValue};
use log::debug;
use std::collections::VecDeque;
use std::io::{BufRead, Lines};

/// Features handed from the extractor to the emission controller in one go.
pub type Batch = Vec<Feature>;

/// Features found while classifying the top-level document.
///
/// `FeatureCollection` documents usually carry their features on the lines
/// that follow; an inline `features` array is returned here as well.
pub(crate) fn classify_document(object: JsonObject, line: usize) -> Result<Vec<Feature>> {
    let shape_error = |reason: String| ConvertError::InvalidDocumentShape { line, reason };

    let kind = match object.get("type") {
        Some(JsonValue::String(kind)) => kind.clone(),
        Some(other) => return Err(shape_error(format!("\"type\" is not a string: {}", other))),
        None => return Err(shape_error("missing \"type\" member".to_string())),
    };

    match kind.as_str() {
        "FeatureCollection" => match object.get("features") {
            None => Ok(Vec::new()),
            Some(JsonValue::Array(features)) => features
                .iter()
                .map(|value| Feature::from_json_value(value.clone(), line))
                .collect(),
            Some(_) => Err(shape_error("\"features\" is not an array".to_string())),
        },
        "Feature" => {
            let feature = Feature::parse_value(JsonValue::Object(object)).map_err(shape_error)?;
            Ok(vec![feature])
        }
        "Point" | "LineString" | "Polygon" | "MultiPolygon" => {
            let geometry = geojson::Geometry::from_json_value(JsonValue::Object(object))
                .map_err(|e| shape_error(e.to_string()))?;
            let geometry = Geometry::from_geojson(geometry).map_err(shape_error)?;
            Ok(vec![Feature::untagged(geometry)])
        }
        other => Err(shape_error(format!(
            "unsupported GeoJSON structure or type \"{}\"",
            other
        ))),
    }
}

/// Prepares the classification line for parsing.
///
/// One trailing comma is dropped, and a bare `"key": value` member line is
/// wrapped into an object so that e.g. `"type": "FeatureCollection",`
/// classifies.
fn classification_text(line: &str) -> String {
    let trimmed = line.trim();
    let body = trimmed.strip_suffix(',').unwrap_or(trimmed);
    if body.starts_with('"') {
        format!("{{{}}}", body)
    } else {
        body.to_string()
    }
}

fn classify_line(line: &str, line_no: usize) -> Result<Vec<Feature>> {
    let value: JsonValue = serde_json::from_str(&classification_text(line)).map_err(|e| {
        ConvertError::InvalidDocumentShape {
            line: line_no,
            reason: format!("incorrect structure: {}", e),
        }
    })?;
    match value {
        JsonValue::Object(object) => classify_document(object, line_no),
        other => Err(ConvertError::InvalidDocumentShape {
            line: line_no,
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

enum LineOutcome {
    Continue,
    EndOfDocument,
}

/// Pulls feature batches out of a line-structured GeoJSON document.
///
/// The document shape is classified in [`LineExtractor::new`], so a bad
/// document is rejected before the caller writes anything. Iteration then
/// yields batches of at most `chunk_size` features; a fatal error is yielded
/// once and ends the iteration.
pub struct LineExtractor<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
    chunk_size: usize,
    pending: VecDeque<Batch>,
    current: Batch,
    features_read: usize,
    done: bool,
}

impl<R: BufRead> LineExtractor<R> {
    pub fn new(reader: R, chunk_size: usize, skip_lines: usize) -> Result<Self> {
        let mut extractor = LineExtractor {
            lines: reader.lines(),
            line_no: 0,
            chunk_size: chunk_size.max(1),
            pending: VecDeque::new(),
            current: Batch::new(),
            features_read: 0,
            done: false,
        };

        for _ in 0..skip_lines {
            if extractor.next_line()?.is_none() {
                debug!("Input ended inside the {} header lines", skip_lines);
                extractor.done = true;
                return Ok(extractor);
            }
        }

        match extractor.next_line()? {
            Some(line) => {
                let features = classify_line(&line, extractor.line_no)?;
                debug!(
                    "Classification line {} yielded {} feature(s)",
                    extractor.line_no,
                    features.len()
                );
                extractor.features_read += features.len();
                extractor.queue(features);
            }
            None => extractor.done = true,
        }

        Ok(extractor)
    }

    /// Number of features parsed so far.
    pub fn features_read(&self) -> usize {
        self.features_read
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    fn queue(&mut self, features: Vec<Feature>) {
        let mut features = features.into_iter().peekable();
        while features.peek().is_some() {
            self.pending
                .push_back(features.by_ref().take(self.chunk_size).collect());
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_no += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn handle_line(&mut self, line: &str) -> Result<LineOutcome> {
        let trimmed = line.trim();
        if trimmed == "]" {
            return Ok(LineOutcome::EndOfDocument);
        }

        let record = match trimmed {
            "}," | "}" => &trimmed[..trimmed.len() - 1],
            _ => trimmed,
        };
        if record.starts_with('{') {
            let record = record.strip_suffix(',').unwrap_or(record);
            let feature = Feature::from_json_str(record, self.line_no)?;
            self.current.push(feature);
            self.features_read += 1;
        }
        Ok(LineOutcome::Continue)
    }

    fn take_current(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }
}

impl<R: BufRead> Iterator for LineExtractor<R> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(batch) = self.pending.pop_front() {
            return Some(Ok(batch));
        }

        while !self.done {
            let line = match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    // input ended without a closing `]`
                    self.done = true;
                    return self.take_current().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            match self.handle_line(&line) {
                Ok(LineOutcome::Continue) => {
                    if self.current.len() >= self.chunk_size {
                        return self.take_current().map(Ok);
                    }
                }
                Ok(LineOutcome::EndOfDocument) => {
                    self.done = true;
                    return self.take_current().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    self.current.clear();
                    return Some(Err(e));
                }
            }
        }

        None
    }
}

/// Counts the lines the line extractor would parse as features.
pub fn count_feature_lines<R: BufRead>(reader: R, skip_lines: usize) -> std::io::Result<usize> {
    let mut count = 0;
    for line in reader.lines().skip(skip_lines) {
        let line = line?;
        let trimmed = line.trim();
        if trimmed == "]" {
            break;
        }
        if trimmed.starts_with('{') {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "{\n\"type\": \"FeatureCollection\",\n\"name\": \"test\",\n\"crs\": { \"type\": \"name\", \"properties\": { \"name\": \"urn:ogc:def:crs:OGC:1.3:CRS84\" } },\n\"features\": [\n";

    fn point_line(i: usize) -> String {
        format!(
            "{{ \"type\": \"Feature\", \"properties\": {{ \"id\": {} }}, \"geometry\": {{ \"type\": \"Point\", \"coordinates\": [ {}, 1.0 ] }} }}",
            i, i
        )
    }

    fn collection(count: usize) -> String {
        let lines: Vec<String> = (0..count).map(point_line).collect();
        format!("{}{}\n]\n}}\n", HEADER, lines.join(",\n"))
    }

    fn batch_sizes(text: &str, chunk_size: usize) -> Vec<usize> {
        LineExtractor::new(Cursor::new(text.to_string()), chunk_size, 5)
            .unwrap()
            .map(|batch| batch.unwrap().len())
            .collect()
    }

    #[test]
    fn test_first_feature_line_classifies_as_feature() {
        // line 6 is the first feature, yielded on its own
        assert_eq!(batch_sizes(&collection(5), 2), vec![1, 2, 2]);
        assert_eq!(batch_sizes(&collection(5), 100), vec![1, 4]);
    }

    #[test]
    fn test_feature_order_preserved() {
        let tags: Vec<String> = LineExtractor::new(Cursor::new(collection(7)), 3, 5)
            .unwrap()
            .flat_map(|batch| batch.unwrap())
            .map(|feature| feature.tags[0].1.clone())
            .collect();
        let expected: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_member_line_classifies_collection() {
        let text = format!(
            "{{\n\"type\": \"FeatureCollection\",\n\"features\": [\n{},\n{}\n]\n}}\n",
            point_line(0),
            point_line(1)
        );
        let extractor = LineExtractor::new(Cursor::new(text), 10, 1).unwrap();
        let batches: Vec<Batch> = extractor.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn test_bare_geometry_without_skip() {
        let text = "{\"type\":\"Point\",\"coordinates\":[10,20]}\n";
        let batches: Vec<Batch> = LineExtractor::new(Cursor::new(text), 10, 0)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].geometry, Geometry::Point(crate::feature::Coord::new(10.0, 20.0)));
        assert!(batches[0][0].tags.is_empty());
    }

    #[test]
    fn test_inline_feature_collection_is_chunked() {
        let text = format!(
            "{{\"type\":\"FeatureCollection\",\"features\":[{},{},{}]}}\n",
            point_line(0),
            point_line(1),
            point_line(2)
        );
        assert_eq!(
            LineExtractor::new(Cursor::new(text), 2, 0)
                .unwrap()
                .map(|b| b.unwrap().len())
                .collect::<Vec<_>>(),
            vec![2, 1]
        );
    }

    #[test]
    fn test_unsupported_shape_rejected_eagerly() {
        let text = "{\"type\":\"MultiPoint\",\"coordinates\":[[1,2]]}\n";
        let err = LineExtractor::new(Cursor::new(text), 10, 0).err().unwrap();
        assert!(matches!(err, ConvertError::InvalidDocumentShape { line: 1, .. }));

        let text = "x\nnot json at all\n";
        let err = LineExtractor::new(Cursor::new(text), 10, 1).err().unwrap();
        assert!(matches!(err, ConvertError::InvalidDocumentShape { line: 2, .. }));
    }

    #[test]
    fn test_input_shorter_than_header_is_empty() {
        assert!(batch_sizes("{\n\"type\": \"FeatureCollection\",\n", 10).is_empty());
        assert!(batch_sizes("", 10).is_empty());
    }

    #[test]
    fn test_malformed_record_stops_iteration() {
        let text = format!("{}{},\n{{ \"type\": \"Feature\", oops }},\n{}\n]\n}}\n", HEADER, point_line(0), point_line(2));
        let mut extractor = LineExtractor::new(Cursor::new(text), 10, 5).unwrap();

        assert_eq!(extractor.next().unwrap().unwrap().len(), 1);
        let err = extractor.next().unwrap().unwrap_err();
        assert!(matches!(err, ConvertError::MalformedRecord { line: 7, .. }));
        assert!(extractor.next().is_none());
    }

    #[test]
    fn test_lines_after_closing_bracket_ignored() {
        let text = format!("{}{},\n{}\n]\n{}\n}}\n", HEADER, point_line(0), point_line(1), point_line(2));
        assert_eq!(batch_sizes(&text, 10), vec![1, 1]);
    }

    #[test]
    fn test_missing_closing_bracket_still_flushes() {
        let text = format!("{}{},\n{},\n{}\n", HEADER, point_line(0), point_line(1), point_line(2));
        assert_eq!(batch_sizes(&text, 10), vec![1, 2]);
    }

    #[test]
    fn test_count_feature_lines() {
        let count = count_feature_lines(Cursor::new(collection(6)), 5).unwrap();
        assert_eq!(count, 6);
    }
}
