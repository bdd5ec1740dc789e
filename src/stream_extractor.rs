//! Formatting-independent feature extraction.
//!
//! Drives `serde_json`'s incremental deserializer with a custom visitor: the
//! members of the top-level object are read one by one and the `features`
//! array is consumed element by element, so only the current batch is ever
//! held in memory. Unlike [`crate::extractor::LineExtractor`] this works for
//! minified documents and features spanning many lines.

use crate::error::{ConvertError, Result};
use crate::extractor::{Batch, classify_document};
use crate::feature::Feature;
use geojson::{JsonObject, JsonValue};
use log::debug;
use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use std::cell::Cell;
use std::fmt;
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

/// Why the deserializer was stopped inside the `features` array.
enum Failure {
    /// Invalid JSON inside a record; serde_json knows the position.
    Syntax,
    /// Valid JSON that is not a feature. serde_json only reports the
    /// position after the closing bracket, so the line is taken here.
    Record { line: usize, reason: String },
    Sink(ConvertError),
}

/// Passes bytes through while counting the newlines seen so far.
///
/// `serde_json` reads a reader byte by byte and never looks past the closing
/// brace of an object, so right after an element is read the count is the
/// line that element ends on.
struct LineCounter<'l, R> {
    inner: R,
    newlines: &'l Cell<usize>,
}

impl<R: Read> Read for LineCounter<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let seen = buf[..n].iter().filter(|&&b| b == b'\n').count();
        self.newlines.set(self.newlines.get() + seen);
        Ok(n)
    }
}

struct Context<'l, F> {
    chunk_size: usize,
    batch: Batch,
    features: usize,
    sink: F,
    newlines: &'l Cell<usize>,
    failure: Option<Failure>,
}

impl<F> Context<'_, F>
where
    F: FnMut(Batch) -> Result<()>,
{
    /// 1-based line of the last byte read.
    fn line(&self) -> usize {
        self.newlines.get() + 1
    }

    fn push(&mut self, feature: Feature) -> Result<()> {
        self.features += 1;
        self.batch.push(feature);
        if self.batch.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        (self.sink)(batch)
    }
}

/// Visits the top-level object. Returns the non-`features` members when the
/// document had no `features` array, so the caller can classify them.
struct DocumentVisitor<'c, 'l, F> {
    ctx: &'c mut Context<'l, F>,
}

impl<'de, F> Visitor<'de> for DocumentVisitor<'_, '_, F>
where
    F: FnMut(Batch) -> Result<()>,
{
    type Value = (JsonObject, bool);

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a GeoJSON object")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut members = JsonObject::new();
        let mut streamed = false;
        while let Some(key) = map.next_key::<String>()? {
            if key == "features" {
                map.next_value_seed(FeaturesSeed {
                    ctx: &mut *self.ctx,
                })?;
                streamed = true;
            } else {
                let value: JsonValue = map.next_value()?;
                members.insert(key, value);
            }
        }
        Ok((members, streamed))
    }
}

struct FeaturesSeed<'c, 'l, F> {
    ctx: &'c mut Context<'l, F>,
}

impl<'de, F> DeserializeSeed<'de> for FeaturesSeed<'_, '_, F>
where
    F: FnMut(Batch) -> Result<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for FeaturesSeed<'_, '_, F>
where
    F: FnMut(Batch) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of GeoJSON features")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        loop {
            let value = match seq.next_element::<JsonValue>() {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(e) => {
                    self.ctx.failure = Some(Failure::Syntax);
                    return Err(e);
                }
            };

            let feature = match Feature::parse_value(value) {
                Ok(feature) => feature,
                Err(reason) => {
                    let reason = format!("feature #{}: {}", self.ctx.features, reason);
                    let error = de::Error::custom(&reason);
                    self.ctx.failure = Some(Failure::Record {
                        line: self.ctx.line(),
                        reason,
                    });
                    return Err(error);
                }
            };
            if let Err(err) = self.ctx.push(feature) {
                self.ctx.failure = Some(Failure::Sink(err));
                return Err(de::Error::custom("batch consumer stopped"));
            }
        }
        Ok(())
    }
}

/// Reads a whole GeoJSON document and hands its features to `sink` in
/// batches of at most `chunk_size`.
///
/// The reader should be buffered; `serde_json` reads it byte by byte.
pub fn extract_batches<R, F>(reader: R, chunk_size: usize, sink: F) -> Result<usize>
where
    R: Read,
    F: FnMut(Batch) -> Result<()>,
{
    let newlines = Cell::new(0);
    let mut ctx = Context {
        chunk_size: chunk_size.max(1),
        batch: Batch::new(),
        features: 0,
        sink,
        newlines: &newlines,
        failure: None,
    };

    let mut deserializer = serde_json::Deserializer::from_reader(LineCounter {
        inner: reader,
        newlines: &newlines,
    });
    let parsed = deserializer
        .deserialize_map(DocumentVisitor { ctx: &mut ctx })
        .and_then(|members| deserializer.end().map(|()| members));

    let (members, streamed) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            let line = e.line();
            return Err(match ctx.failure.take() {
                Some(Failure::Sink(err)) => err,
                Some(Failure::Syntax) => ConvertError::MalformedRecord {
                    line,
                    reason: e.to_string(),
                },
                Some(Failure::Record { line, reason }) => {
                    ConvertError::MalformedRecord { line, reason }
                }
                None if e.is_io() => ConvertError::Io(e.into()),
                None => ConvertError::InvalidDocumentShape {
                    line,
                    reason: e.to_string(),
                },
            });
        }
    };

    if streamed {
        match members.get("type") {
            Some(JsonValue::String(kind)) if kind != "FeatureCollection" => {
                return Err(ConvertError::InvalidDocumentShape {
                    line: 1,
                    reason: format!("\"features\" array on a document of type \"{}\"", kind),
                });
            }
            _ => {}
        }
    } else {
        for feature in classify_document(members, 1)? {
            ctx.push(feature)?;
        }
    }
    ctx.flush()?;

    debug!("Streamed {} feature(s)", ctx.features);
    Ok(ctx.features)
}

/// Runs [`extract_batches`] on a producer thread and exposes the batches as
/// an iterator.
///
/// The hand-over channel holds a single batch, so the producer never gets
/// more than one batch ahead of the consumer.
pub struct StreamExtractor {
    receiver: Option<Receiver<Result<Batch>>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamExtractor {
    pub fn spawn<R>(reader: R, chunk_size: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Result<Batch>>(1);
        let handle = thread::spawn(move || {
            let send = |batch: Batch| {
                tx.send(Ok(batch)).map_err(|_| {
                    ConvertError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "batch consumer hung up",
                    ))
                })
            };
            if let Err(err) = extract_batches(reader, chunk_size, send) {
                // the consumer may already be gone
                let _ = tx.send(Err(err));
            }
        });

        StreamExtractor {
            receiver: Some(rx),
            handle: Some(handle),
        }
    }

    fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ConvertError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Iterator for StreamExtractor {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let received = self.receiver.as_ref()?.recv();
        match received {
            Ok(Ok(batch)) => Some(Ok(batch)),
            Ok(Err(err)) => {
                self.receiver = None;
                let _ = self.join();
                Some(Err(err))
            }
            Err(_) => {
                self.receiver = None;
                self.join().err().map(Err)
            }
        }
    }
}

impl Drop for StreamExtractor {
    fn drop(&mut self) {
        // unblock the producer before waiting for it
        self.receiver = None;
        let _ = self.join();
    }
}
