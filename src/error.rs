//! Error taxonomy of a conversion run.
//!
//! Every variant is fatal: the run stops at the first error and the output
//! document is left without its closing `</osm>`. Unsupported geometries are
//! not errors, they are skipped by the mapper.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input path does not resolve to a file.
    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// The input file has zero bytes.
    #[error("input file is empty: {}", path.display())]
    EmptyInput { path: PathBuf },

    /// The top-level document is not a FeatureCollection, Feature or supported geometry.
    #[error("invalid GeoJSON document shape at line {line}: {reason}")]
    InvalidDocumentShape { line: usize, reason: String },

    /// A record expected to hold one feature could not be parsed.
    #[error("malformed feature record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A CRS identifier does not resolve to a projection definition.
    #[error("invalid CRS '{crs}': not a known EPSG code or proj4 definition")]
    InvalidCrs { crs: String },

    #[error("coordinate transform failed: {reason}")]
    Projection { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
