use crate::mapper::MapOptions;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_INPUT_PATH: &str = "input.geojson";
pub const DEFAULT_OUTPUT_PATH: &str = "output.osm";
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_SOURCE_CRS: &str = "EPSG:4326";
pub const DEFAULT_TARGET_CRS: &str = "EPSG:4326";
pub const DEFAULT_SKIP_LINES: usize = 5;

/// How features are recovered from the input text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionMode {
    /// One feature object per line after a fixed header region.
    #[default]
    Lines,
    /// Incremental JSON tokenizer, independent of formatting.
    Stream,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lines" => Ok(ExtractionMode::Lines),
            "stream" => Ok(ExtractionMode::Stream),
            other => Err(format!("unknown extraction mode '{}'", other)),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Lines => f.write_str("lines"),
            ExtractionMode::Stream => f.write_str("stream"),
        }
    }
}

/// What the progress denominator is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressEstimate {
    /// `ceil(input lines / chunk size)`, a rough proxy for the batch count.
    #[default]
    Lines,
    /// `ceil(feature lines / chunk size)` from a pre-pass over the input.
    Features,
}

/// Resolved settings of a conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    /// Maximum number of features per batch.
    pub chunk_size: usize,
    pub source_crs: String,
    pub target_crs: String,
    /// Header lines discarded before the classification line in line mode.
    pub skip_lines: usize,
    pub mode: ExtractionMode,
    pub progress: ProgressEstimate,
    pub parallel: bool,
    pub map: MapOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            source_crs: DEFAULT_SOURCE_CRS.to_string(),
            target_crs: DEFAULT_TARGET_CRS.to_string(),
            skip_lines: DEFAULT_SKIP_LINES,
            mode: ExtractionMode::default(),
            progress: ProgressEstimate::default(),
            parallel: false,
            map: MapOptions::default(),
        }
    }
}

impl ConvertOptions {
    /// Chunk size clamped to at least one feature.
    pub fn batch_limit(&self) -> usize {
        self.chunk_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConvertOptions::default();
        assert_eq!(options.chunk_size, 10_000);
        assert_eq!(options.source_crs, "EPSG:4326");
        assert_eq!(options.target_crs, "EPSG:4326");
        assert_eq!(options.skip_lines, 5);
        assert_eq!(options.mode, ExtractionMode::Lines);
        assert_eq!(options.progress, ProgressEstimate::Lines);
        assert!(!options.parallel);
        assert!(!options.map.keep_closing_vertex);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("lines".parse::<ExtractionMode>(), Ok(ExtractionMode::Lines));
        assert_eq!("stream".parse::<ExtractionMode>(), Ok(ExtractionMode::Stream));
        assert!("json".parse::<ExtractionMode>().is_err());
        assert_eq!(ExtractionMode::Stream.to_string(), "stream");
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let options = ConvertOptions {
            chunk_size: 0,
            ..ConvertOptions::default()
        };
        assert_eq!(options.batch_limit(), 1);
    }
}
