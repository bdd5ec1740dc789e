pub mod config;
pub mod converter;
pub mod error;
pub mod extractor;
pub mod feature;
pub mod ids;
pub mod mapper;
pub mod osm;
pub mod parallel_converter;
pub mod reproject;
pub mod stream_extractor;
pub mod writer;

pub use config::*;
pub use converter::*;
pub use error::*;
pub use extractor::*;
pub use feature::*;
pub use ids::*;
pub use mapper::*;
pub use osm::*;
pub use parallel_converter::*;
pub use reproject::*;
pub use stream_extractor::*;
pub use writer::*;
