//! Source map v3 encoding and decoding.
mod consumer;
mod error;
mod generator;
mod mapping;
mod source_map;
pub mod vlq;

pub use consumer::SourceMapConsumer;
pub use error::SourceMapError;
pub use generator::SourceMapGenerator;
pub use mapping::{Mapping, Position};
pub use source_map::SourceMap;
