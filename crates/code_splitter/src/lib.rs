//! Splits a shaken module graph into loadable chunks.
mod chunk;
mod config;
mod splitter;


pub use chunk::{Chunk, ChunkId, ChunkKind, SplitResult};
pub use config::{
    CacheGroup, CacheGroupJSONConfig, CacheGroupTest, ModulePredicate, SplitConfig,
    SplitConfigError, SplitJSONConfig, DEFAULT_COMMON_CHUNK_NAME, DEFAULT_VENDOR_CHUNK_NAME,
};
pub use splitter::split;
