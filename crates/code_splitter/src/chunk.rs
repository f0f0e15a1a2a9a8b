use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;
use module_graph::ModuleId;
use serde::{Deserialize, Serialize};

pub type ChunkId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChunkKind {
    Entry,
    Async,
    Common,
    Vendor,
    CacheGroup,
    Split,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: ChunkId,
    pub name: Option<String>,
    pub kind: ChunkKind,
    // in emission order
    pub modules: IndexSet<ModuleId>,
    pub size: u64,
    pub is_entry: bool,
    pub is_async: bool,
    pub parents: BTreeSet<ChunkId>,
    pub children: BTreeSet<ChunkId>,
    pub hash: String,
}

impl Chunk {
    pub(crate) fn new(id: ChunkId, kind: ChunkKind, name: Option<String>) -> Self {
        Chunk {
            id,
            name,
            kind,
            modules: IndexSet::new(),
            size: 0,
            is_entry: kind == ChunkKind::Entry,
            is_async: kind == ChunkKind::Async,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            hash: String::new(),
        }
    }

    /// The chunk's name, or `chunk-<id>` for unnamed chunks
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("chunk-{}", self.id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitResult {
    pub chunks: Vec<Chunk>,
    // module => every chunk containing it
    pub module_chunks: BTreeMap<ModuleId, BTreeSet<ChunkId>>,
}

impl SplitResult {
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn chunk_by_name(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.name.as_deref() == Some(name))
    }

    /// Lowest-numbered chunk containing the module
    pub fn primary_chunk(&self, module: &str) -> Option<ChunkId> {
        self.module_chunks
            .get(module)
            .and_then(|chunks| chunks.iter().next().copied())
    }

    pub fn oversized_chunks(&self, max_size: u64) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(move |c| c.size > max_size)
    }
}
