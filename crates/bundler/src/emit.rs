use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use code_splitter::{Chunk, ChunkId};
use module_graph::ModuleId;
use path_utils::relative_slash_path;
use serde::{Deserialize, Serialize};
use sourcemap_codec::{Mapping, Position, SourceMap, SourceMapError, SourceMapGenerator};

use crate::config::SourceMapMode;

/// The emitted code of one chunk, plus its source map when the map is not
/// inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEmission {
    pub chunk_id: ChunkId,
    pub name: String,
    pub file_name: String,
    pub code: String,
    pub map_file_name: Option<String>,
    pub map: Option<SourceMap>,
}

/// Receives emitted chunks, e.g. to write them to disk.
pub trait OutputWriter {
    fn write(&self, output_dir: &Path, emission: &ChunkEmission) -> anyhow::Result<()>;
}

pub(crate) fn chunk_file_name(chunk: &Chunk) -> String {
    let short_hash = chunk.hash.get(..8).unwrap_or(&chunk.hash);
    format!("{}.{}.js", chunk.display_name(), short_hash)
}

/// Concatenates the chunk's modules in chunk order. Every source line maps
/// to its generated line at column 0.
pub(crate) fn emit_chunk(
    chunk: &Chunk,
    sources: &BTreeMap<ModuleId, Arc<str>>,
    root: &Path,
    mode: SourceMapMode,
) -> Result<ChunkEmission, SourceMapError> {
    let file_name = chunk_file_name(chunk);
    let mut code = String::new();
    let mut generator = SourceMapGenerator::new(Some(file_name.clone()));
    let mut line_offset: u32 = 0;

    for module in chunk.modules.iter() {
        let Some(source) = sources.get(module) else {
            continue;
        };
        if source.is_empty() {
            continue;
        }
        let source_name =
            relative_slash_path(Path::new(module), root).unwrap_or_else(|| module.clone());
        let mut line_count: u32 = 0;
        for _ in source.lines() {
            line_count += 1;
            generator.add_mapping(Mapping {
                generated: Position::new(line_offset + line_count, 0),
                original: Position::new(line_count, 0),
                source: source_name.clone(),
                name: None,
            })?;
        }
        generator.set_source_content(&source_name, source);
        code.push_str(source);
        if !source.ends_with('\n') {
            code.push('\n');
        }
        line_offset += line_count;
    }

    let map_file_name = format!("{}.map", file_name);
    let (map_file_name, map) = match mode {
        SourceMapMode::None => (None, None),
        SourceMapMode::Inline => {
            let url = generator.generate().to_data_url()?;
            code.push_str(&format!("//# sourceMappingURL={}\n", url));
            (None, None)
        }
        SourceMapMode::External => {
            code.push_str(&format!("//# sourceMappingURL={}\n", map_file_name));
            (Some(map_file_name), Some(generator.generate()))
        }
        SourceMapMode::Hidden => (Some(map_file_name), Some(generator.generate())),
    };

    Ok(ChunkEmission {
        chunk_id: chunk.id,
        name: chunk.display_name(),
        file_name,
        code,
        map_file_name,
        map,
    })
}
