use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::error::SourceMapError;
use crate::mapping::{Mapping, Position};
use crate::source_map::SourceMap;
use crate::vlq;

/// Collects mappings and encodes them into a [SourceMap].
///
/// Sources and names are indexed in the order they are first seen.
#[derive(Debug, Default, Clone)]
pub struct SourceMapGenerator {
    file: Option<String>,
    mappings: Vec<Mapping>,
    sources: IndexSet<String>,
    names: IndexSet<String>,
    source_contents: BTreeMap<String, String>,
}

impl SourceMapGenerator {
    pub fn new(file: Option<String>) -> Self {
        SourceMapGenerator {
            file,
            ..Default::default()
        }
    }

    pub fn add_mapping(&mut self, mapping: Mapping) -> Result<(), SourceMapError> {
        if mapping.generated.line == 0 || mapping.original.line == 0 {
            return Err(SourceMapError::ZeroLine);
        }
        self.sources.insert(mapping.source.clone());
        if let Some(name) = &mapping.name {
            self.names.insert(name.clone());
        }
        self.mappings.push(mapping);
        Ok(())
    }

    pub fn set_source_content(&mut self, source: &str, content: &str) {
        self.sources.insert(source.to_string());
        self.source_contents
            .insert(source.to_string(), content.to_string());
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn generate(&self) -> SourceMap {
        let mut sorted: Vec<&Mapping> = self.mappings.iter().collect();
        // stable, so mappings at the same position keep insertion order
        sorted.sort_by_key(|m| m.generated);

        let mut encoded = String::new();
        let mut previous_generated = Position::new(1, 0);
        let mut previous_source: i64 = 0;
        let mut previous_original_line: i64 = 0;
        let mut previous_original_column: i64 = 0;
        let mut previous_name: i64 = 0;
        let mut first_in_line = true;

        for mapping in sorted {
            while previous_generated.line < mapping.generated.line {
                encoded.push(';');
                previous_generated.line += 1;
                previous_generated.column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                encoded.push(',');
            }
            first_in_line = false;

            vlq::encode(
                i64::from(mapping.generated.column) - i64::from(previous_generated.column),
                &mut encoded,
            );
            previous_generated.column = mapping.generated.column;

            let source = self.sources.get_index_of(&mapping.source).unwrap_or(0) as i64;
            vlq::encode(source - previous_source, &mut encoded);
            previous_source = source;

            // stored 0-based in the encoded stream
            let original_line = i64::from(mapping.original.line) - 1;
            vlq::encode(original_line - previous_original_line, &mut encoded);
            previous_original_line = original_line;

            let original_column = i64::from(mapping.original.column);
            vlq::encode(original_column - previous_original_column, &mut encoded);
            previous_original_column = original_column;

            if let Some(name) = &mapping.name {
                let name = self.names.get_index_of(name).unwrap_or(0) as i64;
                vlq::encode(name - previous_name, &mut encoded);
                previous_name = name;
            }
        }

        let sources_content = if self.source_contents.is_empty() {
            Vec::new()
        } else {
            self.sources
                .iter()
                .map(|s| self.source_contents.get(s).cloned())
                .collect()
        };

        SourceMap {
            version: 3,
            file: self.file.clone(),
            sources: self.sources.iter().cloned().collect(),
            sources_content,
            names: self.names.iter().cloned().collect(),
            mappings: encoded,
        }
    }
}
