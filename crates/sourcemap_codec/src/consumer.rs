use crate::error::SourceMapError;
use crate::mapping::{Mapping, Position};
use crate::source_map::SourceMap;
use crate::vlq;

/// Decoded view of a [SourceMap] supporting position lookups in both directions.
#[derive(Debug, Clone)]
pub struct SourceMapConsumer {
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    // sorted by generated position
    mappings: Vec<Mapping>,
}

fn index_into<'a>(
    table: &'a [String],
    index: i64,
    kind: &'static str,
) -> Result<&'a String, SourceMapError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| table.get(i))
        .ok_or(SourceMapError::OutOfRange { kind, value: index })
}

fn to_u32(value: i64, kind: &'static str) -> Result<u32, SourceMapError> {
    u32::try_from(value).map_err(|_| SourceMapError::OutOfRange { kind, value })
}

impl SourceMapConsumer {
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        Self::new(&SourceMap::from_json(json)?)
    }

    pub fn new(map: &SourceMap) -> Result<Self, SourceMapError> {
        let mut mappings = Vec::new();
        let mut source: i64 = 0;
        let mut original_line: i64 = 0;
        let mut original_column: i64 = 0;
        let mut name: i64 = 0;

        for (line_index, line) in map.mappings.split(';').enumerate() {
            let generated_line = to_u32(line_index as i64 + 1, "generated line")?;
            let mut generated_column: i64 = 0;
            for segment in line.split(',').filter(|s| !s.is_empty()) {
                let fields = vlq::decode(segment)?;
                match fields.len() {
                    // generated column only, no original location
                    1 => {
                        generated_column += fields[0];
                        to_u32(generated_column, "generated column")?;
                        continue;
                    }
                    4 | 5 => {}
                    n => {
                        return Err(SourceMapError::MalformedSegment {
                            line: generated_line,
                            segment: segment.to_string(),
                            fields: n,
                        })
                    }
                }

                generated_column += fields[0];
                source += fields[1];
                original_line += fields[2];
                original_column += fields[3];
                let mapped_name = if fields.len() == 5 {
                    name += fields[4];
                    Some(index_into(&map.names, name, "name index")?.clone())
                } else {
                    None
                };

                mappings.push(Mapping {
                    generated: Position::new(
                        generated_line,
                        to_u32(generated_column, "generated column")?,
                    ),
                    original: Position::new(
                        to_u32(original_line + 1, "original line")?,
                        to_u32(original_column, "original column")?,
                    ),
                    source: index_into(&map.sources, source, "source index")?.clone(),
                    name: mapped_name,
                });
            }
        }

        mappings.sort_by_key(|m| m.generated);

        Ok(SourceMapConsumer {
            sources: map.sources.clone(),
            sources_content: map.sources_content.clone(),
            mappings,
        })
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// The mapping covering the generated location: the last mapping on
    /// `line` starting at or before `column`.
    pub fn original_position_for(&self, line: u32, column: u32) -> Option<&Mapping> {
        let target = Position::new(line, column);
        let end = self.mappings.partition_point(|m| m.generated <= target);
        let candidate = self.mappings[..end].last()?;
        (candidate.generated.line == line).then_some(candidate)
    }

    /// Generated position for an original location. An exact match wins,
    /// otherwise the closest mapping earlier on the same original line.
    pub fn generated_position_for(
        &self,
        source: &str,
        line: u32,
        column: u32,
    ) -> Option<Position> {
        let mut best: Option<&Mapping> = None;
        for mapping in self
            .mappings
            .iter()
            .filter(|m| m.source == source && m.original.line == line)
        {
            if mapping.original.column == column {
                return Some(mapping.generated);
            }
            if mapping.original.column < column
                && best.map_or(true, |b| mapping.original.column > b.original.column)
            {
                best = Some(mapping);
            }
        }
        best.map(|m| m.generated)
    }

    pub fn source_content(&self, source: &str) -> Option<&str> {
        let index = self.sources.iter().position(|s| s == source)?;
        self.sources_content.get(index)?.as_deref()
    }
}
