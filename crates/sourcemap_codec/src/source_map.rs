use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::SourceMapError;

const DATA_URL_PREFIX: &str = "data:application/json;charset=utf-8;base64,";

/// Version 3 source map document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String, SourceMapError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let map: SourceMap = serde_json::from_str(json)?;
        if map.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(map.version));
        }
        Ok(map)
    }

    /// `data:` URL embedding the JSON, for inline `sourceMappingURL` comments
    pub fn to_data_url(&self) -> Result<String, SourceMapError> {
        let json = self.to_json()?;
        let mut out = String::with_capacity(DATA_URL_PREFIX.len() + json.len() * 4 / 3 + 4);
        out.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(json.as_bytes(), &mut out);
        Ok(out)
    }

    pub fn from_data_url(url: &str) -> Result<Self, SourceMapError> {
        let encoded = url
            .strip_prefix(DATA_URL_PREFIX)
            .or_else(|| url.strip_prefix("data:application/json;base64,"))
            .ok_or_else(|| SourceMapError::InvalidDataUrl("unsupported media type".to_string()))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| SourceMapError::InvalidDataUrl(e.to_string()))?;
        let json =
            String::from_utf8(bytes).map_err(|e| SourceMapError::InvalidDataUrl(e.to_string()))?;
        Self::from_json(&json)
    }
}
