#[derive(Debug, thiserror::Error)]
pub enum SourceMapError {
    #[error("invalid base64 digit {ch:?} at offset {offset}")]
    InvalidBase64Digit { ch: char, offset: usize },
    #[error("VLQ value is truncated")]
    TruncatedVlq,
    #[error("VLQ value overflows 64 bits")]
    VlqOverflow,
    #[error("segment {segment:?} on generated line {line} has {fields} fields")]
    MalformedSegment {
        line: u32,
        segment: String,
        fields: usize,
    },
    #[error("{kind} {value} is out of range")]
    OutOfRange { kind: &'static str, value: i64 },
    #[error("generated and original lines are 1-based, got 0")]
    ZeroLine,
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid source map data URL: {0}")]
    InvalidDataUrl(String),
}
