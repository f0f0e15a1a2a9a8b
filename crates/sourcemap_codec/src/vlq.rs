//! Base64 variable-length quantities as used by the `mappings` field.
use crate::error::SourceMapError;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE_MASK: u64 = (1 << VLQ_BASE_SHIFT) - 1;
const VLQ_CONTINUATION_BIT: u8 = 1 << VLQ_BASE_SHIFT;

fn decode_digit(ch: char) -> Option<u8> {
    match ch {
        'A'..='Z' => Some(ch as u8 - b'A'),
        'a'..='z' => Some(ch as u8 - b'a' + 26),
        '0'..='9' => Some(ch as u8 - b'0' + 52),
        '+' => Some(62),
        '/' => Some(63),
        _ => None,
    }
}

const VLQ_BASE_MASK_WIDE: u128 = (1 << VLQ_BASE_SHIFT) - 1;

/// Appends the VLQ encoding of `value` to `out`.
///
/// Every `i64` encodes without loss. [decode] only accepts magnitudes up to
/// `i64::MAX`, so `i64::MIN` does not decode back.
pub fn encode(value: i64, out: &mut String) {
    // sign goes in the lowest bit
    let magnitude = u128::from(value.unsigned_abs()) << 1;
    let mut vlq: u128 = if value < 0 { magnitude | 1 } else { magnitude };
    loop {
        let mut digit = (vlq & VLQ_BASE_MASK_WIDE) as u8;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_ALPHABET[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

pub fn encode_to_string(value: i64) -> String {
    let mut out = String::new();
    encode(value, &mut out);
    out
}

/// Decodes every value in a run of VLQ digits.
pub fn decode(input: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::new();
    let mut accumulated: u64 = 0;
    let mut shift: u32 = 0;
    let mut in_progress = false;

    for (offset, ch) in input.char_indices() {
        let digit = decode_digit(ch).ok_or(SourceMapError::InvalidBase64Digit { ch, offset })?;
        if shift >= 64 {
            return Err(SourceMapError::VlqOverflow);
        }
        let group = u64::from(digit) & VLQ_BASE_MASK;
        if shift > 0 && group >> (64 - shift) != 0 {
            return Err(SourceMapError::VlqOverflow);
        }
        accumulated |= group << shift;

        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += VLQ_BASE_SHIFT;
            in_progress = true;
        } else {
            let magnitude = (accumulated >> 1) as i64;
            values.push(if accumulated & 1 == 1 {
                -magnitude
            } else {
                magnitude
            });
            accumulated = 0;
            shift = 0;
            in_progress = false;
        }
    }

    if in_progress {
        return Err(SourceMapError::TruncatedVlq);
    }
    Ok(values)
}
