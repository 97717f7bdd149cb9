//! Modified UTF-8, the string encoding of `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two ways: the NUL character is encoded as the two byte
//! sequence `C0 80`, and supplementary characters are encoded as a surrogate pair with three
//! bytes per surrogate instead of one four byte sequence.

use crate::Result;

/// Decodes modified UTF-8 bytes into a string.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for raw NUL bytes, truncated or invalid sequences and
/// unpaired surrogates.
pub fn decode(bytes: &[u8]) -> Result<String> {
    // Fast path: plain ASCII without NUL
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        return Ok(bytes.iter().map(|&b| b as char).collect());
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 {
            0x01..=0x7F => {
                units.push(u16::from(b0));
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = continuation(bytes, i + 1)?;
                units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1));
                i += 2;
            }
            0xE0..=0xEF => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                units.push((u16::from(b0 & 0x0F) << 12) | (u16::from(b1) << 6) | u16::from(b2));
                i += 3;
            }
            _ => return Err(malformed_error!("Invalid modified UTF-8 lead byte 0x{:02x}", b0)),
        }
    }

    let mut out = String::with_capacity(units.len());
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => out.push(c),
            Err(e) => {
                return Err(malformed_error!(
                    "Unpaired surrogate 0x{:04x} in modified UTF-8",
                    e.unpaired_surrogate()
                ))
            }
        }
    }
    Ok(out)
}

fn continuation(bytes: &[u8], index: usize) -> Result<u8> {
    match bytes.get(index) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b & 0x3F),
        Some(&b) => Err(malformed_error!("Invalid continuation byte 0x{:02x}", b)),
        None => Err(malformed_error!("Truncated modified UTF-8 sequence")),
    }
}

/// Encodes a string as modified UTF-8.
#[must_use]
pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}

/// Returns the encoded length of `value` without allocating.
#[must_use]
pub fn encoded_len(value: &str) -> usize {
    value
        .encode_utf16()
        .map(|unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}
