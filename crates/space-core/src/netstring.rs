//! Netstring framing (§4.1)
//!
//! A netstring is `<decimal-byte-length>":" <bytes> ","`. Lengths are byte
//! lengths, not character counts. This is the framing primitive every
//! signature input is built from: a domain separator followed by a
//! concatenation of netstrings.

use crate::error::{Error, Result};

/// Append `payload` to `out` as a netstring: `len(payload) ":" payload ","`.
pub fn write(out: &mut Vec<u8>, payload: &[u8]) {
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
}

/// Append a non-negative integer as a netstring of its ASCII decimal form.
///
/// No leading `+`, no leading zeros (except `0` itself) — the value is
/// formatted by `u64::to_string`, which already satisfies this.
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    write(out, value.to_string().as_bytes());
}

/// Append a UTF-8 string as a netstring.
pub fn write_str(out: &mut Vec<u8>, value: &str) {
    write(out, value.as_bytes());
}

/// Read one netstring off the front of `input`, returning the payload and
/// the remaining bytes.
pub fn read(input: &[u8]) -> Result<(&[u8], &[u8])> {
    let colon = input
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::MalformedNetstring("missing ':'".into()))?;
    let len_bytes = &input[..colon];
    if len_bytes.is_empty() || (len_bytes.len() > 1 && len_bytes[0] == b'0') {
        return Err(Error::MalformedNetstring("leading zero in length".into()));
    }
    let len_str = std::str::from_utf8(len_bytes)
        .map_err(|_| Error::MalformedNetstring("non-ascii length".into()))?;
    let len: usize = len_str
        .parse()
        .map_err(|_| Error::MalformedNetstring("non-numeric length".into()))?;

    let body_start = colon + 1;
    let body_end = body_start
        .checked_add(len)
        .ok_or_else(|| Error::MalformedNetstring("length overflow".into()))?;
    if input.len() <= body_end {
        return Err(Error::MalformedNetstring("truncated payload".into()));
    }
    if input[body_end] != b',' {
        return Err(Error::MalformedNetstring("missing trailing ','".into()));
    }

    Ok((&input[body_start..body_end], &input[body_end + 1..]))
}
