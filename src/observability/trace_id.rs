//! Trace and span identifier formatting.
//!
//! All identifiers leaving the gateway in W3C form are fixed-width lowercase
//! hexadecimal: 32 characters for trace ids, 16 for span ids. The all-zero
//! value is invalid for both.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Width of a W3C trace id in hex characters.
pub const TRACE_ID_WIDTH: usize = 32;

/// Width of a W3C span (parent) id in hex characters.
pub const SPAN_ID_WIDTH: usize = 16;

/// Generate a root trace id: epoch millis followed by 64 random bits.
pub fn generate_trace_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    format!("{:016x}{:016x}", millis, OsRng.next_u64())
}

/// Generate a span id from a non-negative, non-zero random 64-bit value.
pub fn generate_span_id() -> String {
    loop {
        let value = OsRng.next_u64() & (i64::MAX as u64);
        if value != 0 {
            return format!("{:016x}", value);
        }
    }
}

/// Generate a span id guaranteed to differ from an inbound one.
pub fn generate_span_id_excluding(inbound: Option<&str>) -> String {
    loop {
        let span_id = generate_span_id();
        match inbound {
            Some(previous) if previous.eq_ignore_ascii_case(&span_id) => continue,
            _ => return span_id,
        }
    }
}

/// Normalize a trace id to 32 lowercase hex characters.
pub fn normalize_trace_id(raw: &str) -> String {
    normalize(raw, TRACE_ID_WIDTH)
}

/// Normalize a span id to 16 lowercase hex characters.
pub fn normalize_span_id(raw: &str) -> String {
    normalize(raw, SPAN_ID_WIDTH)
}

/// Normalize an arbitrary identifier to `width` lowercase hex characters.
///
/// Non-hex characters are stripped. Long input is truncated, input of at
/// least half the width is left-padded with zeros, and anything shorter is
/// mixed with a digest of the raw input so distinct short ids stay distinct.
/// Blank input yields a fresh random id.
pub fn normalize(raw: &str, width: usize) -> String {
    if raw.trim().is_empty() {
        return random_hex(width);
    }

    let cleaned: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let candidate = if cleaned.len() >= width {
        cleaned[..width].to_string()
    } else if cleaned.len() >= width / 2 {
        format!("{:0>width$}", cleaned, width = width)
    } else {
        let combined = format!("{}{}", cleaned, digest_hex_wide(raw, SPAN_ID_WIDTH));
        let end = combined.len().min(width);
        format!("{:0>width$}", &combined[..end], width = width)
    };

    // A non-zero input must not collapse to the invalid all-zero id.
    if is_all_zero(&candidate) && !is_all_zero(&cleaned) {
        return digest_hex_wide(raw, width);
    }
    candidate
}

/// Check a trace id against the W3C format: 32 lowercase hex, not all zero.
pub fn is_valid_w3c_trace_id(id: &str) -> bool {
    is_valid_hex_id(id, TRACE_ID_WIDTH)
}

/// Check a span id against the W3C format: 16 lowercase hex, not all zero.
pub fn is_valid_w3c_span_id(id: &str) -> bool {
    is_valid_hex_id(id, SPAN_ID_WIDTH)
}

fn is_valid_hex_id(id: &str, width: usize) -> bool {
    id.len() == width
        && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && !is_all_zero(id)
}

fn is_all_zero(id: &str) -> bool {
    id.bytes().all(|b| b == b'0')
}

fn random_hex(width: usize) -> String {
    let mut out = String::with_capacity(width + SPAN_ID_WIDTH);
    while out.len() < width {
        out.push_str(&generate_span_id());
    }
    out.truncate(width);
    out
}

/// `width` hex characters derived from the raw input. Past 64 characters
/// the digest is chained: each block hashes the previous one.
fn digest_hex_wide(raw: &str, width: usize) -> String {
    let mut block = Sha256::digest(raw.as_bytes());
    let mut out = hex::encode(&block);
    while out.len() < width {
        block = Sha256::digest(&block);
        out.push_str(&hex::encode(&block));
    }
    out.truncate(width);
    out
}
