//! Canonical hashing of configuration values
//!
//! Turns a nested JSON value into a stable string (mapping keys sorted
//! lexicographically at every nesting level) and digests it with SHA-256.
//! The digest is re-encoded in base36 so it can name a cache directory
//! directly: alphanumeric, no path separators, at most 50 characters.
//!
//! Collisions are an accepted risk: two configurations that digest
//! identically silently share a cache entry.

use serde_json::Value;
use sha2::{Digest, Sha256};

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Serialize a value canonically: identical output for two values differing
/// only in mapping key order.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Digest a value into a short filesystem-safe cache key.
pub fn digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    to_base36(&hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sorted keys make the serialization order-independent
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(key, out);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Re-encode a big-endian byte string in base36.
fn to_base36(bytes: &[u8]) -> String {
    let mut digits = bytes.to_vec();
    let mut encoded = Vec::new();

    while digits.iter().any(|&b| b != 0) {
        let mut remainder: u32 = 0;
        for digit in digits.iter_mut() {
            let current = (remainder << 8) | u32::from(*digit);
            *digit = (current / 36) as u8;
            remainder = current % 36;
        }
        encoded.push(BASE36_ALPHABET[remainder as usize] as char);
    }

    if encoded.is_empty() {
        encoded.push('0');
    }

    encoded.iter().rev().collect()
}
