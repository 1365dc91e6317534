//! Key Generator Module
//!
//! Derives content-addressed cache keys. A key is the namespace prefix
//! followed by the lowercase hex SHA-256 of the input, so it is stable across
//! calls and process restarts.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::{CacheNamespace, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Key Input ==
/// Reproducible input a consumer presents to the cache.
#[derive(Debug, Clone, Copy)]
pub enum KeyInput<'a> {
    /// Raw bytes such as an encoded image
    Bytes(&'a [u8]),
    /// Text such as a recognition request descriptor
    Text(&'a str),
    /// A remote API request; params are canonicalized before hashing
    Request { endpoint: &'a str, params: &'a Value },
}

// == Key Generator ==
/// Stateless content-addressed key derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    pub fn new() -> Self {
        Self
    }

    // == Derive ==
    /// Returns `<prefix>_<sha256 hex>` for the given namespace and input.
    pub fn derive(&self, namespace: CacheNamespace, input: KeyInput<'_>) -> String {
        let mut hasher = Sha256::new();
        match input {
            KeyInput::Bytes(bytes) => hasher.update(bytes),
            KeyInput::Text(text) => hasher.update(text.as_bytes()),
            KeyInput::Request { endpoint, params } => {
                hasher.update(canonical_request(endpoint, params).as_bytes())
            }
        }
        format!("{}_{:x}", namespace.key_prefix(), hasher.finalize())
    }
}

// == Validate Key ==
/// Rejects keys that are empty, too long, or contain whitespace/control characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::Validation("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::Validation(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(CacheError::Validation(format!(
            "Key contains non-printable characters: {:?}",
            key
        )));
    }
    Ok(())
}

// == Canonical Request ==
/// `<endpoint>_<params as JSON with object keys sorted at every depth>`.
pub fn canonical_request(endpoint: &str, params: &Value) -> String {
    let mut out = String::with_capacity(endpoint.len() + 64);
    out.push_str(endpoint);
    out.push('_');
    write_canonical(params, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
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
        scalar => out.push_str(&scalar.to_string()),
    }
}
