//! Canonical JSON and SHA-1 digests for request-body binding.
//!
//! Submission tokens carry a digest of the payload's meaning rather than its
//! formatting: the body is parsed and re-serialized with sorted object keys
//! and no insignificant whitespace before hashing, so clients may re-indent
//! or reorder keys without invalidating the token.

use serde_json::Value;
use sha1::{Digest, Sha1};

/// Re-encodes parsed JSON in canonical form: sorted object keys, compact
/// separators. Fails when the input is not valid JSON.
pub fn canonical_json(raw: &[u8]) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    serde_json::to_string(&value)
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// SHA-1 hex digest of the canonical form of `raw`.
pub fn canonical_body_sha1(raw: &[u8]) -> Result<String, serde_json::Error> {
    Ok(sha1_hex(canonical_json(raw)?.as_bytes()))
}
