//! Foundational low-level utilities shared across taskview crates.
//!
//! Provides input validation and command templating, canonical JSON with
//! SHA-1 digests for request-body binding, the HMAC-SHA256 token authority,
//! and the atomic-write and unix-time helpers the rest of the workspace
//! builds on.

pub mod atomic_io;
pub mod canonical;
pub mod time_utils;
pub mod token;
pub mod validate;

pub use atomic_io::write_text_atomic;
pub use canonical::{canonical_body_sha1, canonical_json, sha1_hex};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix};
pub use token::{
    issue_api_token, issue_viewer_token, verify_token, Audience, TokenClaims, TokenError,
};
pub use validate::{
    shell_escape, substitute_parameters, validate_and_normalize_parameters, validate_task_id,
    validate_task_name, ParameterKind, ParameterSpec, ValidationError,
};
