//! The token authority: short-lived HMAC-SHA256 tokens in the standard
//! three-segment dot-separated envelope.
//!
//! Submission (`api`) tokens carry a SHA-1 digest binding them to one
//! request body; viewer tokens carry the task they may attach to.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::time_utils::{current_unix_timestamp, is_expired_unix};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER_JSON: &[u8] = br#"{"alg":"HS256","typ":"JWT"}"#;
const VIEWER_AUDIENCE: &str = "viewer";

/// Which endpoint family a token is expected to unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Api,
    Viewer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),
    #[error("unsupported hmac algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token has no expiry")]
    MissingExpiry,
    #[error("token expired")]
    Expired,
    #[error("token audience mismatch: {expected} token expected")]
    AudienceMismatch { expected: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_sha1: Option<String>,
}

// Some issuers emit `aud` as a bare string, others as an array. Accept both;
// we always emit the array form.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AudienceField {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<AudienceField>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(AudienceField::One(value)) => vec![value],
        Some(AudienceField::Many(values)) => values,
    })
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Issues a viewer token bound to one task.
pub fn issue_viewer_token(task_id: &Uuid, secret: &str, ttl: Duration) -> String {
    let claims = TokenClaims {
        aud: vec![VIEWER_AUDIENCE.to_string()],
        exp: Some(current_unix_timestamp().saturating_add(ttl.as_secs())),
        task_id: Some(task_id.to_string()),
        body_sha1: None,
    };
    sign_claims(&claims, secret)
}

/// Issues a submission token bound to the canonical digest of one request
/// body. API tokens carry no audience.
pub fn issue_api_token(body_sha1: &str, secret: &str, ttl: Duration) -> String {
    let claims = TokenClaims {
        aud: Vec::new(),
        exp: Some(current_unix_timestamp().saturating_add(ttl.as_secs())),
        task_id: None,
        body_sha1: Some(body_sha1.to_string()),
    };
    sign_claims(&claims, secret)
}

fn sign_claims(claims: &TokenClaims, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(TOKEN_HEADER_JSON);
    let payload = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(payload);
    let signature = URL_SAFE_NO_PAD.encode(hmac_sha256(
        secret,
        format!("{header}.{payload}").as_bytes(),
    ));
    format!("{header}.{payload}.{signature}")
}

fn hmac_sha256(secret: &str, message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies a token and enforces the audience policy when one is expected:
/// `Api` tokens must carry no audience, `Viewer` tokens must list `viewer`,
/// and `None` skips the audience check entirely.
pub fn verify_token(
    token: &str,
    secret: &str,
    expected_audience: Option<Audience>,
) -> Result<TokenClaims, TokenError> {
    verify_token_at(token, secret, expected_audience, current_unix_timestamp())
}

fn verify_token_at(
    token: &str,
    secret: &str,
    expected_audience: Option<Audience>,
    now_unix: u64,
) -> Result<TokenClaims, TokenError> {
    let mut segments = token.split('.');
    let (header, payload, signature) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(header), Some(payload), Some(signature), None) => (header, payload, signature),
        _ => return Err(TokenError::Malformed("expected three segments")),
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed("header is not valid base64"))?;
    let parsed_header: TokenHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| TokenError::Malformed("header is not valid JSON"))?;
    if !parsed_header.alg.starts_with("HS") {
        return Err(TokenError::UnexpectedSigningMethod(parsed_header.alg));
    }
    if parsed_header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm(parsed_header.alg));
    }

    let expected_signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed("signature is not valid base64"))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| TokenError::InvalidSignature)?;
    mac.update(format!("{header}.{payload}").as_bytes());
    mac.verify_slice(&expected_signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed("payload is not valid base64"))?;
    let claims: TokenClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| TokenError::Malformed("payload is not valid JSON"))?;

    match claims.exp {
        None => return Err(TokenError::MissingExpiry),
        Some(expires) => {
            if is_expired_unix(Some(expires), now_unix) {
                return Err(TokenError::Expired);
            }
        }
    }

    match expected_audience {
        None => {}
        Some(Audience::Api) => {
            if claims.aud.iter().any(|aud| !aud.is_empty()) {
                return Err(TokenError::AudienceMismatch { expected: "API" });
            }
        }
        Some(Audience::Viewer) => {
            if !claims.aud.iter().any(|aud| aud == VIEWER_AUDIENCE) {
                return Err(TokenError::AudienceMismatch { expected: "viewer" });
            }
        }
    }

    Ok(claims)
}
