//! Best-effort decoding of external identity provider credentials.
//!
//! Nothing here verifies a signature. The three-part token is only opened far
//! enough to read `sub` and `sid`; verification is the transport boundary's job.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// Unverified subject/session pair taken from an external credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalClaim {
    pub subject_id: String,
    pub session_id: String,
}

impl ExternalClaim {
    /// Passthrough for the explicit header pair; both values must be non-empty.
    pub fn from_header_pair(user_id: Option<&str>, session_id: Option<&str>) -> Option<Self> {
        let subject_id = user_id.map(str::trim).filter(|v| !v.is_empty())?;
        let session_id = session_id.map(str::trim).filter(|v| !v.is_empty())?;
        Some(Self {
            subject_id: subject_id.to_string(),
            session_id: session_id.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct TokenPayload {
    sub: Option<String>,
    sid: Option<String>,
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Returns `None` for any malformed input: missing segment, invalid
/// base64url, non-JSON or non-object payload, or missing/empty `sub`/`sid`.
pub fn decode_session_token(token: &str) -> Option<ExternalClaim> {
    let payload = token.split('.').nth(1)?;
    // Some issuers pad the segment, the URL-safe alphabet does not require it
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: TokenPayload = serde_json::from_slice(&bytes).ok()?;

    let subject_id = claims.sub.filter(|s| !s.is_empty())?;
    let session_id = claims.sid.filter(|s| !s.is_empty())?;
    Some(ExternalClaim {
        subject_id,
        session_id,
    })
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}
