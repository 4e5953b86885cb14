//! Session token inspection.
//!
//! The session token is a three-segment signed token
//! (`header.payload.signature`). Only the payload is read here: it is
//! base64url JSON carrying the subject (`name`) and the expiry (`exp`, epoch
//! seconds). The signature is never validated.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{instrument, trace};

use crate::error::ApiError;

/// Claims read from a token payload. Neither claim is assumed present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Subject (account identifier).
    #[serde(default, rename = "name")]
    pub subject: Option<String>,

    /// Expiry, epoch seconds.
    #[serde(default, rename = "exp")]
    pub expiry: Option<i64>,
}

impl TokenClaims {
    /// Returns true if `now` is at or past the expiry. A token without an
    /// expiry claim counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(exp) => now.timestamp() >= exp,
            None => true,
        }
    }

    /// Expiry as a timestamp, if present and representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Decodes the claims of a token.
#[instrument(skip(token))]
pub fn decode_token_claims(token: &str) -> Result<TokenClaims, ApiError> {
    let parts: Vec<&str> = token.trim().split('.').collect();

    if parts.len() != 3 {
        return Err(ApiError::TokenDecode(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let payload = parts[1].trim_end_matches('=');

    let decoded = BASE64_URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| BASE64_STANDARD_NO_PAD.decode(payload))
        .map_err(|e| ApiError::TokenDecode(format!("base64: {e}")))?;

    trace!(bytes = decoded.len(), "Decoded token payload");

    serde_json::from_slice(&decoded).map_err(|e| ApiError::TokenDecode(format!("payload: {e}")))
}
