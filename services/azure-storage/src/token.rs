use std::fmt::{Debug, Formatter};

use blobauth_core::hash::base64_decode_lenient;
use blobauth_core::time::{from_timestamp, now, DateTime};
use blobauth_core::utils::Redact;
use blobauth_core::{Error, Result, SigningCredential};
use serde::Deserialize;

/// A bearer token together with the expiry embedded in its own claims.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// The raw access token as returned by the token endpoint.
    pub access_token: String,
    /// The `exp` claim of the token.
    pub expires_at: DateTime,
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

impl CachedToken {
    /// Build a cached token from a compact `header.payload.signature` access token.
    ///
    /// Only the second segment is looked at: it must decode to a JSON object with an
    /// integer `exp` field. The signature is NOT verified, the storage service does that.
    pub fn from_access_token(access_token: &str) -> Result<Self> {
        let payload = access_token
            .split('.')
            .nth(1)
            .ok_or_else(|| Error::token_invalid("access token has no payload segment"))?;

        let payload = base64_decode_lenient(payload).map_err(|e| {
            Error::token_invalid("access token payload is not valid base64").with_source(e)
        })?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|e| {
            Error::token_invalid("access token payload has no integer exp claim").with_source(e)
        })?;
        let expires_at = from_timestamp(claims.exp)
            .ok_or_else(|| Error::token_invalid(format!("exp {} is out of range", claims.exp)))?;

        Ok(Self {
            access_token: access_token.to_string(),
            expires_at,
        })
    }
}

impl SigningCredential for CachedToken {
    fn is_valid(&self) -> bool {
        now() < self.expires_at
    }
}

impl Debug for CachedToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &Redact::from(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
