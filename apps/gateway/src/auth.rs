//! Bearer-token verification for the WebSocket handshake.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a client access token. Issued elsewhere; the gateway only
/// verifies and extracts the subject.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Validate an access token and return the authenticated user id.
///
/// Checks the HS256 signature and `exp`. Verification is synchronous and runs
/// before the connection is registered anywhere.
pub fn verify_token(token: &str, secret: &str) -> Result<String, &'static str> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());

    let data = jsonwebtoken::decode::<Claims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(?e, "token validation failed");
        "Invalid or expired token"
    })?;

    if data.claims.sub.is_empty() {
        return Err("Token missing subject");
    }

    Ok(data.claims.sub)
}
