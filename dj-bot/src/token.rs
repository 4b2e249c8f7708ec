/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Space access token issuance.
//!
//! Tokens are normally issued out-of-band and handed to the bot. When the
//! operator configures the signing secret instead, the bot issues its own.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use spatial_audio_types::AccessTokenClaims;
use tracing::{debug, error};

use crate::error::{DjBotError, Result};

/// Sign a space access token for `user_id` in the given space.
pub fn generate_access_token(
    secret: &str,
    ttl_secs: i64,
    user_id: &str,
    space_id: &str,
    space_name: &str,
) -> Result<String> {
    if secret.is_empty() {
        return Err(DjBotError::TokenMissing(
            "token signing secret is empty".to_string(),
        ));
    }

    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        sub: user_id.to_string(),
        space_id: space_id.to_string(),
        space_name: space_name.to_string(),
        exp: now + ttl_secs,
        iss: AccessTokenClaims::ISSUER.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to sign access token: {e}");
        DjBotError::TokenMissing(format!("failed to generate access token: {e}"))
    })
}

/// Picks the supplied token when there is one, otherwise issues a token if a
/// signing secret is configured.
pub fn resolve_access_token(
    supplied: Option<&str>,
    secret: Option<&str>,
    ttl_secs: i64,
    user_id: &str,
    space_id: &str,
    space_name: &str,
) -> Result<String> {
    if let Some(token) = supplied.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    match secret {
        Some(secret) => {
            debug!("Issuing access token for {} in {}", user_id, space_id);
            generate_access_token(secret, ttl_secs, user_id, space_id, space_name)
        }
        None => Err(DjBotError::TokenMissing(format!(
            "no access token supplied for {user_id} and no signing secret configured"
        ))),
    }
}
