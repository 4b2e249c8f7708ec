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
 */

//! Space access token (JWT) claims.
//!
//! The access token is a short-lived signed JWT (HMAC-SHA256) issued per
//! `(user, space)` pair. The spatial-audio service validates the signature
//! and admits the holder into the named space.

use serde::{Deserialize, Serialize};

/// JWT payload for a space access token.
///
/// # Example payload
///
/// ```json
/// {
///   "sub": "dj-bot-01",
///   "space_id": "mural-1234",
///   "space_name": "Main stage",
///   "exp": 1707004800,
///   "iss": "spatial-audio-backend"
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Participant identity inside the space.
    pub sub: String,

    /// Opaque identifier of the space the holder may join.
    pub space_id: String,

    /// Human readable space name, shown by the service.
    pub space_name: String,

    /// Expiration timestamp (Unix seconds).
    pub exp: i64,

    /// Issuer identifier. Always [`AccessTokenClaims::ISSUER`].
    pub iss: String,
}

impl AccessTokenClaims {
    /// The expected issuer value for tokens produced by the backend.
    pub const ISSUER: &'static str = "spatial-audio-backend";
}
