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

//! Errors surfaced by the DJ bot core.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DjBotError {
    /// The audio path does not reference an existing regular file.
    #[error("audio path {} does not reference an existing file", .0.display())]
    InvalidPath(PathBuf),

    /// The file extension is not `.mp3` or `.wav`.
    #[error("unsupported audio format {extension:?} for {}; expected mp3 or wav", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to decode {}: {reason}", .path.display())]
    DecodeFailure { path: PathBuf, reason: String },

    #[error("connection to the spatial audio session failed: {0}")]
    ConnectionFailed(String),

    #[error("no access token available: {0}")]
    TokenMissing(String),
}

impl DjBotError {
    pub(crate) fn decode_failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DjBotError::DecodeFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DjBotError>;
