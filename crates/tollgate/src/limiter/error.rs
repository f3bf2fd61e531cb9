// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;
use std::path::PathBuf;

/// Error returned by the shared [`RateLimiter`][super::RateLimiter].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LimiterError {
    /// Reading or writing the state or lock file failed.
    #[error("rate limiter i/o failed for {}", path.display())]
    Io {
        /// The file that was accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The lock file stayed locked for the whole lock timeout while an operation that cannot
    /// fail open was waiting for it.
    #[error("timed out waiting for the rate limiter lock {}", path.display())]
    LockTimeout {
        /// The lock file.
        path: PathBuf,
    },

    /// The state file was written by a newer version of the layer.
    #[error("rate limiter state {} has unsupported schema version {found}", path.display())]
    UnsupportedVersion {
        /// The state file.
        path: PathBuf,
        /// The version found in the file.
        found: u32,
    },
}

impl LimiterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
