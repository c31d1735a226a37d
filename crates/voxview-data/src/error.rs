// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;
use thiserror::Error;

/// Failures at the dataset import boundary. None of these are fatal to the
/// viewer: the previously loaded dataset stays bound.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("inconsistent dimensions in {context}: expected {expected}, found {actual}")]
    InconsistentDimensions {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }
}
