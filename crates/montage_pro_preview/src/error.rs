// SPDX-License-Identifier: MIT OR Apache-2.0
//! Preview errors.

use montage_pro_notify::MontageError;
use thiserror::Error;

/// Errors that stop a preview run
#[derive(Debug, Error)]
pub enum PreviewError {
    /// Scenario file could not be read or output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario is not valid RON
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Event could not be encoded
    #[error("Failed to encode event: {0}")]
    Json(#[from] serde_json::Error),

    /// A montage in the scenario is malformed
    #[error("Invalid montage '{name}': {source}")]
    Montage {
        /// Montage name
        name: String,
        /// What is wrong with it
        #[source]
        source: MontageError,
    },

    /// Simulation step is zero, negative or not finite
    #[error("Tick must be a positive number of seconds, got {0}")]
    InvalidTick(f32),
}

/// Result type for preview operations
pub type Result<T> = std::result::Result<T, PreviewError>;
