//! Error types for race configuration.
//!
//! Only setup can fail. Once a race is running, degenerate conditions are
//! skipped rather than reported.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced before any track is built.
#[derive(Debug, Error)]
pub enum RaceError {
    /// Fewer entrants than a race needs.
    #[error("at least 2 entrants are required, got {0}")]
    TooFewEntrants(usize),

    /// More entrants than the channel can spread at drop time.
    #[error("at most 24 entrants are supported, got {0}")]
    TooManyEntrants(usize),

    /// Winner count must leave at least one loser.
    #[error("winner count {winners} is outside 1..={max} for {entrants} entrants")]
    WinnerCountOutOfRange {
        /// Requested winner count.
        winners: usize,
        /// Largest valid winner count.
        max: usize,
        /// Number of entrants in the race.
        entrants: usize,
    },

    /// Settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    SettingsIo {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid JSON for [`crate::Settings`].
    #[error("invalid settings in {path}: {source}")]
    SettingsParse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl RaceError {
    /// Creates a winner count error for a field of `entrants`.
    #[must_use]
    pub const fn winner_count(winners: usize, entrants: usize) -> Self {
        Self::WinnerCountOutOfRange {
            winners,
            max: entrants.saturating_sub(1),
            entrants,
        }
    }
}

/// Result alias for race setup.
pub type Result<T> = std::result::Result<T, RaceError>;
