//! Race tuning
//!
//! Gameplay knobs that are not part of the track geometry. Loaded from a JSON
//! file when one is given, otherwise the defaults reproduce the classic feel.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::TICKS_PER_SECOND;
use crate::error::{RaceError, Result};

/// Race tuning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Physics ===
    /// Gravity scalar handed to the physics adapter
    pub gravity: f32,
    /// Upper bound on collision substeps per tick
    pub max_substeps: u32,

    // === Effects ===
    /// Ticks before a ball may warp through an entry wormhole again
    pub warp_cooldown_ticks: u64,

    // === Watchdog ===
    /// Speed (px/tick) under which a ball counts as stalled
    pub stuck_speed: f32,
    /// Consecutive stalled ticks before a ball gets kicked
    pub stuck_tick_budget: u32,

    // === Presentation ===
    /// Trail points kept per ball
    pub trail_length: usize,
    /// Log every dispatched effect at debug level
    pub log_effects: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gravity: 0.35,
            max_substeps: 4,

            // 1.5 seconds
            warp_cooldown_ticks: TICKS_PER_SECOND * 3 / 2,

            stuck_speed: 0.4,
            stuck_tick_budget: 50,

            trail_length: 22,
            log_effects: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RaceError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&json).map_err(|source| RaceError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings from `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                log::info!("Using default settings");
                Ok(Self::default())
            }
        }
    }

    /// Warp cooldown expressed in seconds (for display)
    pub fn warp_cooldown_secs(&self) -> f32 {
        self.warp_cooldown_ticks as f32 / TICKS_PER_SECOND as f32
    }
}
