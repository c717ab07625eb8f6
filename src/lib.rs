//! Neon Drop - a multi-entrant ball drop race
//!
//! Core modules:
//! - `sim`: Race simulation (track generation, collision effects, ranking)
//! - `settings`: Data-driven race tuning
//! - `error`: Configuration errors

pub mod error;
pub mod settings;
pub mod sim;

pub use error::{RaceError, Result};
pub use settings::Settings;
pub use sim::{RaceConfig, RaceSession, RaceSnapshot, RapierWorld, SimpleWorld};

/// Race configuration constants
pub mod consts {
    /// Fixed simulation timestep (one reference tick, 60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Reference ticks per simulated second
    pub const TICKS_PER_SECOND: u64 = 60;

    /// Channel dimensions (base layout, up to the large-field threshold)
    pub const CHANNEL_WIDTH: f32 = 660.0;
    pub const BASE_CHANNEL_HEIGHT: f32 = 2200.0;
    pub const WALL_THICKNESS: f32 = 14.0;
    /// Finish line sits this far above the channel bottom
    pub const FINISH_MARGIN: f32 = 50.0;
    /// First stage starts here
    pub const TRACK_TOP: f32 = 100.0;

    /// Narrowing starts at this fraction of the channel height
    pub const NARROW_START_FRACTION: f32 = 0.65;
    /// Channel width at the finish line
    pub const NARROW_END_WIDTH: f32 = 150.0;

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 9.0;
    pub const BALL_RESTITUTION: f32 = 0.4;
    pub const BALL_FRICTION: f32 = 0.05;
    pub const BALL_DENSITY: f32 = 0.0012;

    /// Fixtures
    pub const PIN_RADIUS: f32 = 5.0;
    pub const WALL_BUMP_RADIUS: f32 = 14.0;
    pub const WALL_BUMP_SPACING: f32 = 42.0;
    /// Distance kept between the live wall and any placed obstacle center
    pub const CORRIDOR_INSET: f32 = WALL_BUMP_RADIUS * 2.0 + 15.0;
    /// Corridors narrower than this skip placement
    pub const MIN_CORRIDOR_WIDTH: f32 = 60.0;

    /// Entrant limits
    pub const MIN_ENTRANTS: usize = 2;
    pub const MAX_ENTRANTS: usize = 24;
    /// Fields larger than this get a taller channel and wormholes
    pub const LARGE_FIELD_THRESHOLD: usize = 8;

    /// Ball color palette, assigned round-robin by entrant index
    pub const NEON_COLORS: [&str; 8] = [
        "#ff00ff", "#00ff66", "#ffff00", "#bf5fff", "#ff6644", "#00ffff", "#ff3388", "#88ff00",
    ];
}

/// Color for the entrant at `index`
#[inline]
pub fn entrant_color(index: usize) -> &'static str {
    consts::NEON_COLORS[index % consts::NEON_COLORS.len()]
}
