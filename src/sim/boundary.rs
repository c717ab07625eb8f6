//! Channel geometry and the live wall boundary
//!
//! The channel is full width down to the narrowing threshold, then both walls
//! ease inward (quadratic ease-in) until the finish line, where the channel is
//! at its minimum width. Everything that needs to know where the walls are
//! (track placement, the watchdog, the finish sensor) asks [`ChannelLayout`].

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Left/right wall x-coordinates at a given height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallBounds {
    pub left: f32,
    pub right: f32,
}

impl WallBounds {
    /// Horizontal space between the walls
    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Midpoint between the walls
    #[inline]
    pub fn center(&self) -> f32 {
        (self.left + self.right) * 0.5
    }

    /// Shrink both sides by `margin`
    #[inline]
    pub fn inset(&self, margin: f32) -> Self {
        Self {
            left: self.left + margin,
            right: self.right - margin,
        }
    }

    /// True if `x` lies strictly between the walls
    #[inline]
    pub fn contains(&self, x: f32) -> bool {
        x > self.left && x < self.right
    }
}

/// Channel dimensions for one race
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub width: f32,
    pub height: f32,
    pub wall_thickness: f32,
    /// y of the finish sensor
    pub finish_y: f32,
    /// y where the walls start to narrow
    pub narrow_start_y: f32,
    /// Channel width at the finish line
    pub narrow_end_width: f32,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::with_height(BASE_CHANNEL_HEIGHT)
    }
}

/// Height stretch per entrant above the large-field threshold
const HEIGHT_GROWTH_PER_ENTRANT: f32 = 0.06;
/// Tallest channel, relative to the base height
const MAX_HEIGHT_SCALE: f32 = 2.0;

impl ChannelLayout {
    /// Base-width channel of the given height
    pub fn with_height(height: f32) -> Self {
        Self {
            width: CHANNEL_WIDTH,
            height,
            wall_thickness: WALL_THICKNESS,
            finish_y: height - FINISH_MARGIN,
            narrow_start_y: height * NARROW_START_FRACTION,
            narrow_end_width: NARROW_END_WIDTH,
        }
    }

    /// Channel sized for a field of `entrants`
    ///
    /// Small fields use the base height. Large fields get a taller channel so
    /// the pack has room to spread out before the narrowing.
    pub fn for_entrants(entrants: usize) -> Self {
        let extra = entrants.saturating_sub(LARGE_FIELD_THRESHOLD) as f32;
        let scale = (1.0 + extra * HEIGHT_GROWTH_PER_ENTRANT).min(MAX_HEIGHT_SCALE);
        Self::with_height(BASE_CHANNEL_HEIGHT * scale)
    }

    /// Horizontal center of the channel
    #[inline]
    pub fn center_x(&self) -> f32 {
        self.width * 0.5
    }

    /// Live wall positions at height `y`
    ///
    /// Total over all `y`: heights above the channel behave like the top,
    /// heights past the finish behave like the finish line.
    pub fn boundary(&self, y: f32) -> WallBounds {
        let full = WallBounds {
            left: self.wall_thickness,
            right: self.width - self.wall_thickness,
        };
        if y <= self.narrow_start_y {
            return full;
        }

        let span = (self.finish_y - self.narrow_start_y).max(f32::EPSILON);
        let t = ((y - self.narrow_start_y) / span).clamp(0.0, 1.0);
        let eased = t * t;

        let half_w = full.width() * 0.5;
        let half_narrow = self.narrow_end_width * 0.5;
        let squeeze = (half_w - half_narrow) * eased;
        let cx = self.center_x();

        WallBounds {
            left: cx - half_w + squeeze,
            right: cx + half_w - squeeze,
        }
    }

    /// Safe placement corridor at `y`: the live walls inset by the decoration
    /// radius plus clearance
    #[inline]
    pub fn corridor(&self, y: f32) -> WallBounds {
        self.boundary(y).inset(CORRIDOR_INSET)
    }
}
