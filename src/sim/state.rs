//! Race data model
//!
//! Descriptors for stages, obstacles, zones and balls. Physics bodies are
//! referenced by [`BodyHandle`]; each body carries a [`BodyTag`] pointing back
//! at the descriptor it was created for.

use std::collections::VecDeque;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::physics::{BodyHandle, PhysicsWorld};

/// Back-reference from a physics body to the race descriptor it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyTag {
    /// Index into the race's ball list
    Ball(usize),
    /// Index into the track's obstacle list
    Obstacle(usize),
    /// Index into the track's zone list
    Zone(usize),
    FinishLine,
    /// Walls and wall decoration (no game effect)
    Wall,
}

/// Stage theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    Pins,
    Bumpers,
    Spinners,
    Ramps,
    Launchers,
    Final,
}

/// A themed vertical band of the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub name: &'static str,
    pub y_start: f32,
    pub y_end: f32,
    pub color: &'static str,
    pub kind: StageKind,
}

impl Stage {
    #[inline]
    pub fn height(&self) -> f32 {
        self.y_end - self.y_start
    }

    #[inline]
    pub fn contains(&self, y: f32) -> bool {
        y >= self.y_start && y < self.y_end
    }
}

/// Which wall something is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallSide {
    Left,
    Right,
}

impl WallSide {
    /// Unit x-direction pointing away from this wall, into the channel
    #[inline]
    pub fn inward(&self) -> f32 {
        match self {
            WallSide::Left => 1.0,
            WallSide::Right => -1.0,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            WallSide::Left => WallSide::Right,
            WallSide::Right => WallSide::Left,
        }
    }
}

/// Wormhole role: entries teleport, exits only receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WormholeRole {
    Entry,
    Exit,
}

/// Obstacle variants
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ObstacleKind {
    Pin,
    Bumper {
        radius: f32,
    },
    /// Rotating bar; angular velocity in rad/tick
    Spinner {
        width: f32,
        angular_velocity: f32,
    },
    /// Fixed tilted deflector
    Ramp {
        width: f32,
        tilt: f32,
    },
    Launcher {
        radius: f32,
    },
    Wormhole {
        radius: f32,
        side: WallSide,
        stage_index: usize,
        role: WormholeRole,
        pair_color: &'static str,
    },
    /// Slow kinematic bar just above the finish
    RotatingGate {
        width: f32,
        angular_velocity: f32,
    },
    /// High-restitution bump embedded in a wall
    WallBounceSegment {
        side: WallSide,
        radius: f32,
    },
}

impl ObstacleKind {
    /// Short label for logs and UI
    pub fn label(&self) -> &'static str {
        match self {
            ObstacleKind::Pin => "pin",
            ObstacleKind::Bumper { .. } => "bumper",
            ObstacleKind::Spinner { .. } => "spinner",
            ObstacleKind::Ramp { .. } => "ramp",
            ObstacleKind::Launcher { .. } => "launcher",
            ObstacleKind::Wormhole {
                role: WormholeRole::Entry,
                ..
            } => "wormhole-entry",
            ObstacleKind::Wormhole {
                role: WormholeRole::Exit,
                ..
            } => "wormhole-exit",
            ObstacleKind::RotatingGate { .. } => "gate",
            ObstacleKind::WallBounceSegment { .. } => "wall-bounce",
        }
    }

    /// Angular velocity for fixtures that turn every tick
    pub fn spin(&self) -> Option<f32> {
        match *self {
            ObstacleKind::Spinner {
                angular_velocity, ..
            }
            | ObstacleKind::RotatingGate {
                angular_velocity, ..
            } => Some(angular_velocity),
            _ => None,
        }
    }

    pub fn is_wormhole_exit(&self) -> bool {
        matches!(
            self,
            ObstacleKind::Wormhole {
                role: WormholeRole::Exit,
                ..
            }
        )
    }
}

/// A static or kinematic track fixture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Obstacle {
    pub kind: ObstacleKind,
    pub pos: Vec2,
    /// Current angle (ramps are fixed; spinners and gates turn)
    pub angle: f32,
    /// Set once the track is registered with a physics world
    #[serde(skip)]
    pub body: Option<BodyHandle>,
    /// Tick of the most recent ball contact
    pub last_hit_tick: Option<u64>,
}

impl Obstacle {
    pub fn new(kind: ObstacleKind, pos: Vec2) -> Self {
        Self {
            kind,
            pos,
            angle: 0.0,
            body: None,
            last_hit_tick: None,
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Record a contact; never moves the timestamp backwards
    pub fn mark_hit(&mut self, tick: u64) {
        self.last_hit_tick = Some(self.last_hit_tick.map_or(tick, |t| t.max(tick)));
    }

    /// Feedback intensity in [0, 1], fading out over `fade_ticks`
    pub fn flash(&self, now: u64, fade_ticks: u64) -> f32 {
        flash_intensity(self.last_hit_tick, now, fade_ticks)
    }
}

/// Zone kinds; jump and speed help, slow and vortex hinder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneKind {
    Jump,
    Speed,
    Slow,
    Vortex,
}

impl ZoneKind {
    pub const ALL: [ZoneKind; 4] = [ZoneKind::Jump, ZoneKind::Speed, ZoneKind::Slow, ZoneKind::Vortex];

    #[inline]
    pub fn is_bonus(&self) -> bool {
        matches!(self, ZoneKind::Jump | ZoneKind::Speed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ZoneKind::Jump => "jump",
            ZoneKind::Speed => "speed",
            ZoneKind::Slow => "slow",
            ZoneKind::Vortex => "vortex",
        }
    }
}

/// Axis-aligned sensor region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    /// Top-left corner
    pub min: Vec2,
    pub size: Vec2,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
    pub last_hit_tick: Option<u64>,
}

impl Zone {
    pub fn new(kind: ZoneKind, min: Vec2, size: Vec2) -> Self {
        Self {
            kind,
            min,
            size,
            body: None,
            last_hit_tick: None,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.min + self.size * 0.5
    }

    #[inline]
    pub fn is_bonus(&self) -> bool {
        self.kind.is_bonus()
    }

    pub fn mark_hit(&mut self, tick: u64) {
        self.last_hit_tick = Some(self.last_hit_tick.map_or(tick, |t| t.max(tick)));
    }

    pub fn flash(&self, now: u64, fade_ticks: u64) -> f32 {
        flash_intensity(self.last_hit_tick, now, fade_ticks)
    }
}

fn flash_intensity(last_hit: Option<u64>, now: u64, fade_ticks: u64) -> f32 {
    match last_hit {
        Some(hit) if fade_ticks > 0 => {
            let age = now.saturating_sub(hit) as f32;
            (1.0 - age / fade_ticks as f32).max(0.0)
        }
        _ => 0.0,
    }
}

/// One entrant's ball
#[derive(Debug, Clone, Serialize)]
pub struct Ball {
    /// Stable entrant index (0..N-1)
    pub index: usize,
    pub name: String,
    pub color: &'static str,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
    /// Recent positions, oldest first (rendering only)
    #[serde(skip)]
    pub trail: VecDeque<Vec2>,
    pub finished: bool,
    pub winner: bool,
    /// Consecutive ticks spent below the stall speed
    pub stuck_timer: u32,
    /// Stall kicks in a row that failed to move the ball further down
    pub kick_streak: u32,
    /// Height of the most recent stall kick
    pub last_kick_y: Option<f32>,
    /// Tick of the last wormhole teleport
    pub last_warp_tick: Option<u64>,
    /// Resting place of a finished ball whose body left the world
    pub parked_at: Option<Vec2>,
}

impl Ball {
    pub fn new(index: usize, name: impl Into<String>, color: &'static str) -> Self {
        Self {
            index,
            name: name.into(),
            color,
            body: None,
            trail: VecDeque::new(),
            finished: false,
            winner: false,
            stuck_timer: 0,
            kick_streak: 0,
            last_kick_y: None,
            last_warp_tick: None,
            parked_at: None,
        }
    }

    /// Current position: the live body, or where the ball was parked
    pub fn position<W: PhysicsWorld + ?Sized>(&self, world: &W) -> Option<Vec2> {
        self.body.and_then(|h| world.position(h)).or(self.parked_at)
    }

    /// Record a trail point, dropping the oldest beyond `max_len`
    pub fn record_trail(&mut self, pos: Vec2, max_len: usize) {
        if max_len == 0 {
            self.trail.clear();
            return;
        }
        self.trail.push_back(pos);
        while self.trail.len() > max_len {
            self.trail.pop_front();
        }
    }

    /// True if a warp at `now` is allowed under `cooldown` ticks
    pub fn can_warp(&self, now: u64, cooldown: u64) -> bool {
        match self.last_warp_tick {
            Some(last) => now.saturating_sub(last) > cooldown,
            None => true,
        }
    }
}

/// Something the UI layer may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RaceEvent {
    ZoneTriggered { ball: usize, zone: usize, kind: ZoneKind },
    BumperHit { ball: usize, obstacle: usize },
    Launched { ball: usize, obstacle: usize },
    WallBounce { ball: usize, obstacle: usize },
    Warped { ball: usize, entry: usize, exit: usize },
    Unstuck { ball: usize },
    Finished { ball: usize, rank: usize, winner: bool },
    WinnersDecided { winners: Vec<usize> },
    RaceFinished,
}

impl RaceEvent {
    /// Finishes and race-level transitions, as opposed to effect feedback
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            RaceEvent::Finished { .. } | RaceEvent::WinnersDecided { .. } | RaceEvent::RaceFinished
        )
    }
}

/// Undrained events beyond which effect feedback is dropped
pub const EVENT_BACKLOG: usize = 4096;

/// Events waiting for the UI layer
///
/// Lifecycle events always queue. Effect feedback stops queueing once
/// [`EVENT_BACKLOG`] events are waiting, so a session nobody drains stays
/// bounded at a few thousand entries plus one finish per ball.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQueue {
    events: Vec<RaceEvent>,
    dropped: u64,
}

impl EventQueue {
    pub fn push(&mut self, event: RaceEvent) {
        if self.events.len() >= EVENT_BACKLOG && !event.is_lifecycle() {
            if self.dropped == 0 {
                log::debug!("Event backlog full, dropping effect feedback until drained");
            }
            self.dropped += 1;
            return;
        }
        self.events.push(event);
    }

    /// Take every pending event, oldest first
    pub fn drain(&mut self) -> Vec<RaceEvent> {
        self.dropped = 0;
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Effect events dropped since the last drain
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &RaceEvent> {
        self.events.iter()
    }
}
