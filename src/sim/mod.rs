//! Deterministic race simulation
//!
//! All gameplay logic lives here. Given the same seed, settings and physics
//! world, a race replays identically:
//! - Fixed timestep only
//! - Seeded RNG only, owned by the session
//! - Stable iteration order (by ball, obstacle and zone index)
//! - No rendering or platform dependencies

pub mod boundary;
pub mod dispatch;
pub mod physics;
pub mod rapier;
pub mod ranking;
pub mod session;
pub mod state;
pub mod tick;
pub mod track;
pub mod watchdog;
pub mod world;

pub use boundary::{ChannelLayout, WallBounds};
pub use dispatch::apply_collisions;
pub use physics::{BodyDesc, BodyHandle, BodyKind, CollisionPair, PhysicsWorld, Shape};
pub use rapier::RapierWorld;
pub use ranking::{BallSnapshot, FinishRecord, RacePhase, RaceSnapshot, RaceState, medal};
pub use session::{RaceConfig, RaceSession, parse_names, winner_count_from_input};
pub use state::{
    Ball, BodyTag, EventQueue, Obstacle, ObstacleKind, RaceEvent, Stage, StageKind, WallSide, WormholeRole, Zone,
    ZoneKind,
};
pub use tick::tick;
pub use track::{PassabilityReport, PinRow, Track, stages_for};
pub use world::SimpleWorld;
