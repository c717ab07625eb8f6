//! Physics adapter interface
//!
//! The race engine does not integrate bodies itself. It describes bodies,
//! hands them to a [`PhysicsWorld`], and reacts to the collision-start pairs
//! the world reports each step. [`super::rapier::RapierWorld`] is the
//! production world; [`super::world::SimpleWorld`] is a small deterministic
//! stand-in used by tests and the `--engine simple` runner mode.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::state::BodyTag;

/// Opaque handle to a body owned by the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyHandle(pub u32);

/// Collision geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f32 },
    /// Axis-aligned before `angle` is applied
    Rect { width: f32, height: f32 },
}

impl Shape {
    /// Radius of a circle enclosing the shape (broad phase)
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Shape::Circle { radius } => radius,
            Shape::Rect { width, height } => 0.5 * (width * width + height * height).sqrt(),
        }
    }
}

/// How a body participates in integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    /// Never moves
    Static,
    /// Moved only by explicit position/angle updates
    Kinematic,
    /// Integrated under gravity and contacts
    Dynamic,
}

/// Everything needed to create a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDesc {
    pub shape: Shape,
    pub kind: BodyKind,
    pub pos: Vec2,
    pub angle: f32,
    /// Sensors report overlaps but never push back
    pub sensor: bool,
    pub restitution: f32,
    pub friction: f32,
    pub density: f32,
    /// Back-reference to the race descriptor this body belongs to
    pub tag: BodyTag,
}

impl BodyDesc {
    /// Static circle with default material
    pub fn circle(pos: Vec2, radius: f32, tag: BodyTag) -> Self {
        Self {
            shape: Shape::Circle { radius },
            kind: BodyKind::Static,
            pos,
            angle: 0.0,
            sensor: false,
            restitution: 0.0,
            friction: 0.0,
            density: 0.001,
            tag,
        }
    }

    /// Static rectangle centered on `pos` with default material
    pub fn rect(pos: Vec2, width: f32, height: f32, tag: BodyTag) -> Self {
        Self {
            shape: Shape::Rect { width, height },
            ..Self::circle(pos, 0.0, tag)
        }
    }

    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn as_sensor(mut self) -> Self {
        self.sensor = true;
        self
    }
}

/// Two bodies that started touching during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair {
    pub a: BodyHandle,
    pub b: BodyHandle,
}

impl CollisionPair {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        Self { a, b }
    }

    /// Order-independent key
    pub fn key(&self) -> (BodyHandle, BodyHandle) {
        if self.a <= self.b {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        }
    }
}

/// A rigid-body world the race engine can drive
///
/// Getters return `None` and setters do nothing for handles the world does
/// not know (for example after a reset).
pub trait PhysicsWorld {
    /// Downward gravity scalar
    fn set_gravity(&mut self, gravity: f32);

    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle;

    /// Register a batch of bodies, returning handles in input order
    fn add_bodies(&mut self, descs: Vec<BodyDesc>) -> Vec<BodyHandle> {
        descs.into_iter().map(|desc| self.add_body(desc)).collect()
    }

    fn remove_body(&mut self, handle: BodyHandle);

    /// Remove every body
    fn clear(&mut self);

    /// Advance by `dt` seconds and return the pairs that started touching
    fn step(&mut self, dt: f32) -> Vec<CollisionPair>;

    fn position(&self, handle: BodyHandle) -> Option<Vec2>;
    fn velocity(&self, handle: BodyHandle) -> Option<Vec2>;
    fn angle(&self, handle: BodyHandle) -> Option<f32>;
    fn tag(&self, handle: BodyHandle) -> Option<BodyTag>;

    fn set_position(&mut self, handle: BodyHandle, pos: Vec2);
    fn set_velocity(&mut self, handle: BodyHandle, vel: Vec2);
    fn set_angle(&mut self, handle: BodyHandle, angle: f32);

    /// Number of live bodies
    fn body_count(&self) -> usize;
}
