//! Rapier-backed physics world
//!
//! [`RapierWorld`] drives the race on rapier2d. The engine works in pixels
//! and pixels per reference tick; rapier works in pixels and pixels per
//! second, so velocities are scaled by the tick rate on the way in and out.
//!
//! Each body owns exactly one collider. Both carry the body's slot index in
//! `user_data`, which is how collision events map back to [`BodyHandle`]s.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use glam::Vec2;
use rapier2d::prelude::*;

use super::physics::{BodyDesc, BodyHandle, BodyKind, CollisionPair, PhysicsWorld, Shape};
use super::state::BodyTag;
use crate::consts::TICKS_PER_SECOND;

/// Gravity scalar to px/s² (same fall rate as [`super::world::SimpleWorld`])
const GRAVITY_SCALE: f32 = 1000.0;
/// Roughly 1% velocity loss per tick
const AIR_DAMPING: f32 = 0.6;
/// Rapier's internal tolerances assume metres
const PIXELS_PER_METRE: f32 = 50.0;

const TICK_RATE: f32 = TICKS_PER_SECOND as f32;

fn to_na(v: Vec2) -> Vector<Real> {
    vector![v.x, v.y]
}

fn from_na(v: &Vector<Real>) -> Vec2 {
    Vec2::new(v.x, v.y)
}

/// Collects collision events raised during a pipeline step
#[derive(Default)]
struct EventCollector {
    collisions: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        let mut guard = self.collisions.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.collisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    body: RigidBodyHandle,
    kind: BodyKind,
    tag: BodyTag,
}

/// [`PhysicsWorld`] on top of rapier2d
pub struct RapierWorld {
    gravity: f32,
    max_substeps: u32,
    slots: Vec<Option<Slot>>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    events: EventCollector,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RapierWorld {
    /// Each [`PhysicsWorld::step`] runs `max_substeps` pipeline steps
    pub fn new(max_substeps: u32) -> Self {
        let integration_parameters = IntegrationParameters {
            length_unit: PIXELS_PER_METRE,
            ..IntegrationParameters::default()
        };
        Self {
            gravity: 1.0,
            max_substeps: max_substeps.max(1),
            slots: Vec::new(),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            events: EventCollector::default(),
        }
    }

    fn slot(&self, handle: BodyHandle) -> Option<&Slot> {
        self.slots.get(handle.0 as usize).and_then(Option::as_ref)
    }

    fn rigid_body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.slot(handle).and_then(|slot| self.bodies.get(slot.body))
    }

    fn rigid_body_mut(&mut self, handle: BodyHandle) -> Option<(&mut RigidBody, BodyKind)> {
        let slot = *self.slot(handle)?;
        self.bodies.get_mut(slot.body).map(|rb| (rb, slot.kind))
    }

    fn handle_of(&self, collider: ColliderHandle) -> Option<BodyHandle> {
        let index = self.colliders.get(collider)?.user_data;
        let handle = BodyHandle(u32::try_from(index).ok()?);
        self.slot(handle).map(|_| handle)
    }
}

impl PhysicsWorld for RapierWorld {
    fn set_gravity(&mut self, gravity: f32) {
        self.gravity = gravity;
    }

    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let index = self.slots.len();
        let user_data = index as u128;

        let body_type = match desc.kind {
            BodyKind::Static => RigidBodyType::Fixed,
            BodyKind::Kinematic => RigidBodyType::KinematicPositionBased,
            BodyKind::Dynamic => RigidBodyType::Dynamic,
        };
        let dynamic = desc.kind == BodyKind::Dynamic;
        let rb = RigidBodyBuilder::new(body_type)
            .translation(to_na(desc.pos))
            .rotation(desc.angle)
            .ccd_enabled(dynamic)
            .can_sleep(!dynamic)
            .linear_damping(if dynamic { AIR_DAMPING } else { 0.0 })
            .user_data(user_data)
            .build();
        let body = self.bodies.insert(rb);

        let shape = match desc.shape {
            Shape::Circle { radius } => ColliderBuilder::ball(radius),
            Shape::Rect { width, height } => ColliderBuilder::cuboid(width * 0.5, height * 0.5),
        };
        let collider = shape
            .sensor(desc.sensor)
            .restitution(desc.restitution)
            .restitution_combine_rule(CoefficientCombineRule::Max)
            .friction(desc.friction)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .density(desc.density)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(user_data)
            .build();
        self.colliders.insert_with_parent(collider, body, &mut self.bodies);

        self.slots.push(Some(Slot {
            body,
            kind: desc.kind,
            tag: desc.tag,
        }));
        BodyHandle(index as u32)
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        let Some(slot) = self.slots.get_mut(handle.0 as usize).and_then(Option::take) else {
            return;
        };
        self.bodies.remove(
            slot.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    fn clear(&mut self) {
        let gravity = self.gravity;
        *self = Self::new(self.max_substeps);
        self.gravity = gravity;
    }

    fn step(&mut self, dt: f32) -> Vec<CollisionPair> {
        if dt <= 0.0 {
            return Vec::new();
        }
        self.integration_parameters.dt = dt / self.max_substeps as f32;
        let gravity = vector![0.0, self.gravity * GRAVITY_SCALE];

        let mut started = Vec::new();
        let mut seen = BTreeSet::new();
        for _ in 0..self.max_substeps {
            self.pipeline.step(
                &gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &self.events,
            );

            for event in self.events.drain() {
                let CollisionEvent::Started(h1, h2, _) = event else {
                    continue;
                };
                let (Some(a), Some(b)) = (self.handle_of(h1), self.handle_of(h2)) else {
                    continue;
                };
                let pair = CollisionPair::new(a, b);
                if seen.insert(pair.key()) {
                    started.push(pair);
                }
            }
        }
        started
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid_body(handle).map(|rb| from_na(rb.translation()))
    }

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.rigid_body(handle).map(|rb| from_na(rb.linvel()) / TICK_RATE)
    }

    fn angle(&self, handle: BodyHandle) -> Option<f32> {
        self.rigid_body(handle).map(|rb| rb.rotation().angle())
    }

    fn tag(&self, handle: BodyHandle) -> Option<BodyTag> {
        self.slot(handle).map(|slot| slot.tag)
    }

    fn set_position(&mut self, handle: BodyHandle, pos: Vec2) {
        if let Some((rb, kind)) = self.rigid_body_mut(handle) {
            match kind {
                BodyKind::Kinematic => rb.set_next_kinematic_translation(to_na(pos)),
                _ => rb.set_translation(to_na(pos), true),
            }
        }
    }

    fn set_velocity(&mut self, handle: BodyHandle, vel: Vec2) {
        if let Some((rb, BodyKind::Dynamic)) = self.rigid_body_mut(handle) {
            rb.set_linvel(to_na(vel * TICK_RATE), true);
        }
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) {
        if let Some((rb, kind)) = self.rigid_body_mut(handle) {
            match kind {
                BodyKind::Kinematic => rb.set_next_kinematic_rotation(Rotation::new(angle)),
                _ => rb.set_rotation(Rotation::new(angle), true),
            }
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;

    fn ball(pos: Vec2) -> BodyDesc {
        BodyDesc::circle(pos, 9.0, BodyTag::Ball(0))
            .with_kind(BodyKind::Dynamic)
            .with_restitution(0.4)
            .with_density(0.0012)
    }

    #[test]
    fn test_ball_falls() {
        let mut world = RapierWorld::default();
        world.set_gravity(0.35);
        let h = world.add_body(ball(Vec2::new(100.0, 100.0)));
        for _ in 0..30 {
            world.step(SIM_DT);
        }
        let pos = world.position(h).unwrap();
        assert!(pos.y > 110.0, "ball should fall, got {pos:?}");
        assert!((pos.x - 100.0).abs() < 1e-3);
        assert!(world.velocity(h).unwrap().y > 0.0);
    }

    #[test]
    fn test_velocity_in_pixels_per_tick() {
        let mut world = RapierWorld::default();
        let h = world.add_body(ball(Vec2::ZERO));
        world.set_velocity(h, Vec2::new(3.0, -2.0));
        let vel = world.velocity(h).unwrap();
        assert!((vel - Vec2::new(3.0, -2.0)).length() < 1e-4);
    }

    #[test]
    fn test_sensor_overlap_reported_once() {
        let mut world = RapierWorld::default();
        world.set_gravity(0.0);
        let zone = world.add_body(
            BodyDesc::rect(Vec2::new(100.0, 140.0), 80.0, 20.0, BodyTag::Zone(0)).as_sensor(),
        );
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.set_velocity(b, Vec2::new(0.0, 2.0));

        let mut starts = Vec::new();
        for _ in 0..60 {
            starts.extend(world.step(SIM_DT));
        }
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].key(), CollisionPair::new(zone, b).key());
        // Sensors never push back
        assert!(world.position(b).unwrap().y > 160.0);
    }

    #[test]
    fn test_solid_pin_deflects() {
        let mut world = RapierWorld::default();
        world.set_gravity(0.0);
        world.add_body(BodyDesc::circle(Vec2::new(100.0, 130.0), 10.0, BodyTag::Wall).with_restitution(0.8));
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.set_velocity(b, Vec2::new(0.0, 3.0));
        for _ in 0..20 {
            world.step(SIM_DT);
        }
        assert!(world.velocity(b).unwrap().y < 0.0);
        assert!(world.position(b).unwrap().y < 111.0);
    }

    #[test]
    fn test_kinematic_bar_turns() {
        let mut world = RapierWorld::default();
        let bar = world.add_body(
            BodyDesc::rect(Vec2::new(200.0, 200.0), 60.0, 6.0, BodyTag::Obstacle(0)).with_kind(BodyKind::Kinematic),
        );
        world.set_angle(bar, 0.5);
        world.step(SIM_DT);
        assert!((world.angle(bar).unwrap() - 0.5).abs() < 1e-4);
        assert!(world.position(bar).unwrap().distance(Vec2::new(200.0, 200.0)) < 1e-4);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut world = RapierWorld::default();
        world.set_gravity(0.5);
        let a = world.add_body(ball(Vec2::ZERO));
        let b = world.add_body(ball(Vec2::new(50.0, 0.0)));
        assert_eq!(world.body_count(), 2);
        world.remove_body(a);
        world.remove_body(a);
        assert_eq!(world.body_count(), 1);
        assert!(world.position(a).is_none());
        assert_eq!(world.tag(b), Some(BodyTag::Ball(0)));
        world.set_velocity(a, Vec2::ONE);

        world.clear();
        assert_eq!(world.body_count(), 0);
        assert!(world.tag(b).is_none());
        // Gravity survives a clear
        let c = world.add_body(ball(Vec2::ZERO));
        world.step(SIM_DT);
        assert!(world.velocity(c).unwrap().y > 0.0);
    }
}
