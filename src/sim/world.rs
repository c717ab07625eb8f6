//! Reference physics world
//!
//! A small impulse-based world good enough to run races headless: gravity,
//! air drag, circle and rotated-rectangle contacts with restitution, sensors,
//! and collision-start reporting. Dynamic bodies always collide as circles of
//! their bounding radius (every ball is a circle).
//!
//! Velocities are in pixels per reference tick (1/60 s), matching the effect
//! constants used by the dispatcher.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;

use super::physics::{BodyDesc, BodyHandle, BodyKind, CollisionPair, PhysicsWorld, Shape};
use super::state::BodyTag;
use crate::consts::SIM_DT;

/// Converts the gravity scalar into px/tick² (1e-3 scale at a 16.7 ms tick)
const GRAVITY_SCALE: f32 = 0.001 * (1000.0 / 60.0) * (1000.0 / 60.0);
/// Fraction of velocity lost to drag per tick
const AIR_FRICTION: f32 = 0.01;
/// Largest distance a dynamic body may travel in one substep
const MAX_SUBSTEP_TRAVEL: f32 = 4.0;
/// Height of one broad-phase band
const BAND_HEIGHT: f32 = 64.0;
/// Extra query reach covering pushes applied while a body is resolved
const BAND_SLACK: f32 = 16.0;

/// Contact between a dynamic circle and another body
#[derive(Debug, Clone, Copy)]
struct Contact {
    /// Points from the other body toward the circle
    normal: Vec2,
    penetration: f32,
}

#[derive(Debug, Clone, Copy)]
struct Body {
    shape: Shape,
    kind: BodyKind,
    sensor: bool,
    restitution: f32,
    friction: f32,
    tag: BodyTag,
    pos: Vec2,
    vel: Vec2,
    angle: f32,
}

impl Body {
    fn from_desc(desc: BodyDesc) -> Self {
        Self {
            shape: desc.shape,
            kind: desc.kind,
            sensor: desc.sensor,
            restitution: desc.restitution,
            friction: desc.friction,
            tag: desc.tag,
            pos: desc.pos,
            vel: Vec2::ZERO,
            angle: desc.angle,
        }
    }

    #[inline]
    fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    #[inline]
    fn radius(&self) -> f32 {
        self.shape.bounding_radius()
    }
}

/// Signed distance from a circle center to a circle, with the outward normal
fn circle_contact(p: Vec2, r: f32, center: Vec2, other_r: f32) -> Option<Contact> {
    let d = p - center;
    let dist = d.length();
    let reach = r + other_r;
    if dist >= reach {
        return None;
    }
    let normal = if dist > 1e-5 { d / dist } else { Vec2::NEG_Y };
    Some(Contact {
        normal,
        penetration: reach - dist,
    })
}

/// Circle against a rectangle rotated by `angle` about its center
fn rect_contact(p: Vec2, r: f32, center: Vec2, half: Vec2, angle: f32) -> Option<Contact> {
    let local = Vec2::from_angle(-angle).rotate(p - center);
    let closest = local.clamp(-half, half);
    let diff = local - closest;
    let dist_sq = diff.length_squared();

    let (normal_local, penetration) = if dist_sq > 1e-10 {
        let dist = dist_sq.sqrt();
        if dist >= r {
            return None;
        }
        (diff / dist, r - dist)
    } else {
        // Center inside the box: push out along the shallowest axis
        let dx = half.x - local.x.abs();
        let dy = half.y - local.y.abs();
        if dx < dy {
            (Vec2::new(local.x.signum(), 0.0), r + dx)
        } else {
            (Vec2::new(0.0, local.y.signum()), r + dy)
        }
    };

    Some(Contact {
        normal: Vec2::from_angle(angle).rotate(normal_local),
        penetration,
    })
}

fn contact(circle: &Body, other: &Body) -> Option<Contact> {
    let r = circle.radius();
    if other.is_dynamic() {
        return circle_contact(circle.pos, r, other.pos, other.radius());
    }
    match other.shape {
        Shape::Circle { radius } => circle_contact(circle.pos, r, other.pos, radius),
        Shape::Rect { width, height } => rect_contact(
            circle.pos,
            r,
            other.pos,
            Vec2::new(width * 0.5, height * 0.5),
            other.angle,
        ),
    }
}

/// Fixed and kinematic bodies bucketed by the horizontal bands they overlap
#[derive(Debug, Clone, Default)]
struct Bands {
    bands: BTreeMap<i32, Vec<usize>>,
    stale: bool,
}

impl Bands {
    fn band(y: f32) -> i32 {
        (y / BAND_HEIGHT).floor() as i32
    }

    fn rebuild(&mut self, bodies: &[Option<Body>]) {
        self.bands.clear();
        for (i, body) in bodies.iter().enumerate() {
            let Some(body) = body.as_ref().filter(|b| !b.is_dynamic()) else {
                continue;
            };
            let r = body.radius();
            for band in Self::band(body.pos.y - r)..=Self::band(body.pos.y + r) {
                self.bands.entry(band).or_default().push(i);
            }
        }
        self.stale = false;
    }

    /// Indices of non-dynamic bodies whose band overlaps `y ± reach`
    fn near(&self, y: f32, reach: f32, out: &mut Vec<usize>) {
        for indices in self.bands.range(Self::band(y - reach)..=Self::band(y + reach)).map(|(_, v)| v) {
            out.extend_from_slice(indices);
        }
    }
}

/// Reflect the normal component of `vel` with restitution, if approaching
#[inline]
fn bounce(vel: Vec2, normal: Vec2, restitution: f32) -> Vec2 {
    let vn = vel.dot(normal);
    if vn >= 0.0 {
        return vel;
    }
    vel - (1.0 + restitution) * vn * normal
}

/// Bundled [`PhysicsWorld`] implementation
///
/// Handles index straight into the body list; [`PhysicsWorld::clear`] starts
/// numbering from zero again.
#[derive(Debug, Clone)]
pub struct SimpleWorld {
    bodies: Vec<Option<Body>>,
    gravity: f32,
    max_substeps: u32,
    /// Pairs touching at the end of the previous step
    contacts: BTreeSet<(BodyHandle, BodyHandle)>,
    bands: Bands,
    live: usize,
}

impl Default for SimpleWorld {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SimpleWorld {
    pub fn new(max_substeps: u32) -> Self {
        Self {
            bodies: Vec::new(),
            gravity: 1.0,
            max_substeps: max_substeps.max(1),
            contacts: BTreeSet::new(),
            bands: Bands::default(),
            live: 0,
        }
    }

    fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0 as usize).and_then(Option::as_ref)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0 as usize).and_then(Option::as_mut)
    }

    /// Substeps needed so no dynamic body skips past a thin fixture
    fn substeps_for(&self, scale: f32) -> u32 {
        let fastest = self
            .bodies
            .iter()
            .flatten()
            .filter(|b| b.is_dynamic())
            .map(|b| b.vel.length())
            .fold(0.0f32, f32::max);
        let needed = (fastest * scale / MAX_SUBSTEP_TRAVEL).ceil() as u32;
        needed.clamp(1, self.max_substeps)
    }

    fn integrate(&mut self, h: f32) {
        let accel = Vec2::new(0.0, self.gravity * GRAVITY_SCALE * h);
        let drag = (1.0 - AIR_FRICTION * h).max(0.0);
        for body in self.bodies.iter_mut().flatten() {
            if body.is_dynamic() {
                body.vel = (body.vel + accel) * drag;
                body.pos += body.vel * h;
            }
        }
    }

    /// Detect and resolve contacts, collecting touching pairs in detection order
    fn resolve(
        &mut self,
        touching: &mut Vec<(BodyHandle, BodyHandle)>,
        seen: &mut BTreeSet<(BodyHandle, BodyHandle)>,
    ) {
        if self.bands.stale {
            self.bands.rebuild(&self.bodies);
        }
        let dynamic: Vec<usize> = (0..self.bodies.len())
            .filter(|&i| self.bodies[i].is_some_and(|b| b.is_dynamic()))
            .collect();

        let mut candidates = Vec::new();
        for &i in &dynamic {
            let Some(mut a) = self.bodies[i] else {
                continue;
            };

            // Fixtures near the body, then dynamic pairs once from the lower index
            candidates.clear();
            self.bands.near(a.pos.y, a.radius() + BAND_SLACK, &mut candidates);
            candidates.extend(dynamic.iter().copied().filter(|&j| j > i));
            candidates.sort_unstable();
            candidates.dedup();

            for &j in &candidates {
                let Some(mut b) = self.bodies[j] else {
                    continue;
                };
                // Bounding circles
                let reach = a.radius() + b.radius();
                if (a.pos - b.pos).length_squared() > reach * reach {
                    continue;
                }
                let Some(hit) = contact(&a, &b) else {
                    continue;
                };

                let key = CollisionPair::new(BodyHandle(i as u32), BodyHandle(j as u32)).key();
                if seen.insert(key) {
                    touching.push(key);
                }
                if a.sensor || b.sensor {
                    continue;
                }

                let restitution = a.restitution.max(b.restitution);
                if b.is_dynamic() {
                    let correction = hit.normal * (hit.penetration * 0.5);
                    a.pos += correction;
                    b.pos -= correction;
                    let rel = a.vel - b.vel;
                    let vn = rel.dot(hit.normal);
                    if vn < 0.0 {
                        let impulse = -(1.0 + restitution) * vn * 0.5;
                        a.vel += hit.normal * impulse;
                        b.vel -= hit.normal * impulse;
                    }
                    self.bodies[j] = Some(b);
                } else {
                    a.pos += hit.normal * hit.penetration;
                    a.vel = bounce(a.vel, hit.normal, restitution);
                    let friction = a.friction.min(b.friction).clamp(0.0, 1.0);
                    if friction > 0.0 {
                        let tangent = a.vel - hit.normal * a.vel.dot(hit.normal);
                        a.vel -= tangent * friction;
                    }
                }
            }

            self.bodies[i] = Some(a);
        }
    }
}

impl PhysicsWorld for SimpleWorld {
    fn set_gravity(&mut self, gravity: f32) {
        self.gravity = gravity;
    }

    fn add_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.bodies.len() as u32);
        self.bands.stale |= desc.kind != BodyKind::Dynamic;
        self.bodies.push(Some(Body::from_desc(desc)));
        self.live += 1;
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        let removed = self.bodies.get_mut(handle.0 as usize).and_then(Option::take);
        if let Some(body) = removed {
            self.live -= 1;
            self.bands.stale |= !body.is_dynamic();
            self.contacts.retain(|&(a, b)| a != handle && b != handle);
        }
    }

    fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.bands = Bands::default();
        self.live = 0;
    }

    fn step(&mut self, dt: f32) -> Vec<CollisionPair> {
        let scale = (dt / SIM_DT).max(0.0);
        if scale == 0.0 {
            return Vec::new();
        }
        let substeps = self.substeps_for(scale);
        let h = scale / substeps as f32;

        let mut touching = Vec::new();
        let mut seen = BTreeSet::new();
        for _ in 0..substeps {
            self.integrate(h);
            self.resolve(&mut touching, &mut seen);
        }

        let started = touching
            .iter()
            .filter(|key| !self.contacts.contains(key))
            .map(|&(a, b)| CollisionPair::new(a, b))
            .collect();
        self.contacts = seen;
        started
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.body(handle).map(|b| b.pos)
    }

    fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.body(handle).map(|b| b.vel)
    }

    fn angle(&self, handle: BodyHandle) -> Option<f32> {
        self.body(handle).map(|b| b.angle)
    }

    fn tag(&self, handle: BodyHandle) -> Option<BodyTag> {
        self.body(handle).map(|b| b.tag)
    }

    fn set_position(&mut self, handle: BodyHandle, pos: Vec2) {
        let Some(body) = self.body_mut(handle) else {
            return;
        };
        body.pos = pos;
        let moved_fixture = !body.is_dynamic();
        self.bands.stale |= moved_fixture;
    }

    fn set_velocity(&mut self, handle: BodyHandle, vel: Vec2) {
        if let Some(body) = self.body_mut(handle) {
            body.vel = vel;
        }
    }

    fn set_angle(&mut self, handle: BodyHandle, angle: f32) {
        if let Some(body) = self.body_mut(handle) {
            body.angle = angle;
        }
    }

    fn body_count(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(pos: Vec2) -> BodyDesc {
        BodyDesc::circle(pos, 9.0, BodyTag::Ball(0))
            .with_kind(BodyKind::Dynamic)
            .with_restitution(0.4)
    }

    #[test]
    fn test_ball_falls() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.35);
        let h = world.add_body(ball(Vec2::new(100.0, 100.0)));
        for _ in 0..30 {
            world.step(SIM_DT);
        }
        let pos = world.position(h).unwrap();
        assert!(pos.y > 100.0);
        assert!((pos.x - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_collision_start_reported_once() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        let pin = world.add_body(BodyDesc::circle(Vec2::new(100.0, 120.0), 5.0, BodyTag::Obstacle(0)).as_sensor());
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.set_velocity(b, Vec2::new(0.0, 1.0));

        let mut starts = Vec::new();
        for _ in 0..20 {
            starts.extend(world.step(SIM_DT));
        }
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].key(), CollisionPair::new(pin, b).key());
    }

    #[test]
    fn test_sensor_does_not_push() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        world.add_body(BodyDesc::rect(Vec2::new(100.0, 100.0), 60.0, 20.0, BodyTag::Zone(0)).as_sensor());
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.set_velocity(b, Vec2::new(0.0, 1.0));
        world.step(SIM_DT);
        assert_eq!(world.velocity(b).unwrap(), Vec2::new(0.0, 1.0) * (1.0 - AIR_FRICTION));
    }

    #[test]
    fn test_solid_circle_bounces() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        world.add_body(BodyDesc::circle(Vec2::new(100.0, 120.0), 10.0, BodyTag::Wall).with_restitution(0.8));
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.set_velocity(b, Vec2::new(0.0, 3.0));
        for _ in 0..5 {
            world.step(SIM_DT);
        }
        assert!(world.velocity(b).unwrap().y < 0.0);
    }

    #[test]
    fn test_rotated_rect_contact_normal() {
        // Flat bar, circle just above it
        let hit = rect_contact(Vec2::new(0.0, -10.0), 9.0, Vec2::ZERO, Vec2::new(30.0, 2.5), 0.0).unwrap();
        assert!((hit.normal - Vec2::NEG_Y).length() < 1e-5);
        assert!((hit.penetration - 1.5).abs() < 1e-5);

        // Same bar turned a quarter: circle above the end now misses
        let miss = rect_contact(
            Vec2::new(20.0, -10.0),
            9.0,
            Vec2::ZERO,
            Vec2::new(30.0, 2.5),
            std::f32::consts::FRAC_PI_2,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut world = SimpleWorld::default();
        let a = world.add_body(ball(Vec2::ZERO));
        let b = world.add_body(ball(Vec2::new(50.0, 0.0)));
        assert_eq!(world.body_count(), 2);
        world.remove_body(a);
        assert_eq!(world.body_count(), 1);
        assert!(world.position(a).is_none());
        // Setting a removed body is ignored
        world.set_velocity(a, Vec2::ONE);
        world.clear();
        assert_eq!(world.body_count(), 0);
        assert!(world.tag(b).is_none());
    }

    #[test]
    fn test_moved_fixture_still_collides() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        let pin = world.add_body(BodyDesc::circle(Vec2::new(100.0, 500.0), 10.0, BodyTag::Wall).with_restitution(0.8));
        let b = world.add_body(ball(Vec2::new(100.0, 100.0)));
        world.step(SIM_DT);

        // Far outside the ball's band until moved right under it
        world.set_position(pin, Vec2::new(100.0, 130.0));
        world.set_velocity(b, Vec2::new(0.0, 3.0));
        let mut starts = Vec::new();
        for _ in 0..10 {
            starts.extend(world.step(SIM_DT));
        }
        assert_eq!(starts.len(), 1);
        assert!(world.velocity(b).unwrap().y < 0.0);
    }

    #[test]
    fn test_tall_fixture_spans_bands() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        // Wall segment covering many bands; ball touches it far from its center
        world.add_body(BodyDesc::rect(Vec2::new(0.0, 1000.0), 20.0, 2000.0, BodyTag::Wall));
        let b = world.add_body(ball(Vec2::new(30.0, 1800.0)));
        world.set_velocity(b, Vec2::new(-4.0, 0.0));
        for _ in 0..10 {
            world.step(SIM_DT);
        }
        assert!(world.position(b).unwrap().x >= 19.0 - 1e-3);
        assert!(world.velocity(b).unwrap().x >= 0.0);
    }

    #[test]
    fn test_balls_push_apart() {
        let mut world = SimpleWorld::default();
        world.set_gravity(0.0);
        let a = world.add_body(ball(Vec2::new(100.0, 100.0)));
        let b = world.add_body(ball(Vec2::new(110.0, 100.0)));
        let starts = world.step(SIM_DT);
        assert_eq!(starts.len(), 1);
        let gap = (world.position(a).unwrap() - world.position(b).unwrap()).length();
        assert!(gap >= 18.0 - 1e-3);
    }
}
