//! Collision effect dispatch
//!
//! Turns the collision-start pairs of one physics step into gameplay effects.
//! A pair matters only when exactly one side is a racing ball; the other side
//! is looked up through its [`BodyTag`]. Pairs matching nothing are dropped.

use glam::Vec2;
use rand::Rng;

use super::physics::{BodyHandle, CollisionPair, PhysicsWorld};
use super::session::RaceSession;
use super::state::{BodyTag, ObstacleKind, RaceEvent, WormholeRole, ZoneKind};
use crate::consts::BALL_RADIUS;

/// Velocity a finished ball settles with
const FINISH_DRIFT: Vec2 = Vec2::new(0.0, 0.5);
/// Slowest a bumper ever sends a ball away
const BUMPER_MIN_SPEED: f32 = 4.0;
const BUMPER_GAIN: f32 = 1.2;
/// Extra gap between a wormhole exit mouth and the arriving ball
const WARP_CLEARANCE: f32 = 6.0;

/// Apply every effect in a step's collision batch, in reported order
///
/// Returns the number of effects applied.
pub fn apply_collisions<W: PhysicsWorld>(session: &mut RaceSession<W>, pairs: &[CollisionPair]) -> usize {
    if !session.race.running {
        return 0;
    }
    pairs.iter().filter(|pair| apply_pair(session, **pair)).count()
}

/// Split a pair into (ball index, ball body, other tag)
fn classify<W: PhysicsWorld>(world: &W, pair: CollisionPair) -> Option<(usize, BodyHandle, BodyTag)> {
    let ta = world.tag(pair.a)?;
    let tb = world.tag(pair.b)?;
    match (ta, tb) {
        (BodyTag::Ball(_), BodyTag::Ball(_)) => None,
        (BodyTag::Ball(i), other) => Some((i, pair.a, other)),
        (other, BodyTag::Ball(i)) => Some((i, pair.b, other)),
        _ => None,
    }
}

fn apply_pair<W: PhysicsWorld>(session: &mut RaceSession<W>, pair: CollisionPair) -> bool {
    let Some((index, body, other)) = classify(&session.world, pair) else {
        return false;
    };
    match session.balls.get(index) {
        Some(ball) if ball.body == Some(body) && !ball.finished => {}
        _ => return false,
    }

    match other {
        BodyTag::Zone(zone) => apply_zone(session, index, body, zone),
        BodyTag::Obstacle(obstacle) => apply_obstacle(session, index, body, obstacle),
        BodyTag::FinishLine => finish(session, index, body),
        BodyTag::Wall | BodyTag::Ball(_) => false,
    }
}

fn apply_zone<W: PhysicsWorld>(session: &mut RaceSession<W>, ball: usize, body: BodyHandle, zone: usize) -> bool {
    let now = session.tick;
    let Some(z) = session.track.as_mut().and_then(|t| t.zones.get_mut(zone)) else {
        return false;
    };
    z.mark_hit(now);
    let kind = z.kind;

    let Some(vel) = session.world.velocity(body) else {
        return false;
    };
    let rng = &mut session.rng;
    let new_vel = match kind {
        ZoneKind::Jump => Vec2::new(vel.x * 0.6, -(8.0 + rng.random::<f32>() * 3.0)),
        ZoneKind::Speed => vel * Vec2::new(1.4, 1.3),
        ZoneKind::Slow => vel * 0.2,
        ZoneKind::Vortex => {
            let push = if rng.random_bool(0.5) { 4.0 } else { -4.0 };
            Vec2::new(vel.x + push, vel.y)
        }
    };
    session.world.set_velocity(body, new_vel);

    if session.settings.log_effects {
        log::debug!("{} hit {} zone", session.balls[ball].name, kind.label());
    }
    session.events.push(RaceEvent::ZoneTriggered { ball, zone, kind });
    true
}

fn apply_obstacle<W: PhysicsWorld>(
    session: &mut RaceSession<W>,
    ball: usize,
    body: BodyHandle,
    obstacle: usize,
) -> bool {
    let now = session.tick;
    let Some(o) = session.track.as_mut().and_then(|t| t.obstacles.get_mut(obstacle)) else {
        return false;
    };
    o.mark_hit(now);
    let (kind, center) = (o.kind, o.pos);

    let (Some(pos), Some(vel)) = (session.world.position(body), session.world.velocity(body)) else {
        return false;
    };

    let event = match kind {
        ObstacleKind::Bumper { .. } => {
            let d = pos - center;
            let angle = d.y.atan2(d.x);
            let power = (vel.length() * BUMPER_GAIN).max(BUMPER_MIN_SPEED);
            session.world.set_velocity(body, Vec2::from_angle(angle) * power);
            RaceEvent::BumperHit { ball, obstacle }
        }
        ObstacleKind::Launcher { .. } => {
            let vx = (session.rng.random::<f32>() - 0.5) * 4.0;
            let vy = -(10.0 + session.rng.random::<f32>() * 5.0);
            session.world.set_velocity(body, Vec2::new(vx, vy));
            RaceEvent::Launched { ball, obstacle }
        }
        ObstacleKind::WallBounceSegment { side, .. } => {
            let vx = side.inward() * session.rng.random_range(3.0f32..9.0);
            let vy = -session.rng.random_range(2.0f32..7.0);
            session.world.set_velocity(body, Vec2::new(vx, vy));
            RaceEvent::WallBounce { ball, obstacle }
        }
        ObstacleKind::Wormhole {
            role: WormholeRole::Entry,
            ..
        } => match warp(session, ball, body) {
            Some(exit) => RaceEvent::Warped {
                ball,
                entry: obstacle,
                exit,
            },
            None => return false,
        },
        // Engine restitution handles the rest
        ObstacleKind::Pin
        | ObstacleKind::Spinner { .. }
        | ObstacleKind::Ramp { .. }
        | ObstacleKind::RotatingGate { .. }
        | ObstacleKind::Wormhole { .. } => return false,
    };

    if session.settings.log_effects {
        log::debug!("{} hit {}", session.balls[ball].name, kind.label());
    }
    session.events.push(event);
    true
}

/// Teleport through an entry wormhole; returns the exit used
///
/// Does nothing while the ball's cooldown runs or when there are no exits.
fn warp<W: PhysicsWorld>(session: &mut RaceSession<W>, ball: usize, body: BodyHandle) -> Option<usize> {
    let now = session.tick;
    if !session.balls[ball].can_warp(now, session.settings.warp_cooldown_ticks) {
        return None;
    }
    let track = session.track.as_ref()?;
    let exits = track.wormhole_exits();
    if exits.is_empty() {
        return None;
    }
    let exit = exits[session.rng.random_range(0..exits.len())];

    let target = match track.obstacles[exit].kind {
        ObstacleKind::Wormhole { radius, side, .. } => {
            track.obstacles[exit].pos + Vec2::X * side.inward() * (radius + BALL_RADIUS + WARP_CLEARANCE)
        }
        _ => return None,
    };
    let vel = Vec2::new(
        session.rng.random_range(-1.5..=1.5),
        session.rng.random_range(1.0..=3.0),
    );
    session.world.set_position(body, target);
    session.world.set_velocity(body, vel);
    session.balls[ball].last_warp_tick = Some(now);

    if let Some(o) = session.track.as_mut().and_then(|t| t.obstacles.get_mut(exit)) {
        o.mark_hit(now);
    }
    Some(exit)
}

fn finish<W: PhysicsWorld>(session: &mut RaceSession<W>, ball: usize, body: BodyHandle) -> bool {
    let Some(record) = session.race.record_finish(ball) else {
        return false;
    };
    session.world.set_velocity(body, FINISH_DRIFT);

    let b = &mut session.balls[ball];
    b.finished = true;
    b.winner = record.winner;
    log::info!("{} finished #{}{}", b.name, record.rank, if record.winner { " (winner)" } else { "" });

    session.events.push(RaceEvent::Finished {
        ball,
        rank: record.rank,
        winner: record.winner,
    });
    if record.reveals_winners {
        let winners = session.race.winners().to_vec();
        let names: Vec<&str> = winners.iter().map(|&i| session.balls[i].name.as_str()).collect();
        log::info!("Winners decided: {}", names.join(", "));
        session.events.push(RaceEvent::WinnersDecided { winners });
    }
    if record.race_complete {
        log::info!("Race complete after {} ticks", session.tick);
        session.events.push(RaceEvent::RaceFinished);
    }
    true
}
