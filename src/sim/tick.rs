//! Fixed timestep simulation tick
//!
//! One tick: turn the rotating fixtures, step the physics world, dispatch the
//! step's collision-start pairs, run the watchdog, record trails.

use super::dispatch::apply_collisions;
use super::physics::PhysicsWorld;
use super::session::RaceSession;
use super::watchdog;
use crate::consts::{BALL_RADIUS, SIM_DT};

/// Advance the race by one fixed timestep
///
/// Returns false without touching anything once the session was reset.
pub fn tick<W: PhysicsWorld>(session: &mut RaceSession<W>) -> bool {
    if !session.world_active {
        return false;
    }

    // Spinners and gates turn at a fixed rate per tick
    if let Some(track) = session.track.as_mut() {
        for obstacle in &mut track.obstacles {
            let (Some(spin), Some(body)) = (obstacle.kind.spin(), obstacle.body) else {
                continue;
            };
            obstacle.angle += spin;
            session.world.set_angle(body, obstacle.angle);
        }
    }

    let pairs = session.world.step(SIM_DT);
    apply_collisions(session, &pairs);
    watchdog::run(session);

    // Finished balls leave the world once clear of the finish line
    if let Some(track) = session.track.as_ref() {
        let clear_y = track.finish.y + BALL_RADIUS * 2.0;
        for ball in session.balls.iter_mut().filter(|b| b.finished) {
            let Some(body) = ball.body else {
                continue;
            };
            if let Some(pos) = session.world.position(body).filter(|p| p.y > clear_y) {
                session.world.remove_body(body);
                ball.body = None;
                ball.parked_at = Some(pos);
            }
        }
    }

    // Trails (rendering only)
    let trail_length = session.settings.trail_length;
    for ball in &mut session.balls {
        if let Some(pos) = ball.body.and_then(|b| session.world.position(b)) {
            ball.record_trail(pos, trail_length);
        }
    }

    session.tick += 1;
    true
}
