//! Anti-stuck watchdog
//!
//! Runs once per tick regardless of collisions. Pulls balls that tunneled
//! into a wall back inside and kicks balls that have stalled for too long.
//!
//! A stall kick points mostly downward. When the next stall comes before the
//! ball made real progress, the kicks escalate: the ball is popped upward and
//! sideways, alternating sides, until it clears whatever it is wedged in.

use glam::Vec2;
use rand::Rng;

use super::boundary::WallBounds;
use super::physics::PhysicsWorld;
use super::session::RaceSession;
use super::state::RaceEvent;
use crate::consts::BALL_RADIUS;

/// Penetration past this distance from the wall triggers a clamp
pub const WALL_TRIGGER_MARGIN: f32 = BALL_RADIUS + 5.0;
/// Clamped balls are placed this far from the wall
pub const WALL_SNAP_MARGIN: f32 = BALL_RADIUS + 8.0;
/// A stall this far below the previous kick counts as progress
pub const KICK_PROGRESS: f32 = BALL_RADIUS * 4.0;

/// Escape velocity for the `streak`-th kick in a row
fn escape_kick<R: Rng + ?Sized>(streak: u32, pos: Vec2, walls: WallBounds, rng: &mut R) -> Vec2 {
    if streak <= 1 {
        return Vec2::new((rng.random::<f32>() - 0.5) * 5.0, 2.0 + rng.random::<f32>() * 3.0);
    }
    let inward = if pos.x < walls.center() { 1.0 } else { -1.0 };
    let side = if streak % 2 == 0 { inward } else { -inward };
    Vec2::new(
        side * (2.0 + rng.random::<f32>() * 1.5),
        -(2.0 + rng.random::<f32>()),
    )
}

/// Check every racing ball once
pub fn run<W: PhysicsWorld>(session: &mut RaceSession<W>) {
    let Some(track) = session.track.as_ref() else {
        return;
    };
    let layout = track.layout;
    let budget = session.settings.stuck_tick_budget;
    let stuck_speed = session.settings.stuck_speed;

    for ball in session.balls.iter_mut().filter(|b| !b.finished) {
        let Some(body) = ball.body else {
            continue;
        };
        let (Some(pos), Some(vel)) = (session.world.position(body), session.world.velocity(body)) else {
            continue;
        };

        let walls = layout.boundary(pos.y);
        if pos.x < walls.left + WALL_TRIGGER_MARGIN {
            session.world.set_position(body, Vec2::new(walls.left + WALL_SNAP_MARGIN, pos.y));
            session.world.set_velocity(body, Vec2::new(vel.x.abs() + 1.0, vel.y));
        } else if pos.x > walls.right - WALL_TRIGGER_MARGIN {
            session.world.set_position(body, Vec2::new(walls.right - WALL_SNAP_MARGIN, pos.y));
            session.world.set_velocity(body, Vec2::new(-(vel.x.abs() + 1.0), vel.y));
        }

        if vel.length() < stuck_speed {
            ball.stuck_timer += 1;
            if ball.stuck_timer > budget {
                let progressed = ball.last_kick_y.is_none_or(|y| pos.y > y + KICK_PROGRESS);
                ball.kick_streak = if progressed { 1 } else { ball.kick_streak + 1 };
                ball.last_kick_y = Some(pos.y);

                let kick = escape_kick(ball.kick_streak, pos, walls, &mut session.rng);
                session.world.set_velocity(body, kick);
                ball.stuck_timer = 0;
                log::debug!("Kicked stalled ball {} (streak {})", ball.name, ball.kick_streak);
                session.events.push(RaceEvent::Unstuck { ball: ball.index });
            }
        } else {
            ball.stuck_timer = ball.stuck_timer.saturating_sub(1);
        }
    }
}
