//! One race, start to finish
//!
//! [`RaceSession`] owns everything a race touches: the physics world, the
//! generated track, the balls, the ranking state, the RNG and the event queue.
//! Every component receives the session explicitly.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::boundary::ChannelLayout;
use super::physics::{BodyDesc, BodyKind, PhysicsWorld};
use super::ranking::{BallSnapshot, RacePhase, RaceSnapshot, RaceState};
use super::state::{Ball, BodyTag, EventQueue, RaceEvent};
use super::tick;
use super::track::Track;
use super::world::SimpleWorld;
use crate::consts::*;
use crate::entrant_color;
use crate::error::{RaceError, Result};
use crate::settings::Settings;

/// Validated entrant list and winner count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    names: Vec<String>,
    winner_count: usize,
}

impl RaceConfig {
    /// Validate entrants and winner count
    pub fn new(names: Vec<String>, winner_count: usize) -> Result<Self> {
        let entrants = check_entrants(names.len())?;
        if winner_count == 0 || winner_count >= entrants {
            return Err(RaceError::winner_count(winner_count, entrants));
        }
        Ok(Self {
            names,
            winner_count,
        })
    }

    /// Build a config from setup-form input
    ///
    /// One name per line, trimmed, blank lines dropped. The winner count falls
    /// back to 1 when unset, unparsable or zero, then clamps to leave at least
    /// one loser.
    pub fn from_input(raw_names: &str, winner_input: Option<&str>) -> Result<Self> {
        let names = parse_names(raw_names);
        let entrants = check_entrants(names.len())?;
        let winner_count = winner_count_from_input(winner_input, entrants);
        Self::new(names, winner_count)
    }

    /// `count` entrants named "Ball 1", "Ball 2", ...
    pub fn numbered(count: usize, winner_count: usize) -> Result<Self> {
        Self::new((1..=count).map(|i| format!("Ball {i}")).collect(), winner_count)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn entrants(&self) -> usize {
        self.names.len()
    }

    pub fn winner_count(&self) -> usize {
        self.winner_count
    }
}

fn check_entrants(entrants: usize) -> Result<usize> {
    if entrants < MIN_ENTRANTS {
        Err(RaceError::TooFewEntrants(entrants))
    } else if entrants > MAX_ENTRANTS {
        Err(RaceError::TooManyEntrants(entrants))
    } else {
        Ok(entrants)
    }
}

/// Split raw input into entrant names
pub fn parse_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Winner count from free-form input, clamped to `1..=entrants-1`
///
/// Only the leading run of digits counts, so `"3.7"` and `"3 winners"` both
/// ask for three. Anything without leading digits falls back to one.
pub fn winner_count_from_input(input: Option<&str>, entrants: usize) -> usize {
    let requested = input
        .map(|s| {
            let s = s.trim_start();
            s.strip_prefix('+').unwrap_or(s)
        })
        .and_then(|s| {
            let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            // Saturate oversized counts; the clamp below caps them anyway
            s[..end].parse::<u64>().ok().or((end > 0).then_some(u64::MAX))
        })
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .filter(|&n| n > 0)
        .unwrap_or(1);
    requested.clamp(1, entrants.saturating_sub(1).max(1))
}

/// A single race
pub struct RaceSession<W: PhysicsWorld = SimpleWorld> {
    pub(crate) world: W,
    pub(crate) settings: Settings,
    pub(crate) config: RaceConfig,
    pub(crate) track: Option<Track>,
    pub(crate) balls: Vec<Ball>,
    pub(crate) race: RaceState,
    pub(crate) rng: Pcg32,
    pub(crate) tick: u64,
    pub(crate) events: EventQueue,
    /// Cleared by [`RaceSession::reset`]; ticks are refused afterwards
    pub(crate) world_active: bool,
    seed: u64,
}

impl<W: PhysicsWorld> RaceSession<W> {
    /// Idle session with no track yet
    pub fn new(mut world: W, config: RaceConfig, settings: Settings, seed: u64) -> Self {
        world.set_gravity(settings.gravity);
        let race = RaceState::new(config.entrants(), config.winner_count());
        Self {
            world,
            settings,
            config,
            track: None,
            balls: Vec::new(),
            race,
            rng: Pcg32::seed_from_u64(seed),
            tick: 0,
            events: EventQueue::default(),
            world_active: true,
            seed,
        }
    }

    /// Build the track and drop the balls
    pub fn start(world: W, config: RaceConfig, settings: Settings, seed: u64) -> Self {
        let mut session = Self::new(world, config, settings, seed);
        session.build_track();
        session.drop_balls();
        session
    }

    /// Generate a fresh track, replacing any previous one
    pub fn build_track(&mut self) {
        if let Some(mut old) = self.track.take() {
            old.teardown(&mut self.world);
        }
        let entrants = self.config.entrants();
        let mut track = Track::generate(ChannelLayout::for_entrants(entrants), entrants, &mut self.rng);
        track.register(&mut self.world);
        self.track = Some(track);
        self.world_active = true;
    }

    /// Spawn one ball per entrant above the first stage
    ///
    /// No-op while a race is running or before a track exists.
    pub fn drop_balls(&mut self) -> bool {
        if self.race.running || self.track.is_none() || !self.world_active {
            return false;
        }
        for handle in self.balls.drain(..).filter_map(|b| b.body) {
            self.world.remove_body(handle);
        }
        self.race = RaceState::new(self.config.entrants(), self.config.winner_count());
        self.race.start();

        let n = self.config.entrants();
        let spacing = 40.0f32.min((CHANNEL_WIDTH - WALL_THICKNESS * 2.0 - 80.0) / n as f32);
        let start_x = (CHANNEL_WIDTH - spacing * (n - 1) as f32) / 2.0;

        let mut descs = Vec::with_capacity(n);
        for (i, name) in self.config.names.iter().enumerate() {
            let x = start_x + i as f32 * spacing + (self.rng.random::<f32>() - 0.5) * 8.0;
            let y = 36.0 + self.rng.random::<f32>() * 10.0;
            descs.push(
                BodyDesc::circle(Vec2::new(x, y), BALL_RADIUS, BodyTag::Ball(i))
                    .with_kind(BodyKind::Dynamic)
                    .with_restitution(BALL_RESTITUTION)
                    .with_friction(BALL_FRICTION)
                    .with_density(BALL_DENSITY),
            );
            self.balls.push(Ball::new(i, name.clone(), entrant_color(i)));
        }
        let handles = self.world.add_bodies(descs);
        for (ball, handle) in self.balls.iter_mut().zip(handles) {
            ball.body = Some(handle);
        }

        log::info!(
            "Dropped {} balls (seed {}), {} winner(s)",
            n,
            self.seed,
            self.config.winner_count()
        );
        true
    }

    /// Advance one fixed step. Returns false once the session was reset.
    pub fn tick(&mut self) -> bool {
        tick::tick(self)
    }

    /// Tick until every ball finished or `max_ticks` elapsed
    ///
    /// Returns true if the race completed.
    pub fn run_to_completion(&mut self, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if !self.race.running || !self.tick() {
                break;
            }
        }
        self.race.is_complete()
    }

    /// Tear the world down and discard all race state
    pub fn reset(&mut self) {
        self.world.clear();
        self.track = None;
        self.balls.clear();
        self.events.clear();
        self.race = RaceState::new(self.config.entrants(), self.config.winner_count());
        self.world_active = false;
        log::info!("Race reset after {} ticks", self.tick);
    }

    /// Take the pending events, oldest first
    pub fn drain_events(&mut self) -> Vec<RaceEvent> {
        self.events.drain()
    }

    /// Events waiting to be drained
    pub fn pending_events(&self) -> &EventQueue {
        &self.events
    }

    /// Unfinished ball furthest down the channel
    pub fn camera_target(&self) -> Option<usize> {
        self.balls
            .iter()
            .filter(|b| !b.finished)
            .filter_map(|b| Some((b.index, self.world.position(b.body?)?)))
            .max_by(|a, b| a.1.y.total_cmp(&b.1.y))
            .map(|(i, _)| i)
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let balls = self
            .balls
            .iter()
            .map(|b| BallSnapshot {
                index: b.index,
                name: b.name.clone(),
                color: b.color,
                pos: b.position(&self.world).unwrap_or(Vec2::ZERO),
                finished: b.finished,
                winner: b.winner,
                rank: self.race.rank_of(b.index),
            })
            .collect();
        RaceSnapshot {
            tick: self.tick,
            phase: self.race.phase(),
            running: self.race.running,
            winner_count: self.race.winner_count,
            finish_order: self.race.finish_order.clone(),
            balls,
            camera_target: self.camera_target(),
        }
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    pub fn race(&self) -> &RaceState {
        &self.race
    }

    pub fn phase(&self) -> RacePhase {
        self.race.phase()
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Ticks simulated so far
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_world_active(&self) -> bool {
        self.world_active
    }
}
