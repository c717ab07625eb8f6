//! Finish order, winners and the read-only race view
//!
//! The finish order is authoritative: a ball's rank is fixed the moment it
//! first touches the finish sensor and is never re-derived from positions.

use glam::Vec2;
use serde::Serialize;

/// Race-level lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RacePhase {
    /// Nothing dropped yet
    Idle,
    /// Balls in flight, winners not yet decided
    Running,
    /// Enough balls finished to decide the winners; stragglers still racing
    WinnersDecided,
    /// Every ball has finished
    Finished,
}

/// Outcome of a ball crossing the finish line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinishRecord {
    /// 1-based
    pub rank: usize,
    pub winner: bool,
    /// This finish decided the winner set
    pub reveals_winners: bool,
    /// This was the last ball
    pub race_complete: bool,
}

/// Ranking state for one race
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceState {
    pub finish_order: Vec<usize>,
    pub winner_count: usize,
    pub total_balls: usize,
    /// True from the drop until every ball has finished
    pub running: bool,
    dropped: bool,
}

impl RaceState {
    pub fn new(total_balls: usize, winner_count: usize) -> Self {
        Self {
            finish_order: Vec::with_capacity(total_balls),
            winner_count,
            total_balls,
            running: false,
            dropped: false,
        }
    }

    /// Idle to running. Returns false (and changes nothing) while running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.finish_order.clear();
        self.running = true;
        self.dropped = true;
        true
    }

    /// Record `ball` crossing the finish line
    ///
    /// Returns `None` if the race is not running, the ball is unknown, or it
    /// already finished.
    pub fn record_finish(&mut self, ball: usize) -> Option<FinishRecord> {
        if !self.running || ball >= self.total_balls || self.finish_order.contains(&ball) {
            return None;
        }
        self.finish_order.push(ball);

        let rank = self.finish_order.len();
        if rank >= self.total_balls {
            self.running = false;
        }
        Some(FinishRecord {
            rank,
            winner: rank <= self.winner_count,
            reveals_winners: rank == self.winner_count,
            race_complete: !self.running,
        })
    }

    /// 1-based rank of `ball`, if it has finished
    pub fn rank_of(&self, ball: usize) -> Option<usize> {
        self.finish_order.iter().position(|&b| b == ball).map(|i| i + 1)
    }

    /// Winners decided so far, in finish order
    pub fn winners(&self) -> &[usize] {
        let n = self.winner_count.min(self.finish_order.len());
        &self.finish_order[..n]
    }

    pub fn winners_decided(&self) -> bool {
        self.finish_order.len() >= self.winner_count
    }

    pub fn is_complete(&self) -> bool {
        self.dropped && self.finish_order.len() >= self.total_balls
    }

    pub fn phase(&self) -> RacePhase {
        if !self.dropped {
            RacePhase::Idle
        } else if self.is_complete() {
            RacePhase::Finished
        } else if self.winners_decided() {
            RacePhase::WinnersDecided
        } else {
            RacePhase::Running
        }
    }
}

/// Scoreboard label for a rank
pub fn medal(rank: usize) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("#{n}"),
    }
}

/// One ball as the UI sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BallSnapshot {
    pub index: usize,
    pub name: String,
    pub color: &'static str,
    pub pos: Vec2,
    pub finished: bool,
    pub winner: bool,
    pub rank: Option<usize>,
}

/// Read-only view of a race, polled once per rendered frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub phase: RacePhase,
    pub running: bool,
    pub winner_count: usize,
    pub finish_order: Vec<usize>,
    pub balls: Vec<BallSnapshot>,
    /// Ball the camera should follow
    pub camera_target: Option<usize>,
}

impl RaceSnapshot {
    /// Names of the decided winners, in finish order
    pub fn winner_names(&self) -> Vec<&str> {
        self.finish_order
            .iter()
            .take(self.winner_count)
            .filter_map(|&i| self.balls.get(i))
            .map(|b| b.name.as_str())
            .collect()
    }
}
