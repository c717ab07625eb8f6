//! Procedural track generation
//!
//! A track is six themed stages stacked down the channel. Placement is
//! randomized inside fixed structure: every obstacle center stays inside the
//! safe corridor (live wall inset by the decoration radius plus clearance),
//! and rows whose corridor is too narrow are skipped instead of failing.
//!
//! Generation is pure ([`Track::generate`]); bodies are created afterwards in
//! a single batch by [`Track::register`].

use glam::Vec2;
use rand::Rng;
use serde::Serialize;

use super::boundary::{ChannelLayout, WallBounds};
use super::physics::{BodyDesc, BodyHandle, BodyKind, PhysicsWorld};
use super::state::{
    BodyTag, Obstacle, ObstacleKind, Stage, StageKind, WallSide, WormholeRole, Zone, ZoneKind,
};
use crate::consts::*;

/// Stage table for the base channel: (name, y_start, color, kind)
const STAGE_TABLE: [(&str, f32, &str, StageKind); 6] = [
    ("PIN FIELD", 100.0, "#00ffff", StageKind::Pins),
    ("BUMPER ZONE", 520.0, "#ff8800", StageKind::Bumpers),
    ("SPINNER ALLEY", 860.0, "#aa44ff", StageKind::Spinners),
    ("RAMP CANYON", 1200.0, "#00ddff", StageKind::Ramps),
    ("LAUNCH PAD", 1540.0, "#ff4400", StageKind::Launchers),
    ("FINAL RUN", 1900.0, "#ffff00", StageKind::Final),
];
/// Bottom of the last stage in the base channel (its finish line)
const BASE_TRACK_BOTTOM: f32 = BASE_CHANNEL_HEIGHT - FINISH_MARGIN;

/// Wormhole mouth radius
pub const WORMHOLE_RADIUS: f32 = 18.0;
/// Shared tint of wormhole mouths
pub const WORMHOLE_COLOR: &str = "#bf5fff";
/// Radius of the bumps in a wall-bounce segment
pub const WALL_BOUNCE_RADIUS: f32 = 10.0;
/// Bumps per wall-bounce segment
const WALL_BOUNCE_BUMPS: usize = 3;
/// Rotating gate bar length (shrinks in narrow corridors)
const GATE_WIDTH: f32 = 50.0;
/// Rotating gate speed (rad/tick)
const GATE_SPIN: f32 = 0.01;
/// Gates sit this far above the finish line
const GATE_OFFSETS: [f32; 2] = [95.0, 45.0];
/// Final-stage pins stop this far above the finish so the gates stay clear
const GATE_CLEARANCE: f32 = 125.0;
/// Spinner and ramp bar thickness
const BAR_THICKNESS: f32 = 5.0;
const GATE_THICKNESS: f32 = 6.0;

/// Narrowest gap a placed fixture may leave next to another solid
const PASSAGE: f32 = BALL_RADIUS * 2.0 + 4.0;
/// Candidate positions tried before a fixture is skipped
const PLACEMENT_ATTEMPTS: usize = 8;
/// Fixtures further apart than this vertically never need a clearance check
const NEIGHBORHOOD: f32 = 140.0;
/// Row spacing of the passability sweep, also the disc spacing along bars
const SWEEP_STEP: f32 = 2.0;

/// Decorative bump embedded in a wall (no game effect)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallBump {
    pub pos: Vec2,
    pub radius: f32,
    pub side: WallSide,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

/// One generated row of pins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinRow {
    /// Nominal row height (pins jitter a few px around it)
    pub y: f32,
    /// Safe corridor the row was placed in
    pub corridor: WallBounds,
    /// Indices into [`Track::obstacles`]
    pub pins: Vec<usize>,
}

/// Finish sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishLine {
    pub y: f32,
    pub width: f32,
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

/// Result of the post-generation passability sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassabilityReport {
    pub rows_checked: usize,
    /// Rows where no ball coming from the top can continue downward
    pub blocked_rows: Vec<f32>,
    /// Resting spots a ball can fall into but never leave going down
    pub pockets: Vec<Vec2>,
}

impl PassabilityReport {
    pub fn is_passable(&self) -> bool {
        self.blocked_rows.is_empty() && self.pockets.is_empty()
    }
}

/// A generated track
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub layout: ChannelLayout,
    pub stages: Vec<Stage>,
    pub obstacles: Vec<Obstacle>,
    pub zones: Vec<Zone>,
    pub wall_bumps: Vec<WallBump>,
    pub pin_rows: Vec<PinRow>,
    pub finish: FinishLine,
    /// Top and bottom slabs
    #[serde(skip)]
    wall_bodies: Vec<BodyHandle>,
}

/// Rescale the stage table to a channel
pub fn stages_for(layout: &ChannelLayout) -> Vec<Stage> {
    let span = layout.finish_y - TRACK_TOP;
    let base_span = BASE_TRACK_BOTTOM - TRACK_TOP;
    let starts: Vec<f32> = STAGE_TABLE
        .iter()
        .map(|&(_, y, _, _)| TRACK_TOP + (y - TRACK_TOP) / base_span * span)
        .collect();

    STAGE_TABLE
        .iter()
        .enumerate()
        .map(|(i, &(name, _, color, kind))| Stage {
            name,
            y_start: starts[i],
            y_end: starts.get(i + 1).copied().unwrap_or(layout.finish_y),
            color,
            kind,
        })
        .collect()
}

/// Smallest surface-to-surface distance between two disc outlines
fn outline_gap(a: &[(Vec2, f32)], b: &[(Vec2, f32)]) -> f32 {
    a.iter()
        .flat_map(|&(pa, ra)| b.iter().map(move |&(pb, rb)| pa.distance(pb) - ra - rb))
        .fold(f32::INFINITY, f32::min)
}

/// Solids a ball can come to rest against (pins and ramps never move or kick)
fn is_fixed_solid(kind: &ObstacleKind) -> bool {
    matches!(kind, ObstacleKind::Pin | ObstacleKind::Ramp { .. })
}

/// Maximal free runs of `[lo, hi]` once `blocked` is taken out
fn free_spans(lo: f32, hi: f32, blocked: &mut [(f32, f32)]) -> Vec<(f32, f32)> {
    blocked.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut spans = Vec::new();
    let mut cursor = lo;
    for &(start, end) in blocked.iter() {
        if cursor >= hi {
            break;
        }
        if start > cursor {
            spans.push((cursor, start.min(hi)));
        }
        cursor = cursor.max(end);
    }
    if cursor < hi {
        spans.push((cursor, hi));
    }
    spans
}

#[inline]
fn overlaps(a: (f32, f32), b: (f32, f32)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Accumulates descriptors while a track is generated
struct TrackBuilder<'a, R: Rng + ?Sized> {
    layout: ChannelLayout,
    rng: &'a mut R,
    wall_bumps: Vec<WallBump>,
    obstacles: Vec<Obstacle>,
    zones: Vec<Zone>,
    pin_rows: Vec<PinRow>,
}

impl<'a, R: Rng + ?Sized> TrackBuilder<'a, R> {
    /// Safe corridor at `y`, or `None` when it is too narrow to use
    fn corridor(&self, y: f32) -> Option<WallBounds> {
        let c = self.layout.corridor(y);
        (c.width() >= MIN_CORRIDOR_WIDTH).then_some(c)
    }

    /// Uniform offset in [-amount/2, amount/2)
    fn jitter(&mut self, amount: f32) -> f32 {
        (self.rng.random::<f32>() - 0.5) * amount
    }

    fn push(&mut self, obstacle: Obstacle) -> usize {
        self.obstacles.push(obstacle);
        self.obstacles.len() - 1
    }

    /// `outline` keeps a ball's passage from every nearby obstacle `include` selects
    fn clear_of(&self, near: Vec2, outline: &[(Vec2, f32)], include: impl Fn(&ObstacleKind) -> bool) -> bool {
        self.obstacles
            .iter()
            .filter(|o| include(&o.kind) && (o.pos.y - near.y).abs() < NEIGHBORHOOD)
            .all(|o| outline_gap(outline, &o.outline()) >= PASSAGE)
    }

    /// A disc at `point` keeps a ball's passage from both live walls and their bumps
    fn clear_of_walls(&self, point: Vec2, radius: f32) -> bool {
        let walls = self.layout.boundary(point.y);
        point.x - radius - walls.left >= PASSAGE
            && walls.right - point.x - radius >= PASSAGE
            && self
                .wall_bumps
                .iter()
                .filter(|b| (b.pos.y - point.y).abs() < NEIGHBORHOOD)
                .all(|b| b.pos.distance(point) - b.radius - radius >= PASSAGE)
    }

    fn pin_fits(&self, pos: Vec2) -> bool {
        self.clear_of_walls(pos, PIN_RADIUS)
            && self.clear_of(pos, &[(pos, PIN_RADIUS)], |k| !matches!(k, ObstacleKind::Pin))
    }

    /// Either end of a bar can wedge a ball against a wall bump, so the whole bar keeps clear
    fn ramp_fits(&self, ramp: &Obstacle) -> bool {
        let outline = ramp.outline();
        !outline.is_empty()
            && outline.iter().all(|&(point, radius)| self.clear_of_walls(point, radius))
            && self.clear_of(ramp.pos, &outline, |_| true)
    }

    fn zone(&mut self, kind: ZoneKind, area: WallBounds, y: f32) {
        let w = 44.0 + self.rng.random::<f32>() * 20.0;
        let h = 20.0;
        let room = area.width() - w - 20.0;
        if room <= 0.0 {
            return;
        }
        let x = area.left + self.rng.random::<f32>() * room + 10.0;
        self.zones.push(Zone::new(kind, Vec2::new(x, y - 5.0), Vec2::new(w, h)));
    }

    /// Irregular pin lattice: two skipped columns per row, alternating offset
    fn pin_field(&mut self, stage: &Stage) {
        const GAP_Y: f32 = 48.0;
        let rows = (stage.height() / GAP_Y).floor() as usize;
        for row in 0..rows {
            let y = stage.y_start + 30.0 + row as f32 * GAP_Y;
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let avail = area.width();
            let cols = (avail / 52.0).floor() as usize;
            if cols == 0 {
                continue;
            }
            let skip1 = self.rng.random_range(0..cols);
            let skip2 = self.rng.random_range(0..cols);
            let offset = (if row % 2 == 0 { 0.0 } else { 26.0 }) + self.jitter(8.0);
            let step = (avail - 40.0) / (cols.max(2) - 1) as f32;

            let mut pins = Vec::new();
            for col in 0..cols {
                if col == skip1 || col == skip2 {
                    continue;
                }
                let x = area.left + 20.0 + col as f32 * step + offset;
                if x > area.left + 10.0 && x < area.right - 10.0 {
                    let pos = Vec2::new(x, y + self.jitter(6.0));
                    if self.pin_fits(pos) {
                        pins.push(self.push(Obstacle::new(ObstacleKind::Pin, pos)));
                    }
                }
            }
            self.pin_rows.push(PinRow {
                y,
                corridor: area,
                pins,
            });

            if self.rng.random_bool(0.2) {
                let kind = ZoneKind::ALL[self.rng.random_range(0..ZoneKind::ALL.len())];
                self.zone(kind, area, y);
            }
        }
    }

    /// Thin pin backdrop around a stage's signature obstacles
    fn sparse_pins(&mut self, stage: &Stage, gap_y: f32, max_skip: usize) {
        let rows = (stage.height() / gap_y).floor() as usize;
        for row in 0..rows {
            let y = stage.y_start + 20.0 + row as f32 * gap_y;
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let avail = area.width();
            let cols = (avail / 58.0).floor() as usize;
            if cols == 0 {
                continue;
            }
            let skip_count = 1 + self.rng.random_range(0..max_skip.min(cols - 1).max(1));
            let mut skips = Vec::with_capacity(skip_count);
            while skips.len() < skip_count.min(cols) {
                let col = self.rng.random_range(0..cols);
                if !skips.contains(&col) {
                    skips.push(col);
                }
            }
            let offset = (if row % 2 == 0 { 0.0 } else { 29.0 }) + self.jitter(10.0);
            let step = (avail - 40.0) / (cols.max(2) - 1) as f32;

            let mut pins = Vec::new();
            for col in (0..cols).filter(|c| !skips.contains(c)) {
                let x = area.left + 20.0 + col as f32 * step + offset;
                if x > area.left + 10.0 && x < area.right - 10.0 {
                    let pos = Vec2::new(x, y + self.jitter(8.0));
                    if self.pin_fits(pos) {
                        pins.push(self.push(Obstacle::new(ObstacleKind::Pin, pos)));
                    }
                }
            }
            self.pin_rows.push(PinRow {
                y,
                corridor: area,
                pins,
            });
        }
    }

    /// Evenly spaced heights across a stage, `margin` in from each end
    fn spread(stage: &Stage, count: usize, margin: f32) -> impl Iterator<Item = f32> {
        let span = stage.height() - margin * 2.0;
        let start = stage.y_start + margin;
        (0..count).map(move |i| start + span * (i as f32 / (count.max(2) - 1) as f32))
    }

    fn bumper_at(&mut self, y: f32) {
        let Some(area) = self.corridor(y) else {
            return;
        };
        let radius = 14.0 + self.rng.random::<f32>() * 12.0;
        for _ in 0..PLACEMENT_ATTEMPTS {
            let x = area.left + radius + self.rng.random::<f32>() * (area.width() - radius * 2.0);
            let pos = Vec2::new(x, y);
            if self.clear_of(pos, &[(pos, radius)], |k| matches!(k, ObstacleKind::Ramp { .. })) {
                self.push(Obstacle::new(ObstacleKind::Bumper { radius }, pos));
                return;
            }
        }
    }

    fn spinner_at(&mut self, y: f32, clockwise: bool) {
        let Some(area) = self.corridor(y) else {
            return;
        };
        let width = 55.0 + self.rng.random::<f32>() * 35.0;
        let x = area.left + width / 2.0 + self.rng.random::<f32>() * (area.width() - width).max(0.0);
        let dir = if clockwise { 1.0 } else { -1.0 };
        let angular_velocity = dir * (0.012 + self.rng.random::<f32>() * 0.012);
        self.push(Obstacle::new(
            ObstacleKind::Spinner {
                width,
                angular_velocity,
            },
            Vec2::new(x, y),
        ));
    }

    fn launcher_at(&mut self, y: f32) {
        let Some(area) = self.corridor(y) else {
            return;
        };
        let x = area.left + 30.0 + self.rng.random::<f32>() * (area.width() - 60.0);
        self.push(Obstacle::new(ObstacleKind::Launcher { radius: 16.0 }, Vec2::new(x, y)));
    }

    fn bumpers(&mut self, stage: &Stage, count: usize) {
        let spacing = stage.height() / count as f32;
        let heights: Vec<f32> = Self::spread(stage, count, 30.0).collect();
        for y in heights {
            let y = y + self.jitter(spacing * 0.6);
            self.bumper_at(y.clamp(stage.y_start + 20.0, stage.y_end - 20.0));
        }
    }

    fn spinners(&mut self, stage: &Stage, count: usize) {
        let heights: Vec<f32> = Self::spread(stage, count, 40.0).collect();
        for (i, y) in heights.into_iter().enumerate() {
            self.spinner_at(y, i % 2 == 0);
        }
    }

    fn ramps(&mut self, stage: &Stage, count: usize) {
        let heights: Vec<f32> = Self::spread(stage, count, 30.0).collect();
        for (i, y) in heights.into_iter().enumerate() {
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let dir = if i % 2 == 0 { 1.0 } else { -1.0 };
            for _ in 0..PLACEMENT_ATTEMPTS {
                let width = 55.0 + self.rng.random::<f32>() * 35.0;
                let x = area.left + width / 2.0 + self.rng.random::<f32>() * (area.width() - width).max(0.0);
                let tilt = dir * (0.25 + self.rng.random::<f32>() * 0.3);
                let ramp = Obstacle::new(ObstacleKind::Ramp { width, tilt }, Vec2::new(x, y)).with_angle(tilt);
                if self.ramp_fits(&ramp) {
                    self.push(ramp);
                    break;
                }
            }
        }
    }

    fn launchers(&mut self, stage: &Stage, count: usize) {
        let heights: Vec<f32> = Self::spread(stage, count, 40.0).collect();
        for y in heights {
            self.launcher_at(y);
        }
    }

    /// A couple of off-theme obstacles at random heights
    fn accents(&mut self, stage: &Stage, kind: StageKind, count: usize) {
        for i in 0..count {
            let y = stage.y_start + 30.0 + self.rng.random::<f32>() * (stage.height() - 60.0);
            match kind {
                StageKind::Spinners => self.spinner_at(y, i % 2 == 1),
                StageKind::Launchers => self.launcher_at(y),
                _ => self.bumper_at(y),
            }
        }
    }

    fn stage_zones(&mut self, stage: &Stage, pool: &[ZoneKind], count: usize) {
        for _ in 0..count {
            let y = stage.y_start + 30.0 + self.rng.random::<f32>() * (stage.height() - 60.0);
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let kind = pool[self.rng.random_range(0..pool.len())];
            self.zone(kind, area, y);
        }
    }

    /// Sparse pins and a few bumpers feeding two gates and the finish
    fn final_run(&mut self, stage: &Stage) {
        let finish_y = self.layout.finish_y;
        let pin_limit = finish_y - GATE_CLEARANCE;

        for (i, offset) in GATE_OFFSETS.iter().enumerate() {
            let y = finish_y - offset;
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let width = GATE_WIDTH.min(area.width() * 0.4);
            let dir = if i % 2 == 0 { 1.0 } else { -1.0 };
            self.push(Obstacle::new(
                ObstacleKind::RotatingGate {
                    width,
                    angular_velocity: dir * GATE_SPIN,
                },
                Vec2::new(area.center(), y),
            ));
        }

        for (side, frac) in [(WallSide::Right, 0.30), (WallSide::Left, 0.50)] {
            let top = stage.y_start + stage.height() * frac;
            for k in 0..WALL_BOUNCE_BUMPS {
                let y = top + k as f32 * 24.0;
                let walls = self.layout.boundary(y);
                let x = match side {
                    WallSide::Left => walls.left + 24.0,
                    WallSide::Right => walls.right - 24.0,
                };
                self.push(Obstacle::new(
                    ObstacleKind::WallBounceSegment {
                        side,
                        radius: WALL_BOUNCE_RADIUS,
                    },
                    Vec2::new(x, y),
                ));
            }
        }

        for row in 0..5 {
            let y = stage.y_start + 30.0 + row as f32 * 45.0;
            if y >= pin_limit {
                break;
            }
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let avail = area.width();
            let cols = ((avail / 60.0).floor() as usize).max(2);
            let mut pins = Vec::new();
            for col in 0..cols {
                if self.rng.random_bool(0.3) {
                    continue;
                }
                let x = area.left + 15.0 + (avail - 30.0) * (col as f32 / (cols - 1) as f32);
                let pos = Vec2::new(x, y + self.jitter(8.0));
                if self.pin_fits(pos) {
                    pins.push(self.push(Obstacle::new(ObstacleKind::Pin, pos)));
                }
            }
            self.pin_rows.push(PinRow {
                y,
                corridor: area,
                pins,
            });
        }

        // Late volatility
        let band = (pin_limit - 15.0 - stage.y_start - 20.0).max(0.0);
        for i in 0..3 {
            let y = stage.y_start + 20.0 + self.rng.random::<f32>() * band;
            if i < 2 {
                self.bumper_at(y);
            } else {
                self.launcher_at(y);
            }
        }
    }

    /// One exit per non-final stage on alternating walls, two entries at the end
    fn wormholes(&mut self, stages: &[Stage]) {
        let mut side = WallSide::Left;
        for (stage_index, stage) in stages.iter().enumerate() {
            if stage.kind == StageKind::Final {
                continue;
            }
            let y = stage.y_start + stage.height() * 0.5;
            let walls = self.layout.boundary(y);
            let x = match side {
                WallSide::Left => walls.left + CORRIDOR_INSET,
                WallSide::Right => walls.right - CORRIDOR_INSET,
            };
            self.push(Obstacle::new(
                ObstacleKind::Wormhole {
                    radius: WORMHOLE_RADIUS,
                    side,
                    stage_index,
                    role: WormholeRole::Exit,
                    pair_color: WORMHOLE_COLOR,
                },
                Vec2::new(x, y),
            ));
            side = side.opposite();
        }

        let Some((final_index, final_stage)) = stages
            .iter()
            .enumerate()
            .find(|(_, s)| s.kind == StageKind::Final)
        else {
            return;
        };
        for (side, frac) in [(WallSide::Left, 0.30), (WallSide::Right, 0.50)] {
            let y = final_stage.y_start + final_stage.height() * frac;
            let Some(area) = self.corridor(y) else {
                continue;
            };
            let x = match side {
                WallSide::Left => area.left,
                WallSide::Right => area.right,
            };
            self.push(Obstacle::new(
                ObstacleKind::Wormhole {
                    radius: WORMHOLE_RADIUS,
                    side,
                    stage_index: final_index,
                    role: WormholeRole::Entry,
                    pair_color: WORMHOLE_COLOR,
                },
                Vec2::new(x, y),
            ));
        }
    }
}

/// Decoration bumps hugging both live walls
///
/// Spacing is measured along the wall and the wobble stops where the walls
/// narrow, so a ball can't wedge between two bumps on the sloped part.
fn wall_decoration(layout: &ChannelLayout) -> Vec<WallBump> {
    let last_y = layout.height - 30.0 - WALL_BUMP_SPACING;
    let mut bumps = Vec::new();
    let mut y = 50.0;
    let mut i = 0;
    while y <= last_y {
        let wave = if y <= layout.narrow_start_y {
            (i as f32 * 0.5).sin() * 8.0
        } else {
            0.0
        };
        let walls = layout.boundary(y);
        bumps.push(WallBump {
            pos: Vec2::new(walls.left + WALL_BUMP_RADIUS - 2.0 + wave, y),
            radius: WALL_BUMP_RADIUS,
            side: WallSide::Left,
            body: None,
        });
        bumps.push(WallBump {
            pos: Vec2::new(walls.right - WALL_BUMP_RADIUS + 2.0 - wave, y),
            radius: WALL_BUMP_RADIUS,
            side: WallSide::Right,
            body: None,
        });

        let slope = layout.boundary(y + 1.0).left - walls.left;
        y += WALL_BUMP_SPACING / (1.0 + slope * slope).sqrt();
        i += 1;
    }
    bumps
}

impl Obstacle {
    /// Physics body for this obstacle; `index` becomes the body's tag
    pub fn body_desc(&self, index: usize) -> BodyDesc {
        let tag = BodyTag::Obstacle(index);
        match self.kind {
            ObstacleKind::Pin => BodyDesc::circle(self.pos, PIN_RADIUS, tag).with_restitution(0.6),
            ObstacleKind::Bumper { radius } => {
                BodyDesc::circle(self.pos, radius, tag).with_restitution(1.4)
            }
            ObstacleKind::Spinner { width, .. } => BodyDesc::rect(self.pos, width, BAR_THICKNESS, tag)
                .with_kind(BodyKind::Kinematic)
                .with_restitution(0.5)
                .with_angle(self.angle),
            ObstacleKind::Ramp { width, tilt } => BodyDesc::rect(self.pos, width, BAR_THICKNESS, tag)
                .with_restitution(0.4)
                .with_angle(tilt),
            ObstacleKind::Launcher { radius } | ObstacleKind::Wormhole { radius, .. } => {
                BodyDesc::circle(self.pos, radius, tag).as_sensor()
            }
            ObstacleKind::RotatingGate { width, .. } => BodyDesc::rect(self.pos, width, GATE_THICKNESS, tag)
                .with_kind(BodyKind::Kinematic)
                .with_restitution(0.6)
                .with_angle(self.angle),
            ObstacleKind::WallBounceSegment { radius, .. } => {
                BodyDesc::circle(self.pos, radius, tag).with_restitution(1.2)
            }
        }
    }

    /// Solid extent as discs `(center, radius)`; empty for sensors
    ///
    /// Rotating bars count as the disc they sweep. Ramps become a chain of
    /// discs along the bar.
    pub fn outline(&self) -> Vec<(Vec2, f32)> {
        match self.kind {
            ObstacleKind::Pin => vec![(self.pos, PIN_RADIUS)],
            ObstacleKind::Bumper { radius } | ObstacleKind::WallBounceSegment { radius, .. } => {
                vec![(self.pos, radius)]
            }
            ObstacleKind::Spinner { width, .. } => vec![(self.pos, (width + BAR_THICKNESS) / 2.0)],
            ObstacleKind::RotatingGate { width, .. } => vec![(self.pos, (width + GATE_THICKNESS) / 2.0)],
            ObstacleKind::Ramp { width, tilt } => {
                let half = Vec2::from_angle(tilt) * (width / 2.0);
                let steps = (width / SWEEP_STEP).ceil().max(1.0) as usize;
                (0..=steps)
                    .map(|i| {
                        let t = i as f32 / steps as f32;
                        (self.pos - half + half * (2.0 * t), BAR_THICKNESS / 2.0)
                    })
                    .collect()
            }
            ObstacleKind::Launcher { .. } | ObstacleKind::Wormhole { .. } => Vec::new(),
        }
    }
}

impl Track {
    /// Generate a track for a field of `entrants`
    ///
    /// Large fields (above [`LARGE_FIELD_THRESHOLD`]) get wormholes.
    pub fn generate<R: Rng + ?Sized>(layout: ChannelLayout, entrants: usize, rng: &mut R) -> Self {
        let stages = stages_for(&layout);
        let mut builder = TrackBuilder {
            layout,
            rng,
            wall_bumps: wall_decoration(&layout),
            obstacles: Vec::new(),
            zones: Vec::new(),
            pin_rows: Vec::new(),
        };

        for stage in &stages {
            match stage.kind {
                StageKind::Pins => builder.pin_field(stage),
                // Signature obstacles first so the pin backdrop can keep clear of them
                StageKind::Bumpers => {
                    builder.bumpers(stage, 12);
                    builder.accents(stage, StageKind::Spinners, 2);
                    builder.sparse_pins(stage, 60.0, 6);
                    builder.stage_zones(stage, &[ZoneKind::Speed, ZoneKind::Vortex], 2);
                }
                StageKind::Spinners => {
                    builder.spinners(stage, 8);
                    builder.accents(stage, StageKind::Bumpers, 2);
                    builder.sparse_pins(stage, 65.0, 5);
                    builder.stage_zones(stage, &[ZoneKind::Jump, ZoneKind::Slow], 2);
                }
                StageKind::Ramps => {
                    builder.ramps(stage, 10);
                    builder.accents(stage, StageKind::Bumpers, 2);
                    builder.sparse_pins(stage, 65.0, 5);
                    builder.stage_zones(stage, &[ZoneKind::Speed, ZoneKind::Slow, ZoneKind::Vortex], 2);
                }
                StageKind::Launchers => {
                    builder.launchers(stage, 7);
                    builder.accents(stage, StageKind::Bumpers, 2);
                    builder.sparse_pins(stage, 70.0, 4);
                    builder.stage_zones(stage, &[ZoneKind::Jump, ZoneKind::Vortex], 2);
                }
                StageKind::Final => builder.final_run(stage),
            }
        }
        if entrants > LARGE_FIELD_THRESHOLD {
            builder.wormholes(&stages);
        }

        let finish_walls = layout.boundary(layout.finish_y);
        let track = Self {
            layout,
            wall_bumps: builder.wall_bumps,
            stages,
            obstacles: builder.obstacles,
            zones: builder.zones,
            pin_rows: builder.pin_rows,
            finish: FinishLine {
                y: layout.finish_y,
                width: finish_walls.width() - 10.0,
                body: None,
            },
            wall_bodies: Vec::new(),
        };

        log::info!(
            "Track for {} entrants: height {}, {} obstacles, {} zones, {} pin rows",
            entrants,
            layout.height,
            track.obstacles.len(),
            track.zones.len(),
            track.pin_rows.len()
        );
        let report = track.passability(BALL_RADIUS);
        if !report.blocked_rows.is_empty() {
            log::warn!("Track blocked at y = {:?}", report.blocked_rows);
        }
        if !report.pockets.is_empty() {
            log::warn!("Track has {} dead-end pockets: {:?}", report.pockets.len(), report.pockets);
        }
        track
    }

    /// Create every body in one batch and remember the handles
    pub fn register<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        let layout = self.layout;
        let mut descs = Vec::with_capacity(
            2 + self.wall_bumps.len() + self.obstacles.len() + self.zones.len() + 1,
        );

        let slab = |y: f32| {
            BodyDesc::rect(Vec2::new(layout.center_x(), y), layout.width, layout.wall_thickness, BodyTag::Wall)
                .with_restitution(0.4)
        };
        descs.push(slab(layout.wall_thickness / 2.0));
        descs.push(slab(layout.height - layout.wall_thickness / 2.0));
        descs.extend(
            self.wall_bumps
                .iter()
                .map(|b| BodyDesc::circle(b.pos, b.radius, BodyTag::Wall).with_restitution(0.8)),
        );
        descs.extend(self.obstacles.iter().enumerate().map(|(i, o)| o.body_desc(i)));
        descs.extend(self.zones.iter().enumerate().map(|(i, z)| {
            BodyDesc::rect(z.center(), z.size.x, z.size.y, BodyTag::Zone(i)).as_sensor()
        }));
        descs.push(
            BodyDesc::rect(Vec2::new(layout.center_x(), self.finish.y), self.finish.width, 6.0, BodyTag::FinishLine)
                .as_sensor(),
        );

        let mut handles = world.add_bodies(descs).into_iter();
        self.wall_bodies = handles.by_ref().take(2).collect();
        for bump in &mut self.wall_bumps {
            bump.body = handles.next();
        }
        for obstacle in &mut self.obstacles {
            obstacle.body = handles.next();
        }
        for zone in &mut self.zones {
            zone.body = handles.next();
        }
        self.finish.body = handles.next();
    }

    /// Remove every body this track created
    pub fn teardown<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        let bodies = self
            .wall_bodies
            .drain(..)
            .chain(self.wall_bumps.iter_mut().filter_map(|b| b.body.take()))
            .chain(self.obstacles.iter_mut().filter_map(|o| o.body.take()))
            .chain(self.zones.iter_mut().filter_map(|z| z.body.take()))
            .chain(self.finish.body.take());
        for handle in bodies {
            world.remove_body(handle);
        }
    }

    /// True once [`Track::register`] has run
    pub fn is_registered(&self) -> bool {
        self.finish.body.is_some()
    }

    /// Stage covering height `y`
    pub fn stage_at(&self, y: f32) -> Option<(usize, &Stage)> {
        self.stages.iter().enumerate().find(|(_, s)| s.contains(y))
    }

    /// Indices of all wormhole exits
    pub fn wormhole_exits(&self) -> Vec<usize> {
        self.obstacles
            .iter()
            .enumerate()
            .filter(|(_, o)| o.kind.is_wormhole_exit())
            .map(|(i, _)| i)
            .collect()
    }

    /// Sweep the channel for places a ball of `ball_radius` cannot get past
    ///
    /// Rows every [`SWEEP_STEP`] px from just above the first stage down to the
    /// finish. Each row's free spans are the positions a ball center can take
    /// between the walls, the wall bumps and the fixed solids (pins and ramps;
    /// bumpers, launchers and rotating bars never hold a ball still). A span is
    /// reachable when it overlaps a reachable span of the row above. A
    /// reachable span with nothing reachable under it is a pocket: a ball that
    /// rolls in can only leave by climbing.
    pub fn passability(&self, ball_radius: f32) -> PassabilityReport {
        let top = TRACK_TOP - 20.0;
        let bottom = self.layout.finish_y;
        let rows = ((bottom - top) / SWEEP_STEP).ceil().max(0.0) as usize + 1;

        let mut discs: Vec<(Vec2, f32)> = self.wall_bumps.iter().map(|b| (b.pos, b.radius)).collect();
        for obstacle in self.obstacles.iter().filter(|o| is_fixed_solid(&o.kind)) {
            discs.extend(obstacle.outline());
        }
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); rows];
        for (i, &(center, radius)) in discs.iter().enumerate() {
            let reach = radius + ball_radius;
            let first = ((center.y - reach - top) / SWEEP_STEP).floor().max(0.0) as usize;
            let last = ((center.y + reach - top) / SWEEP_STEP).ceil().max(0.0) as usize;
            for bucket in buckets.iter_mut().take(last + 1).skip(first) {
                bucket.push(i);
            }
        }

        let mut report = PassabilityReport::default();
        let mut reachable: Vec<(f32, f32)> = Vec::new();
        let mut blocked: Vec<(f32, f32)> = Vec::new();
        let mut prev_y = top;

        for (row, bucket) in buckets.iter().enumerate() {
            let y = (top + row as f32 * SWEEP_STEP).min(bottom);
            let walls = self.layout.boundary(y);

            blocked.clear();
            for &i in bucket {
                let (center, radius) = discs[i];
                let reach = radius + ball_radius;
                let dy = y - center.y;
                if dy.abs() < reach {
                    let half = (reach * reach - dy * dy).sqrt();
                    blocked.push((center.x - half, center.x + half));
                }
            }
            let free = free_spans(walls.left + ball_radius, walls.right - ball_radius, &mut blocked);
            report.rows_checked += 1;

            let next: Vec<(f32, f32)> = if row == 0 {
                free
            } else {
                free.into_iter()
                    .filter(|&span| reachable.iter().any(|&r| overlaps(r, span)))
                    .collect()
            };

            for &span in &reachable {
                if next.iter().any(|&s| overlaps(span, s)) {
                    continue;
                }
                let spot = Vec2::new((span.0 + span.1) / 2.0, prev_y);
                if report.pockets.iter().all(|p| p.distance(spot) > ball_radius * 2.0) {
                    report.pockets.push(spot);
                }
            }
            if next.is_empty() {
                report.blocked_rows.push(y);
                break;
            }
            reachable = next;
            prev_y = y;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::world::SimpleWorld;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn track(entrants: usize, seed: u64) -> Track {
        let mut rng = Pcg32::seed_from_u64(seed);
        Track::generate(ChannelLayout::for_entrants(entrants), entrants, &mut rng)
    }

    fn count(track: &Track, pred: impl Fn(&ObstacleKind) -> bool) -> usize {
        track.obstacles.iter().filter(|o| pred(&o.kind)).count()
    }

    #[test]
    fn test_stage_table_matches_base_channel() {
        let stages = stages_for(&ChannelLayout::default());
        assert_eq!(stages.len(), 6);
        assert_eq!(stages[0].y_start, 100.0);
        assert!((stages[1].y_start - 520.0).abs() < 0.01);
        assert!((stages[5].y_start - 1900.0).abs() < 0.01);
        assert_eq!(stages[5].y_end, 2150.0);
    }

    #[test]
    fn test_stages_partition_channel() {
        for entrants in [2, 8, 12, MAX_ENTRANTS] {
            let t = track(entrants, 7);
            assert_eq!(t.stages.first().unwrap().y_start, TRACK_TOP);
            assert_eq!(t.stages.last().unwrap().y_end, t.layout.finish_y);
            for pair in t.stages.windows(2) {
                assert_eq!(pair[0].y_end, pair[1].y_start);
                assert!(pair[0].y_start < pair[0].y_end);
            }
        }
    }

    #[test]
    fn test_pins_inside_corridor() {
        let t = track(6, 99);
        assert!(!t.pin_rows.is_empty());
        for row in &t.pin_rows {
            for &i in &row.pins {
                let pin = &t.obstacles[i];
                assert_eq!(pin.kind, ObstacleKind::Pin);
                assert!(row.corridor.contains(pin.pos.x), "pin at {} outside {:?}", pin.pos.x, row.corridor);
            }
        }
    }

    #[test]
    fn test_signature_obstacles() {
        let t = track(4, 3);
        assert_eq!(count(&t, |k| matches!(k, ObstacleKind::RotatingGate { .. })), 2);
        assert_eq!(
            count(&t, |k| matches!(k, ObstacleKind::WallBounceSegment { .. })),
            2 * WALL_BOUNCE_BUMPS
        );
        // Ramps that can't find a clear spot are skipped
        let ramps = count(&t, |k| matches!(k, ObstacleKind::Ramp { .. }));
        assert!((1..=10).contains(&ramps), "{ramps} ramps");
        // 7 launch pad + 1 final
        assert_eq!(count(&t, |k| matches!(k, ObstacleKind::Launcher { .. })), 8);
        assert_eq!(count(&t, |k| matches!(k, ObstacleKind::Wormhole { .. })), 0);
    }

    #[test]
    fn test_wormholes_in_large_field() {
        let t = track(12, 5);
        let entries = count(&t, |k| {
            matches!(k, ObstacleKind::Wormhole { role: WormholeRole::Entry, .. })
        });
        assert_eq!(entries, 2);
        let exits = t.wormhole_exits();
        assert_eq!(exits.len(), 5);

        // Exits alternate walls, one per non-final stage
        let sides: Vec<WallSide> = exits
            .iter()
            .map(|&i| match t.obstacles[i].kind {
                ObstacleKind::Wormhole { side, .. } => side,
                _ => unreachable!(),
            })
            .collect();
        for pair in sides.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_same_seed_same_track() {
        let a = track(8, 1234);
        let b = track(8, 1234);
        assert_eq!(a.obstacles, b.obstacles);
        assert_eq!(a.zones, b.zones);
        let c = track(8, 4321);
        assert_ne!(a.obstacles, c.obstacles);
    }

    #[test]
    fn test_generated_tracks_are_passable() {
        for seed in 0..20 {
            let t = track(2 + (seed as usize % 20), seed);
            let report = t.passability(BALL_RADIUS);
            assert!(report.rows_checked > 0);
            assert!(
                report.is_passable(),
                "seed {seed}: blocked {:?}, pockets {:?}",
                report.blocked_rows,
                report.pockets
            );
        }
    }

    #[test]
    fn test_bare_channel_is_passable() {
        for entrants in [2, LARGE_FIELD_THRESHOLD + 1, MAX_ENTRANTS] {
            let mut t = track(entrants, 11);
            t.obstacles.clear();
            t.pin_rows.clear();
            t.zones.clear();
            let report = t.passability(BALL_RADIUS);
            assert!(report.is_passable(), "{entrants} entrants: {:?}", report.pockets);
            // Every row down to the finish line
            let span = t.layout.finish_y - (TRACK_TOP - 20.0);
            assert_eq!(report.rows_checked, (span / SWEEP_STEP).ceil() as usize + 1);
        }
    }

    /// Bare base channel with a single ramp, low end returned
    fn lone_ramp(center: Vec2, width: f32, tilt: f32) -> (Track, Vec2) {
        let mut t = track(2, 1);
        t.obstacles.clear();
        t.pin_rows.clear();
        t.zones.clear();
        let ramp = Obstacle::new(ObstacleKind::Ramp { width, tilt }, center).with_angle(tilt);
        let low_end = ramp
            .outline()
            .into_iter()
            .map(|(p, _)| p)
            .max_by(|a, b| a.y.total_cmp(&b.y))
            .unwrap();
        t.obstacles.push(ramp);
        (t, low_end)
    }

    fn pocket_near(report: &PassabilityReport, spot: Vec2, within: f32) -> bool {
        report.pockets.iter().any(|p| p.distance(spot) < within)
    }

    #[test]
    fn test_pin_under_ramp_end_is_a_pocket() {
        let (mut t, low_end) = lone_ramp(Vec2::new(330.0, 1290.0), 70.0, 0.467);
        assert!(t.passability(BALL_RADIUS).is_passable());

        // A pin just past the low end leaves a gap far narrower than a ball
        t.obstacles.push(Obstacle::new(ObstacleKind::Pin, low_end + Vec2::new(10.0, -4.0)));
        let report = t.passability(BALL_RADIUS);
        assert!(!report.is_passable());
        assert!(report.blocked_rows.is_empty());
        assert!(pocket_near(&report, low_end, 30.0), "pockets {:?}", report.pockets);
    }

    #[test]
    fn test_ramp_sloping_into_pin_is_a_pocket() {
        // Pin just above the lower half of the bar; balls rolling down wedge at (405.8, 1283.8)
        let (mut t, _) = lone_ramp(Vec2::new(397.0, 1292.2), 70.0, 0.467);
        t.obstacles.push(Obstacle::new(ObstacleKind::Pin, Vec2::new(419.8, 1283.5)));
        let report = t.passability(BALL_RADIUS);
        assert!(pocket_near(&report, Vec2::new(405.8, 1283.8), 2.0 * BALL_RADIUS), "pockets {:?}", report.pockets);
    }

    #[test]
    fn test_ramp_into_wall_bump_is_a_pocket() {
        let base = track(2, 1);
        let bump = base
            .wall_bumps
            .iter()
            .filter(|b| b.side == WallSide::Left)
            .min_by(|a, b| (a.pos.y - 1290.0).abs().total_cmp(&(b.pos.y - 1290.0).abs()))
            .unwrap();

        // Low (left) end 8 px from the bump tip
        let tilt = -0.279;
        let width = 70.0;
        let end = Vec2::new(bump.pos.x + bump.radius + BAR_THICKNESS / 2.0 + 8.0, bump.pos.y);
        let center = end + Vec2::from_angle(tilt) * (width / 2.0);
        let (t, low_end) = lone_ramp(center, width, tilt);
        assert!(low_end.distance(end) < 1e-3);

        let report = t.passability(BALL_RADIUS);
        assert!(!report.is_passable());
        assert!(pocket_near(&report, low_end, 30.0), "pockets {:?}", report.pockets);
    }

    #[test]
    fn test_generated_fixtures_leave_passage() {
        for seed in [4, 19, 260] {
            let t = track(MAX_ENTRANTS.min(6 + seed as usize % 12), seed);
            let ramps: Vec<&Obstacle> = t
                .obstacles
                .iter()
                .filter(|o| matches!(o.kind, ObstacleKind::Ramp { .. }))
                .collect();
            let pins: Vec<&Obstacle> = t.obstacles.iter().filter(|o| o.kind == ObstacleKind::Pin).collect();
            let bumps: Vec<(Vec2, f32)> = t.wall_bumps.iter().map(|b| (b.pos, b.radius)).collect();

            for (i, ramp) in ramps.iter().enumerate() {
                let outline = ramp.outline();
                assert!(outline_gap(&outline, &bumps) >= PASSAGE - 1e-3, "seed {seed}: ramp at {}", ramp.pos);
                for pin in &pins {
                    assert!(outline_gap(&outline, &pin.outline()) >= PASSAGE - 1e-3);
                }
                for other in &ramps[i + 1..] {
                    assert!(outline_gap(&outline, &other.outline()) >= PASSAGE - 1e-3);
                }
            }
            for pin in &pins {
                assert!(outline_gap(&pin.outline(), &bumps) >= PASSAGE - 1e-3, "seed {seed}: pin at {}", pin.pos);
            }
        }
    }

    #[test]
    fn test_passability_flags_blocked_row() {
        let mut t = track(2, 1);
        let y = t.pin_rows[0].y;
        let walls = t.layout.boundary(y);
        // Pins every 12 px leave no room for an 18 px ball
        let mut pins = Vec::new();
        let mut x = walls.left;
        while x < walls.right {
            t.obstacles.push(Obstacle::new(ObstacleKind::Pin, Vec2::new(x, y)));
            pins.push(t.obstacles.len() - 1);
            x += 12.0;
        }
        t.pin_rows = vec![PinRow {
            y,
            corridor: t.layout.corridor(y),
            pins,
        }];
        let report = t.passability(BALL_RADIUS);
        assert!(!report.is_passable());
        // The sweep stops where the pins close ranks, just above their centers
        assert_eq!(report.blocked_rows.len(), 1);
        let blocked = report.blocked_rows[0];
        assert!(blocked <= y && y - blocked <= PIN_RADIUS + BALL_RADIUS, "blocked at {blocked}, row at {y}");
    }

    #[test]
    fn test_register_and_teardown() {
        let mut t = track(10, 77);
        let mut world = SimpleWorld::default();
        t.register(&mut world);
        assert!(t.is_registered());

        let expected = 2 + t.wall_bumps.len() + t.obstacles.len() + t.zones.len() + 1;
        assert_eq!(world.body_count(), expected);

        for (i, obstacle) in t.obstacles.iter().enumerate() {
            assert_eq!(world.tag(obstacle.body.unwrap()), Some(BodyTag::Obstacle(i)));
        }
        for (i, zone) in t.zones.iter().enumerate() {
            assert_eq!(world.tag(zone.body.unwrap()), Some(BodyTag::Zone(i)));
        }
        assert_eq!(world.tag(t.finish.body.unwrap()), Some(BodyTag::FinishLine));

        t.teardown(&mut world);
        assert_eq!(world.body_count(), 0);
        assert!(!t.is_registered());
    }

    #[test]
    fn test_finish_spans_channel() {
        let t = track(3, 2);
        let walls = t.layout.boundary(t.finish.y);
        assert!((t.finish.width - (walls.width() - 10.0)).abs() < 1e-3);
    }

    #[test]
    fn test_stage_at() {
        let t = track(6, 5);
        let (i, stage) = t.stage_at(TRACK_TOP).unwrap();
        assert_eq!(i, 0);
        assert_eq!(stage.kind, StageKind::Pins);

        let last = &t.stages[5];
        let (i, _) = t.stage_at(last.y_end - 1.0).unwrap();
        assert_eq!(i, 5);

        // Boundaries belong to the lower stage; nothing past the finish
        assert_eq!(t.stage_at(t.stages[1].y_start).map(|(i, _)| i), Some(1));
        assert!(t.stage_at(t.finish.y).is_none());
    }
}
