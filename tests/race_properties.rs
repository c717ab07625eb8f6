//! Behavioral properties of the race engine

use glam::Vec2;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use neon_drop::consts::*;
use neon_drop::sim::{
    ChannelLayout, CollisionPair, ObstacleKind, PhysicsWorld, RaceEvent, RaceState, StageKind, Track,
    WormholeRole, apply_collisions, watchdog,
};
use neon_drop::{RaceConfig, RaceError, RaceSession, Settings, SimpleWorld};

fn session(entrants: usize, winners: usize, seed: u64) -> RaceSession {
    let config = RaceConfig::numbered(entrants, winners).unwrap();
    RaceSession::start(SimpleWorld::default(), config, Settings::default(), seed)
}

proptest! {
    #[test]
    fn boundary_is_ordered_and_narrows(
        entrants in MIN_ENTRANTS..=MAX_ENTRANTS,
        a in 0.0f32..1.0,
        b in 0.0f32..1.0,
    ) {
        let layout = ChannelLayout::for_entrants(entrants);
        let (ya, yb) = (a * layout.height, b * layout.height);
        let wa = layout.boundary(ya);
        let wb = layout.boundary(yb);
        prop_assert!(wa.left < wa.right);
        prop_assert!(wb.left < wb.right);

        let (lo, hi) = if ya <= yb { (wa, wb) } else { (wb, wa) };
        if ya.min(yb) >= layout.narrow_start_y {
            prop_assert!(hi.width() <= lo.width() + 1e-3);
        }
    }
}

#[test]
fn six_stages_span_the_channel() {
    for entrants in [MIN_ENTRANTS, MAX_ENTRANTS] {
        let s = session(entrants, 1, 17);
        let track = s.track().unwrap();
        assert_eq!(track.stages.len(), 6);

        let kinds: Vec<StageKind> = track.stages.iter().map(|st| st.kind).collect();
        assert_eq!(
            kinds,
            [
                StageKind::Pins,
                StageKind::Bumpers,
                StageKind::Spinners,
                StageKind::Ramps,
                StageKind::Launchers,
                StageKind::Final,
            ]
        );
        assert_eq!(track.stages[0].y_start, TRACK_TOP);
        assert_eq!(track.stages[5].y_end, track.layout.finish_y);
        for pair in track.stages.windows(2) {
            assert!(pair[0].y_start < pair[0].y_end);
            assert_eq!(pair[0].y_end, pair[1].y_start);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pins_stay_inside_their_corridor(seed in any::<u64>(), entrants in MIN_ENTRANTS..=MAX_ENTRANTS) {
        let mut rng = Pcg32::seed_from_u64(seed);
        let track = Track::generate(ChannelLayout::for_entrants(entrants), entrants, &mut rng);
        for row in &track.pin_rows {
            let corridor = track.layout.corridor(row.y);
            for &i in &row.pins {
                let x = track.obstacles[i].pos.x;
                prop_assert!(corridor.contains(x), "pin x {} outside {:?} at y {}", x, corridor, row.y);
            }
        }
    }

    #[test]
    fn finish_order_is_unique_and_ranked(
        total in 2usize..=MAX_ENTRANTS,
        arrivals in prop::collection::vec(0usize..40, 0..80),
    ) {
        let mut race = RaceState::new(total, 1);
        race.start();
        for ball in arrivals {
            race.record_finish(ball);
        }

        prop_assert!(race.finish_order.len() <= total);
        let mut seen = std::collections::HashSet::new();
        for (i, &ball) in race.finish_order.iter().enumerate() {
            prop_assert!(seen.insert(ball), "ball {} finished twice", ball);
            prop_assert_eq!(race.rank_of(ball), Some(i + 1));
        }
    }

    #[test]
    fn winners_are_the_first_finishers(
        total in 2usize..=MAX_ENTRANTS,
        winner_seed in any::<usize>(),
        order_seed in any::<u64>(),
    ) {
        use rand::seq::SliceRandom;

        let winner_count = 1 + winner_seed % (total - 1);
        let mut order: Vec<usize> = (0..total).collect();
        order.shuffle(&mut Pcg32::seed_from_u64(order_seed));

        let mut race = RaceState::new(total, winner_count);
        race.start();
        let mut flagged = Vec::new();
        for &ball in &order {
            let record = race.record_finish(ball).unwrap();
            if record.winner {
                flagged.push(ball);
            }
        }

        prop_assert_eq!(race.winners(), &order[..winner_count]);
        prop_assert_eq!(flagged, order[..winner_count].to_vec());
        prop_assert!(!race.running);
    }
}

#[test]
fn wormhole_cooldown_blocks_second_warp() {
    let mut s = session(12, 1, 8);
    let ball = s.balls()[0].body.unwrap();
    let entry = s
        .track()
        .unwrap()
        .obstacles
        .iter()
        .find(|o| {
            matches!(
                o.kind,
                ObstacleKind::Wormhole {
                    role: WormholeRole::Entry,
                    ..
                }
            )
        })
        .and_then(|o| o.body)
        .unwrap();

    assert_eq!(apply_collisions(&mut s, &[CollisionPair::new(ball, entry)]), 1);
    let after_first = s.world().position(ball).unwrap();

    assert_eq!(apply_collisions(&mut s, &[CollisionPair::new(entry, ball)]), 0);
    assert_eq!(s.world().position(ball).unwrap(), after_first);

    let warps = s
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, RaceEvent::Warped { .. }))
        .count();
    assert_eq!(warps, 1);
}

#[test]
fn two_ball_race_keeps_running_until_both_finish() {
    let mut s = session(2, 1, 3);
    let line = s.track().unwrap().finish.body.unwrap();
    let (first, second) = (s.balls()[1].body.unwrap(), s.balls()[0].body.unwrap());

    apply_collisions(&mut s, &[CollisionPair::new(first, line)]);
    assert_eq!(s.race().rank_of(1), Some(1));
    assert!(s.balls()[1].winner);
    assert!(s.race().running);

    apply_collisions(&mut s, &[CollisionPair::new(second, line)]);
    assert_eq!(s.race().rank_of(0), Some(2));
    assert!(!s.balls()[0].winner);
    assert!(!s.race().running);
}

#[test]
fn watchdog_pulls_ball_out_of_wall() {
    let mut s = session(3, 1, 4);
    let ball = s.balls()[0].body.unwrap();
    let y = 900.0;
    let walls = s.track().unwrap().layout.boundary(y);
    s.world_mut().set_position(ball, Vec2::new(walls.left - 50.0, y));
    s.world_mut().set_velocity(ball, Vec2::ZERO);

    watchdog::run(&mut s);

    let pos = s.world().position(ball).unwrap();
    assert_eq!(pos.x, walls.left + watchdog::WALL_SNAP_MARGIN);
    assert!(s.world().velocity(ball).unwrap().x > 0.0);
}

#[test]
fn stalled_ball_gets_kicked() {
    let mut s = session(3, 1, 6);
    let ball = s.balls()[1].body.unwrap();
    let budget = s.settings().stuck_tick_budget;

    for _ in 0..=budget {
        s.world_mut().set_position(ball, Vec2::new(330.0, 400.0));
        s.world_mut().set_velocity(ball, Vec2::new(0.1, 0.0));
        watchdog::run(&mut s);
    }

    assert_ne!(s.world().velocity(ball).unwrap(), Vec2::new(0.1, 0.0));
    assert!(s.world().velocity(ball).unwrap().length() > 0.0);
    assert_eq!(s.balls()[1].stuck_timer, 0);
}

#[test]
fn winner_count_defaults_and_clamps() {
    let names = (1..=9).map(|i| format!("P{i}")).collect::<Vec<_>>().join("\n");

    let config = RaceConfig::from_input(&names, None).unwrap();
    assert_eq!(config.entrants(), 9);
    assert_eq!(config.winner_count(), 1);

    let config = RaceConfig::from_input(&names, Some("20")).unwrap();
    assert_eq!(config.winner_count(), 8);

    // Integer prefix, like the setup form's number parsing
    let config = RaceConfig::from_input(&names, Some("3.7")).unwrap();
    assert_eq!(config.winner_count(), 3);
}

#[test]
fn bad_configuration_is_rejected_before_any_world() {
    assert!(matches!(RaceConfig::from_input("solo", None), Err(RaceError::TooFewEntrants(1))));
    let crowd = (0..30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
    assert!(matches!(RaceConfig::from_input(&crowd, None), Err(RaceError::TooManyEntrants(30))));
    assert!(matches!(
        RaceConfig::new(vec!["a".into(), "b".into()], 2),
        Err(RaceError::WinnerCountOutOfRange { .. })
    ));
}
