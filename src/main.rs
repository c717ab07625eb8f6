//! Neon Drop headless runner
//!
//! Runs one race to completion and prints the finish order (or the final
//! snapshot as JSON).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use neon_drop::sim::{PhysicsWorld, RaceEvent, medal};
use neon_drop::{RaceConfig, RaceSession, RapierWorld, Settings, SimpleWorld};

/// Physics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Engine {
    /// rapier2d rigid-body world
    Rapier,
    /// Built-in impulse world
    Simple,
}

/// Drop a field of named balls down a neon track and rank them
#[derive(Parser)]
#[command(name = "neon-drop")]
#[command(about = "Headless ball drop race", long_about = None)]
#[command(version)]
struct Cli {
    /// Entrant names (defaults to numbered balls)
    #[arg(name = "NAME")]
    names: Vec<String>,

    /// Number of numbered balls when no names are given
    #[arg(long, default_value_t = 6)]
    entrants: usize,

    /// Winner count (leading digits count, so "3.7" is 3); otherwise 1, clamped to leave a loser
    #[arg(long)]
    winners: Option<String>,

    /// RNG seed (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Give up after this many ticks
    #[arg(long, default_value_t = 60 * 60 * 5)]
    max_ticks: u64,

    /// Physics backend
    #[arg(long, value_enum, default_value_t = Engine::Rapier)]
    engine: Engine,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,
}

fn run(cli: Cli) -> neon_drop::Result<bool> {
    let settings = Settings::load_or_default(cli.settings.as_deref())?;

    let raw_names = if cli.names.is_empty() {
        (1..=cli.entrants)
            .map(|i| format!("Ball {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        cli.names.join("\n")
    };
    let config = RaceConfig::from_input(&raw_names, cli.winners.as_deref())?;

    let seed = cli.seed.unwrap_or_else(rand::random);
    log::info!(
        "Neon Drop starting: {} entrants, seed {}, {:?} physics",
        config.entrants(),
        seed,
        cli.engine
    );

    let substeps = settings.max_substeps;
    let completed = match cli.engine {
        Engine::Rapier => race(RapierWorld::new(substeps), config, settings, seed, &cli),
        Engine::Simple => race(SimpleWorld::new(substeps), config, settings, seed, &cli),
    };
    Ok(completed)
}

fn race<W: PhysicsWorld>(world: W, config: RaceConfig, settings: Settings, seed: u64, cli: &Cli) -> bool {
    let mut session = RaceSession::start(world, config, settings, seed);
    let completed = session.run_to_completion(cli.max_ticks);

    let snapshot = session.snapshot();
    if cli.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("Failed to serialize snapshot: {e}"),
        }
    } else {
        for event in session.drain_events() {
            if let RaceEvent::Finished { ball, rank, winner } = event {
                let name = &snapshot.balls[ball].name;
                let tag = if winner { "  WINNER" } else { "" };
                println!("{:>4}  {name}{tag}", medal(rank));
            }
        }
        let seconds = snapshot.tick as f32 / neon_drop::consts::TICKS_PER_SECOND as f32;
        println!("Winners: {}", snapshot.winner_names().join(", "));
        println!("Race time: {seconds:.1}s (seed {seed})");
    }

    if !completed {
        log::warn!(
            "Race did not finish within {} ticks ({} of {} balls in)",
            cli.max_ticks,
            snapshot.finish_order.len(),
            snapshot.balls.len()
        );
    }
    completed
}

fn main() -> ExitCode {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
