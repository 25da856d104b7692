//! # engine_app: demo simulation
//!
//! Spawns a population of moving entities and runs a fixed-timestep loop
//! over them. Entities stop when their lifetime runs out, are destroyed a
//! little later, and are replaced, so archetype migration, deferred
//! operations and id recycling all happen every few ticks.
//!
//! Set `RUST_LOG=engine_world=debug` to watch archetypes being created and
//! deferred operations being queued.

mod components;
mod systems;
mod tick;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use components::{Lifetime, Position, Velocity};
use engine_snapshot::ComponentRegistry;
use tick::{TickConfig, TickLoop};

#[derive(Parser)]
#[command(name = "engine_app", about = "Archetype storage demo simulation")]
struct Args {
    /// Number of entities kept alive
    #[arg(short, long, default_value_t = 1000)]
    entities: usize,

    /// Ticks to run (0 = run until interrupted)
    #[arg(short, long, default_value_t = 600)]
    ticks: u64,

    /// Target ticks per second
    #[arg(short = 'r', long, default_value_t = 60.0, value_parser = parse_tick_rate)]
    tick_rate: f64,

    /// Half-extent of the simulation square
    #[arg(short, long, default_value_t = 100.0)]
    bounds: f32,

    /// Write a MessagePack snapshot of the final state to this path
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

/// Accepts finite, strictly positive rates.
fn parse_tick_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|err| format!("`{s}` is not a number: {err}"))?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(format!("tick rate must be a positive number, got {rate}"));
    }
    Ok(rate)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    info!(
        entities = args.entities,
        ticks = args.ticks,
        tick_rate = args.tick_rate,
        "demo starting"
    );

    let config = TickConfig {
        tick_rate: args.tick_rate,
        max_ticks: args.ticks,
        bounds: args.bounds,
    };
    let mut tick_loop = TickLoop::new(config, args.entities).context("failed to spawn entities")?;
    tick_loop.run().context("tick loop failed")?;

    if let Some(path) = args.snapshot {
        write_snapshot(&tick_loop, &path)?;
    }

    info!(ticks = tick_loop.tick_id(), "demo shut down");
    Ok(())
}

fn write_snapshot(tick_loop: &TickLoop, path: &Path) -> Result<()> {
    let snapshot = engine_snapshot::capture(tick_loop.storage())?;
    let bytes = engine_snapshot::encode(&snapshot)?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("failed to write snapshot to {}", path.display()))?;

    // Round-trip check.
    let mut registry = ComponentRegistry::new();
    registry
        .register::<Position>()
        .register::<Velocity>()
        .register::<Lifetime>();
    let mut check = engine_world::Storage::new();
    engine_snapshot::restore(&engine_snapshot::decode(&bytes)?, &registry, &mut check)?;

    info!(
        path = %path.display(),
        bytes = bytes.len(),
        entities = check.entity_count(),
        "snapshot written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick_rate() {
        assert_eq!(parse_tick_rate("60").unwrap(), 60.0);
        assert_eq!(parse_tick_rate("0.5").unwrap(), 0.5);
        for bad in ["0", "-1", "-0.0", "NaN", "inf", "fast"] {
            assert!(parse_tick_rate(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_args_reject_zero_tick_rate() {
        assert!(Args::try_parse_from(["engine_app", "--tick-rate", "0"]).is_err());
        assert!(Args::try_parse_from(["engine_app", "-r", "-5"]).is_err());
        let args = Args::try_parse_from(["engine_app", "-r", "30"]).unwrap();
        assert_eq!(args.tick_rate, 30.0);
    }
}
