//! Fixed-timestep tick loop.
//!
//! Each tick:
//!
//! 1. Move every entity with a velocity.
//! 2. Age every entity; stop or collect the expired ones.
//! 3. Spawn replacements, then destroy the expired entities in one batch.
//! 4. Advance the tick counter.

use std::time::{Duration, Instant};

use engine_world::{Storage, StorageConfig, StorageError};
use tracing::{debug, info, warn};

use crate::systems;

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Half-extent of the square entities bounce around in.
    pub bounds: f32,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            bounds: 100.0,
        }
    }
}

/// Per-tick counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub moved: usize,
    pub stopped: usize,
    pub respawned: usize,
}

/// The simulation state and its tick counter.
#[derive(Debug)]
pub struct TickLoop {
    /// Current tick counter.
    tick_id: u64,
    config: TickConfig,
    storage: Storage,
    /// Total entities spawned, used to vary spawn layouts.
    spawned: u64,
}

impl TickLoop {
    /// Create a tick loop with `population` initial entities.
    ///
    /// # Errors
    ///
    /// Fails if `population` is zero.
    pub fn new(config: TickConfig, population: usize) -> Result<Self, StorageError> {
        let mut storage =
            Storage::with_config(StorageConfig::new("demo").with_row_capacity(population));
        systems::spawn(&mut storage, population, config.bounds, 0)?;
        Ok(Self {
            tick_id: 0,
            config,
            storage,
            spawned: population as u64,
        })
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the simulation storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Run one tick of the simulation.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from any system.
    pub fn tick(&mut self, dt: f32) -> Result<TickStats, StorageError> {
        self.tick_id += 1;

        let moved = systems::movement(&mut self.storage, dt, self.config.bounds)?;
        let expiry = systems::expiry(&mut self.storage, dt)?;

        let respawned = expiry.expired.len();
        if respawned > 0 {
            systems::spawn(&mut self.storage, respawned, self.config.bounds, self.spawned)?;
            self.spawned += respawned as u64;
            self.storage.destroy_entities(&expiry.expired)?;
        }

        let stats = TickStats {
            moved,
            stopped: expiry.stopped,
            respawned,
        };
        debug!(
            tick_id = self.tick_id,
            dt,
            moved = stats.moved,
            stopped = stats.stopped,
            respawned = stats.respawned,
            archetypes = self.storage.archetype_count(),
            "tick complete"
        );
        Ok(stats)
    }

    /// Run the tick loop for the configured number of ticks, or indefinitely.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tick.
    pub fn run(&mut self) -> Result<(), StorageError> {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            entities = self.storage.entity_count(),
            "starting tick loop"
        );

        loop {
            let start = Instant::now();

            self.tick(tick_duration.as_secs_f32())?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(
                    ticks = tick_count,
                    entities = self.storage.entity_count(),
                    spawned = self.spawned,
                    "tick loop complete"
                );
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use engine_world::Query;

    use super::*;
    use crate::components::{Lifetime, Velocity};

    #[test]
    fn test_tick_advances_counter() {
        let mut tick_loop = TickLoop::new(TickConfig::default(), 8).unwrap();
        assert_eq!(tick_loop.tick_id(), 0);
        let stats = tick_loop.tick(1.0 / 60.0).unwrap();
        assert_eq!(tick_loop.tick_id(), 1);
        assert_eq!(stats.moved, 8);
    }

    #[test]
    fn test_population_is_stable() {
        let mut tick_loop = TickLoop::new(TickConfig::default(), 20).unwrap();
        let mut respawned = 0;
        // Lifetimes are at most five seconds plus the linger time.
        for _ in 0..8 {
            respawned += tick_loop.tick(1.0).unwrap().respawned;
            assert_eq!(tick_loop.storage().entity_count(), 20);
            assert!(!tick_loop.storage().locked());
        }
        assert!(respawned >= 20);

        let storage = &mut tick_loop.storage;
        let lifetimes = storage.cursor(Query::new().with::<Lifetime>()).total_matched();
        assert_eq!(lifetimes, 20);
        let moving = storage.cursor(Query::new().with::<Velocity>()).total_matched();
        assert!(moving <= 20);
    }

    #[test]
    fn test_run_limited_ticks() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 5,
            bounds: 10.0,
        };
        let mut tick_loop = TickLoop::new(config, 4).unwrap();
        tick_loop.run().unwrap();
        assert_eq!(tick_loop.tick_id(), 5);
    }

    #[test]
    fn test_empty_population_is_rejected() {
        assert!(TickLoop::new(TickConfig::default(), 0).is_err());
    }
}
