//! Demo systems. Each one is a single cursor pass over the storage.
//!
//! Entities are spawned moving. When their lifetime runs out they lose their
//! [`Velocity`] and linger for [`LINGER_SECS`]; when that runs out too they
//! are destroyed and replaced.

use std::f32::consts::TAU;

use engine_component::Component;
use engine_world::{Entity, Query, Storage, StorageError};
use glam::Vec2;
use tracing::debug;

use crate::components::{Lifetime, Position, Velocity};

/// Seconds a stopped entity stays alive.
pub const LINGER_SECS: f32 = 1.0;

const SPEED: f32 = 8.0;

/// Creates `n` moving entities. `seed` varies their starting layout.
///
/// # Errors
///
/// Propagates storage errors; `n == 0` is rejected by the storage.
pub fn spawn(
    storage: &mut Storage,
    n: usize,
    bounds: f32,
    seed: u64,
) -> Result<Vec<Entity>, StorageError> {
    let entities = storage.new_entities(
        n,
        &[
            Position::component_type(),
            Velocity::component_type(),
            Lifetime::component_type(),
        ],
    )?;

    for (i, entity) in entities.iter().enumerate() {
        let k = seed.wrapping_add(i as u64);
        let angle = (k.wrapping_mul(2_654_435_761) % 360) as f32 / 360.0 * TAU;
        let radius = bounds * ((k % 97) as f32 / 97.0);
        storage.get_mut::<Position>(entity)?.0 = Vec2::from_angle(angle) * radius;
        storage.get_mut::<Velocity>(entity)?.0 = Vec2::from_angle(angle + TAU / 4.0) * SPEED;
        storage.get_mut::<Lifetime>(entity)?.remaining = 1.0 + (k % 5) as f32;
    }
    Ok(entities)
}

/// Integrates positions and bounces entities off the square `±bounds`.
/// Returns the number of entities moved.
///
/// # Errors
///
/// Propagates cursor errors.
pub fn movement(storage: &mut Storage, dt: f32, bounds: f32) -> Result<usize, StorageError> {
    let mut cursor = storage.cursor(Query::new().with::<Position>().with::<Velocity>());
    let mut moved = 0;
    while cursor.advance()? {
        let mut velocity = cursor.get::<Velocity>()?.0;
        let position = cursor.get_mut::<Position>()?;
        position.0 += velocity * dt;

        if position.0.x.abs() > bounds {
            position.0.x = position.0.x.clamp(-bounds, bounds);
            velocity.x = -velocity.x;
        }
        if position.0.y.abs() > bounds {
            position.0.y = position.0.y.clamp(-bounds, bounds);
            velocity.y = -velocity.y;
        }
        cursor.get_mut::<Velocity>()?.0 = velocity;
        moved += 1;
    }
    Ok(moved)
}

/// Outcome of one [`expiry`] pass.
#[derive(Debug, Default)]
pub struct Expiry {
    /// Entities whose velocity removal was queued.
    pub stopped: usize,
    /// Entities whose lifetime ran out after stopping.
    pub expired: Vec<Entity>,
}

/// Ages every entity. Moving entities whose time is up are stopped through
/// the deferred queue; stopped ones are collected for destruction.
///
/// # Errors
///
/// Propagates cursor errors, including failures of the deferred removals.
pub fn expiry(storage: &mut Storage, dt: f32) -> Result<Expiry, StorageError> {
    let mut report = Expiry::default();
    let mut cursor = storage.cursor(Query::new().with::<Lifetime>());
    while cursor.advance()? {
        let lifetime = cursor.get_mut::<Lifetime>()?;
        lifetime.remaining -= dt;
        if lifetime.remaining > 0.0 {
            continue;
        }

        let mut entity = cursor.current_entity()?;
        if entity.has::<Velocity>() {
            cursor.get_mut::<Lifetime>()?.remaining = LINGER_SECS;
            entity.enqueue_remove_component(cursor.storage_mut(), Velocity::component_type())?;
            report.stopped += 1;
        } else {
            report.expired.push(entity);
        }
    }

    debug!(
        stopped = report.stopped,
        expired = report.expired.len(),
        "expiry pass"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_sets_initial_state() {
        let mut storage = Storage::new();
        let entities = spawn(&mut storage, 10, 50.0, 0).unwrap();
        assert_eq!(entities.len(), 10);
        for entity in &entities {
            assert!(storage.get::<Position>(entity).unwrap().0.length() <= 50.0);
            let speed = storage.get::<Velocity>(entity).unwrap().0.length();
            assert!((speed - SPEED).abs() < 1e-3);
            assert!(storage.get::<Lifetime>(entity).unwrap().remaining >= 1.0);
        }
    }

    #[test]
    fn test_movement_integrates_and_bounces() {
        let mut storage = Storage::new();
        let entities = spawn(&mut storage, 2, 10.0, 0).unwrap();
        *storage.get_mut::<Position>(&entities[0]).unwrap() = Position(Vec2::new(9.5, 0.0));
        *storage.get_mut::<Velocity>(&entities[0]).unwrap() = Velocity(Vec2::new(2.0, 1.0));

        let moved = movement(&mut storage, 0.5, 10.0).unwrap();
        assert_eq!(moved, 2);
        assert_eq!(
            storage.get::<Position>(&entities[0]).unwrap().0,
            Vec2::new(10.0, 0.5)
        );
        assert_eq!(
            storage.get::<Velocity>(&entities[0]).unwrap().0,
            Vec2::new(-2.0, 1.0)
        );
        assert!(!storage.locked());
    }

    #[test]
    fn test_expiry_stops_then_expires() {
        let mut storage = Storage::new();
        let entities = spawn(&mut storage, 3, 10.0, 0).unwrap();
        for entity in &entities {
            storage.get_mut::<Lifetime>(entity).unwrap().remaining = 100.0;
        }
        storage.get_mut::<Lifetime>(&entities[1]).unwrap().remaining = 0.1;

        let report = expiry(&mut storage, 0.25).unwrap();
        assert_eq!(report.stopped, 1);
        assert!(report.expired.is_empty());

        let stopped = storage.entity(entities[1].id()).unwrap();
        assert!(!stopped.has::<Velocity>());
        assert_eq!(storage.get::<Lifetime>(&stopped).unwrap().remaining, LINGER_SECS);
        assert_eq!(movement(&mut storage, 0.1, 10.0).unwrap(), 2);

        let report = expiry(&mut storage, LINGER_SECS).unwrap();
        assert_eq!(report.stopped, 0);
        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].id(), entities[1].id());
    }
}
