//! Powerup spawning and per-tick physics

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::ws::protocol::PowerupView;

/// Delay between spawns, redrawn after every spawn (ms)
pub const SPAWN_INTERVAL_MS: RangeInclusive<u64> = 8_000..=15_000;
/// Horizontal spawn band
pub const SPAWN_X: RangeInclusive<f64> = -1_500.0..=1_500.0;
/// Spawn altitude (screen coordinates, y grows downwards)
pub const SPAWN_Y: f64 = -2_000.0;
/// Vertical velocity gained per tick
pub const GRAVITY_PER_TICK: f64 = 0.04;
/// Horizontal drift per tick per unit of wind speed
pub const WIND_DRIFT: f64 = 0.0015;
/// Lifetime of an uncollected powerup (ms)
pub const EXPIRY_MS: u64 = 30_000;

/// Powerup types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerupKind {
    /// No cooldown between throws
    Rapidfire,
    /// Double score per hit
    Strength,
    /// Throws split into several snowballs
    Clustershot,
    /// Snowballs rain down around the target
    Hailstorm,
}

impl PowerupKind {
    pub const ALL: [PowerupKind; 4] = [
        PowerupKind::Rapidfire,
        PowerupKind::Strength,
        PowerupKind::Clustershot,
        PowerupKind::Hailstorm,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rapidfire" => Some(Self::Rapidfire),
            "strength" => Some(Self::Strength),
            "clustershot" => Some(Self::Clustershot),
            "hailstorm" => Some(Self::Hailstorm),
            _ => None,
        }
    }
}

/// A falling powerup
#[derive(Debug, Clone)]
pub struct Powerup {
    pub id: u32,
    pub kind: PowerupKind,
    pub x: f64,
    pub y: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    pub spawn_time: u64,
}

impl Powerup {
    pub fn new(id: u32, kind: PowerupKind, x: f64, spawn_time: u64) -> Self {
        Self {
            id,
            kind,
            x,
            y: SPAWN_Y,
            vel_x: 0.0,
            vel_y: 0.0,
            spawn_time,
        }
    }

    /// Integrate one fixed tick
    pub fn step(&mut self, wind_speed: f64) {
        self.vel_y += GRAVITY_PER_TICK;
        self.x += self.vel_x + wind_speed * WIND_DRIFT;
        self.y += self.vel_y;
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.spawn_time) >= EXPIRY_MS
    }

    pub fn view(&self) -> PowerupView {
        PowerupView {
            id: self.id,
            kind: self.kind,
            pos: [self.x.floor() as i64, self.y.floor() as i64],
        }
    }
}

/// Owns the active powerup set and the spawn schedule
#[derive(Debug)]
pub struct PowerupSpawner {
    powerups: BTreeMap<u32, Powerup>,
    kinds: Vec<PowerupKind>,
    next_id: u32,
    last_spawn: u64,
    spawn_interval: u64,
}

impl PowerupSpawner {
    pub fn new<R: Rng + ?Sized>(kinds: Vec<PowerupKind>, now: u64, rng: &mut R) -> Self {
        Self {
            powerups: BTreeMap::new(),
            kinds,
            next_id: 0,
            last_spawn: now,
            spawn_interval: rng.gen_range(SPAWN_INTERVAL_MS),
        }
    }

    /// Spawn if due, integrate every powerup, then drop the expired ones
    pub fn tick<R: Rng + ?Sized>(&mut self, now: u64, wind_speed: f64, rng: &mut R) {
        if now.saturating_sub(self.last_spawn) > self.spawn_interval {
            self.spawn(now, rng);
        }

        for powerup in self.powerups.values_mut() {
            powerup.step(wind_speed);
        }
        self.powerups.retain(|_, p| !p.is_expired(now));
    }

    fn spawn<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.last_spawn = now;
        self.spawn_interval = rng.gen_range(SPAWN_INTERVAL_MS);

        let Some(&kind) = self.kinds.choose(rng) else {
            return;
        };
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let powerup = Powerup::new(id, kind, rng.gen_range(SPAWN_X), now);
        debug!(powerup_id = id, kind = ?kind, x = powerup.x, "Powerup spawned");
        self.powerups.insert(id, powerup);
    }

    /// Remove a powerup a client picked up. Unknown ids are ignored.
    pub fn remove(&mut self, id: u32) -> bool {
        self.powerups.remove(&id).is_some()
    }

    /// Drop every powerup and restart the spawn schedule
    pub fn reset<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) {
        self.powerups.clear();
        self.last_spawn = now;
        self.spawn_interval = rng.gen_range(SPAWN_INTERVAL_MS);
    }

    pub fn views(&self) -> Vec<PowerupView> {
        self.powerups.values().map(Powerup::view).collect()
    }

    #[cfg(test)]
    pub fn get(&self, id: u32) -> Option<&Powerup> {
        self.powerups.get(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.powerups.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.powerups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn spawner(rng: &mut ChaCha8Rng) -> PowerupSpawner {
        PowerupSpawner::new(PowerupKind::ALL.to_vec(), 0, rng)
    }

    #[test]
    fn wind_drift_accumulates_linearly() {
        let mut powerup = Powerup::new(0, PowerupKind::Strength, 100.0, 0);
        let wind = 420.0;
        let ticks = 250;
        for _ in 0..ticks {
            powerup.step(wind);
        }
        let expected = ticks as f64 * wind * WIND_DRIFT;
        assert!((powerup.x - 100.0 - expected).abs() < 1e-9);
    }

    #[test]
    fn gravity_accelerates_fall() {
        let mut powerup = Powerup::new(0, PowerupKind::Strength, 0.0, 0);
        powerup.step(0.0);
        powerup.step(0.0);
        assert!((powerup.vel_y - 2.0 * GRAVITY_PER_TICK).abs() < 1e-12);
        assert!((powerup.y - (SPAWN_Y + 3.0 * GRAVITY_PER_TICK)).abs() < 1e-12);
    }

    #[test]
    fn spawns_only_after_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut spawner = spawner(&mut rng);
        spawner.tick(*SPAWN_INTERVAL_MS.start(), 0.0, &mut rng);
        assert!(spawner.is_empty());

        spawner.tick(*SPAWN_INTERVAL_MS.end() + 1, 0.0, &mut rng);
        assert_eq!(spawner.len(), 1);
        let powerup = spawner.get(0).unwrap();
        assert!(SPAWN_X.contains(&powerup.x));
    }

    #[test]
    fn spawn_uses_only_enabled_kinds() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut spawner = PowerupSpawner::new(vec![PowerupKind::Hailstorm], 0, &mut rng);
        let mut now = 0;
        for _ in 0..5 {
            now += *SPAWN_INTERVAL_MS.end() + 1;
            spawner.tick(now, 0.0, &mut rng);
        }
        assert!(spawner.views().iter().all(|v| v.kind == PowerupKind::Hailstorm));
    }

    #[test]
    fn removed_exactly_at_expiry() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut spawner = spawner(&mut rng);
        let born = *SPAWN_INTERVAL_MS.end() + 1;
        spawner.tick(born, 0.0, &mut rng);
        assert_eq!(spawner.len(), 1);

        spawner.tick(born + EXPIRY_MS - 1, 0.0, &mut rng);
        assert!(spawner.get(0).is_some());

        spawner.tick(born + EXPIRY_MS, 0.0, &mut rng);
        assert!(spawner.get(0).is_none());
    }

    #[test]
    fn pickup_removes_and_unknown_id_is_noop() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut spawner = spawner(&mut rng);
        spawner.tick(*SPAWN_INTERVAL_MS.end() + 1, 0.0, &mut rng);

        assert!(!spawner.remove(99));
        assert!(spawner.remove(0));
        assert!(spawner.is_empty());
    }

    #[test]
    fn view_floors_position() {
        let mut powerup = Powerup::new(3, PowerupKind::Rapidfire, -10.5, 0);
        powerup.y = 20.9;
        assert_eq!(powerup.view().pos, [-11, 20]);
    }
}
