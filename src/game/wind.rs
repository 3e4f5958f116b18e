//! Wind simulation

use std::ops::{Range, RangeInclusive};

use rand::Rng;

/// Interval before the first wind change (ms)
pub const FIRST_CHANGE_MS: RangeInclusive<u64> = 3_000..=8_000;
/// Interval between later wind changes (ms)
pub const LATER_CHANGE_MS: RangeInclusive<u64> = 3_000..=6_000;
/// Leftward gusts
pub const LEFT_GUST: Range<f64> = -900.0..-300.0;
/// Rightward gusts
pub const RIGHT_GUST: Range<f64> = 300.0..900.0;

#[derive(Debug, Clone)]
pub struct WindState {
    pub speed: f64,
    pub last_change: u64,
    pub current_duration: u64,
}

impl WindState {
    pub fn new<R: Rng + ?Sized>(now: u64, rng: &mut R) -> Self {
        Self {
            speed: 0.0,
            last_change: now,
            current_duration: rng.gen_range(FIRST_CHANGE_MS),
        }
    }

    /// Pick a new speed once the current interval has elapsed.
    /// Returns the new speed when it changed.
    pub fn tick<R: Rng + ?Sized>(&mut self, now: u64, rng: &mut R) -> Option<f64> {
        if now.saturating_sub(self.last_change) < self.current_duration {
            return None;
        }

        // Both gust ranges are the same width, so a fair side pick keeps the
        // draw uniform over their union.
        self.speed = if rng.gen_bool(0.5) {
            rng.gen_range(LEFT_GUST)
        } else {
            rng.gen_range(RIGHT_GUST)
        };
        self.last_change = now;
        self.current_duration = rng.gen_range(LATER_CHANGE_MS);

        Some(self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn calm_until_first_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut wind = WindState::new(0, &mut rng);
        assert!(FIRST_CHANGE_MS.contains(&wind.current_duration));
        assert_eq!(wind.tick(*FIRST_CHANGE_MS.start() - 1, &mut rng), None);
        assert_eq!(wind.speed, 0.0);
    }

    #[test]
    fn changes_land_in_gust_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut wind = WindState::new(0, &mut rng);
        let mut now = 0;
        let mut left = 0;
        let mut right = 0;
        for _ in 0..400 {
            now += *FIRST_CHANGE_MS.end();
            let speed = wind.tick(now, &mut rng).expect("interval elapsed");
            assert!(LEFT_GUST.contains(&speed) || RIGHT_GUST.contains(&speed));
            if speed < 0.0 {
                left += 1;
            } else {
                right += 1;
            }
        }
        assert!(left > 100 && right > 100, "left={left} right={right}");
    }

    #[test]
    fn later_intervals_are_shorter() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut wind = WindState::new(0, &mut rng);
        assert!(wind.tick(*FIRST_CHANGE_MS.end(), &mut rng).is_some());
        for _ in 0..50 {
            let now = wind.last_change + wind.current_duration;
            assert!(LATER_CHANGE_MS.contains(&wind.current_duration));
            assert!(wind.tick(now, &mut rng).is_some());
        }
    }
}
