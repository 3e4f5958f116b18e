//! Match clock and elimination scheduler

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::ws::protocol::{ConnId, MatchMode};

use super::registry::PlayerState;

/// Players kept out of the scheduled eliminations (the final duel)
const RESERVED_SURVIVORS: usize = 2;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Lobby, waiting for the admin to start
    Waiting,
    /// Clock running
    Running,
    /// Time is up, scoreboard pending
    Ended,
}

/// Match timing and elimination bookkeeping
#[derive(Debug, Clone)]
pub struct MatchState {
    pub mode: MatchMode,
    pub phase: MatchPhase,
    pub seed: u64,
    pub start_time: u64,
    pub total_time: u64,
    pub mid_time: u64,
    /// None when too few players were present at start to schedule eliminations
    pub elim_interval: Option<u64>,
    pub eliminated_count: u32,
    last_timer: u64,
}

impl MatchState {
    pub fn new(seed: u64) -> Self {
        Self {
            mode: MatchMode::Elimination,
            phase: MatchPhase::Waiting,
            seed,
            start_time: 0,
            total_time: 0,
            mid_time: 0,
            elim_interval: None,
            eliminated_count: 0,
            last_timer: 0,
        }
    }

    pub fn waiting(&self) -> bool {
        self.phase == MatchPhase::Waiting
    }

    pub fn is_running(&self) -> bool {
        self.phase == MatchPhase::Running
    }

    /// Whether the clock and the elimination scheduler run at all
    pub fn is_timed(&self) -> bool {
        self.is_running() && self.mode == MatchMode::Elimination
    }

    /// WAITING -> RUNNING. Returns false if a match is already underway.
    pub fn start(&mut self, now: u64, total_time: u64, player_count: usize) -> bool {
        if !self.waiting() {
            return false;
        }

        self.phase = MatchPhase::Running;
        self.start_time = now;
        self.total_time = total_time;
        self.mid_time = now + total_time / 2;
        self.elim_interval = elimination_interval(total_time, player_count);
        self.eliminated_count = 0;
        self.last_timer = now;

        info!(
            total_ms = total_time,
            players = player_count,
            elim_interval_ms = ?self.elim_interval,
            "Match started"
        );
        true
    }

    pub fn seconds_left(&self, now: u64) -> i64 {
        let elapsed = now.saturating_sub(self.start_time) as i64;
        (self.total_time as i64 - elapsed).div_euclid(1000)
    }

    /// Seconds left, at most once per second while the clock runs.
    /// Moves to ENDED once the count goes negative.
    pub fn poll_timer(&mut self, now: u64) -> Option<i64> {
        if !self.is_timed() || now.saturating_sub(self.last_timer) < 1000 {
            return None;
        }
        self.last_timer = now;

        let seconds = self.seconds_left(now);
        if seconds < 0 {
            self.phase = MatchPhase::Ended;
        }
        Some(seconds)
    }

    pub fn elimination_due(&self, now: u64) -> bool {
        let Some(interval) = self.elim_interval else {
            return false;
        };
        if !self.is_timed() || now <= self.mid_time {
            return false;
        }
        now - self.mid_time > interval * (self.eliminated_count as u64 + 1)
    }

    /// Back to WAITING with a fresh seed. Mode is kept.
    pub fn reset(&mut self, seed: u64) {
        *self = Self {
            mode: self.mode,
            ..Self::new(seed)
        };
    }
}

/// `(total/2) / (players - 2)`, undefined below three players
pub fn elimination_interval(total_time: u64, player_count: usize) -> Option<u64> {
    let slots = player_count.checked_sub(RESERVED_SURVIVORS).filter(|s| *s > 0)?;
    Some(total_time / 2 / slots as u64)
}

/// Choose who goes next: uniformly among the active players tied at the
/// lowest score. None when one or no active player remains.
pub fn pick_elimination<'a, R, I>(players: I, rng: &mut R) -> Option<ConnId>
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = &'a PlayerState>,
{
    let active: Vec<&PlayerState> = players.into_iter().filter(|p| !p.eliminated).collect();
    if active.len() <= 1 {
        return None;
    }

    let lowest = active.iter().map(|p| p.score).min()?;
    let tied: Vec<ConnId> = active
        .iter()
        .filter(|p| p.score == lowest)
        .map(|p| p.id)
        .collect();
    tied.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn player(id: ConnId, score: i64) -> PlayerState {
        let mut p = PlayerState::new(id);
        p.score = score;
        p
    }

    #[test]
    fn interval_needs_three_players() {
        assert_eq!(elimination_interval(60_000, 0), None);
        assert_eq!(elimination_interval(60_000, 2), None);
        assert_eq!(elimination_interval(60_000, 3), Some(30_000));
        assert_eq!(elimination_interval(60_000, 5), Some(10_000));
    }

    #[test]
    fn start_computes_schedule() {
        let mut state = MatchState::new(1);
        assert!(state.start(1_000, 60_000, 5));
        assert_eq!(state.mid_time, 31_000);
        assert_eq!(state.elim_interval, Some(10_000));
        assert!(!state.start(2_000, 60_000, 5));
    }

    #[test]
    fn timer_ticks_at_one_hertz_and_ends() {
        let mut state = MatchState::new(1);
        state.start(0, 60_000, 4);
        assert_eq!(state.poll_timer(500), None);
        assert_eq!(state.poll_timer(1_000), Some(59));
        assert_eq!(state.poll_timer(1_500), None);
        assert_eq!(state.poll_timer(61_000), Some(-1));
        assert_eq!(state.phase, MatchPhase::Ended);
    }

    #[test]
    fn infinite_mode_suspends_clock() {
        let mut state = MatchState::new(1);
        state.mode = MatchMode::Infinite;
        state.start(0, 60_000, 6);
        assert_eq!(state.poll_timer(120_000), None);
        assert!(!state.elimination_due(120_000));
        assert!(state.is_running());
    }

    #[test]
    fn eliminations_follow_schedule() {
        let mut state = MatchState::new(1);
        state.start(0, 60_000, 5);
        assert!(!state.elimination_due(40_000));
        assert!(state.elimination_due(40_001));
        state.eliminated_count = 1;
        assert!(!state.elimination_due(50_000));
        assert!(state.elimination_due(50_001));
    }

    #[test]
    fn too_few_players_never_eliminates() {
        let mut state = MatchState::new(1);
        state.start(0, 60_000, 2);
        assert!(!state.elimination_due(59_999));
    }

    #[test]
    fn reset_keeps_mode() {
        let mut state = MatchState::new(1);
        state.mode = MatchMode::Infinite;
        state.start(0, 60_000, 3);
        state.eliminated_count = 1;
        state.reset(9);
        assert!(state.waiting());
        assert_eq!(state.seed, 9);
        assert_eq!(state.eliminated_count, 0);
        assert_eq!(state.mode, MatchMode::Infinite);
    }

    #[test]
    fn lowest_score_is_picked() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let players = [player(0, 5), player(1, 2), player(2, 9)];
        assert_eq!(pick_elimination(&players, &mut rng), Some(1));
    }

    #[test]
    fn eliminated_players_are_not_candidates() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut players = [player(0, 1), player(1, 4), player(2, 7)];
        players[0].eliminated = true;
        assert_eq!(pick_elimination(&players, &mut rng), Some(1));

        players[1].eliminated = true;
        assert_eq!(pick_elimination(&players, &mut rng), None);
    }

    #[test]
    fn ties_are_broken_uniformly() {
        let players = [player(0, 3), player(1, 3), player(2, 3), player(3, 8)];
        let mut counts = [0usize; 4];
        let trials = 6_000;
        for seed in 0..trials {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let id = pick_elimination(&players, &mut rng).unwrap();
            counts[id as usize] += 1;
        }

        assert_eq!(counts[3], 0);
        let expected = trials as f64 / 3.0;
        for count in &counts[..3] {
            // ~6 standard deviations
            assert!((*count as f64 - expected).abs() < 220.0, "counts={counts:?}");
        }
    }
}
