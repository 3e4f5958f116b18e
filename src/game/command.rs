//! Admin command grammar

use crate::ws::protocol::ConnId;

/// Longest match a `start` command may ask for (one day)
pub const MAX_MATCH_MINUTES: f64 = 24.0 * 60.0;

/// A command typed into the admin console
#[derive(Debug, Clone, PartialEq)]
pub enum AdminCommand {
    /// `start [minutes]`
    Start { minutes: Option<f64> },
    /// `elimination`
    Elimination,
    /// `infinite`
    Infinite,
    /// `stop`: force the end of the match
    Stop,
    /// `kick <id>`
    Kick { id: ConnId },
    /// Anything else. Still relayed to clients, never changes state.
    Unknown,
}

impl AdminCommand {
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(head) = words.next() else {
            return Self::Unknown;
        };
        let arg = words.next();
        if words.next().is_some() {
            return Self::Unknown;
        }

        match (head, arg) {
            ("start", None) => Self::Start { minutes: None },
            ("start", Some(raw)) => match raw.parse::<f64>() {
                Ok(minutes) if minutes > 0.0 && minutes <= MAX_MATCH_MINUTES => Self::Start {
                    minutes: Some(minutes),
                },
                _ => Self::Unknown,
            },
            ("elimination", None) => Self::Elimination,
            ("infinite", None) => Self::Infinite,
            ("stop", None) => Self::Stop,
            ("kick", Some(raw)) => raw
                .parse()
                .map(|id| Self::Kick { id })
                .unwrap_or(Self::Unknown),
            _ => Self::Unknown,
        }
    }

    /// Match length in ms requested by a `start` command
    pub fn match_length(minutes: Option<f64>, default_ms: u64) -> u64 {
        minutes
            .map(|m| (m * 60_000.0) as u64)
            .unwrap_or(default_ms)
    }
}
