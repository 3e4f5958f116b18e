//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::command::MAX_MATCH_MINUTES;
use crate::game::powerup::PowerupKind;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated), permissive when unset
    pub client_origin: Option<String>,
    /// Max inbound frames per second per connection
    pub input_rate_limit: u32,

    /// Settings consumed by the match task
    pub game: GameConfig,
}

/// Tunables for the world simulation
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Fixed world tick period. Powerup physics is integrated per tick,
    /// so changing this changes how fast powerups fall and drift.
    pub tick: Duration,
    /// Match length used by a bare `start` command
    pub default_match_ms: u64,
    /// Powerup types the spawner may pick from
    pub powerup_kinds: Vec<PowerupKind>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(12),
            default_match_ms: 5 * 60_000,
            powerup_kinds: PowerupKind::ALL.to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let tick_ms: u64 = parse_var("TICK_MS", 12)?;
        if tick_ms == 0 {
            return Err(ConfigError::Invalid("TICK_MS"));
        }

        let match_minutes: f64 = parse_var("MATCH_MINUTES", 5.0)?;
        if !(match_minutes > 0.0 && match_minutes <= MAX_MATCH_MINUTES) {
            return Err(ConfigError::Invalid("MATCH_MINUTES"));
        }

        let powerup_kinds = match env::var("POWERUP_TYPES") {
            Ok(list) => parse_powerup_kinds(&list)?,
            Err(_) => PowerupKind::ALL.to_vec(),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            input_rate_limit: parse_var("INPUT_RATE_LIMIT", 240)?,

            game: GameConfig {
                tick: Duration::from_millis(tick_ms),
                default_match_ms: (match_minutes * 60_000.0) as u64,
                powerup_kinds,
            },
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated powerup list such as `rapidfire,strength`
fn parse_powerup_kinds(list: &str) -> Result<Vec<PowerupKind>, ConfigError> {
    let mut kinds = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = PowerupKind::from_name(name).ok_or(ConfigError::Invalid("POWERUP_TYPES"))?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    if kinds.is_empty() {
        return Err(ConfigError::NoPowerups);
    }
    Ok(kinds)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("POWERUP_TYPES must enable at least one powerup")]
    NoPowerups,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powerup_list_is_deduplicated() {
        let kinds = parse_powerup_kinds("strength, rapidfire,strength").unwrap();
        assert_eq!(kinds, vec![PowerupKind::Strength, PowerupKind::Rapidfire]);
    }

    #[test]
    fn unknown_powerup_is_rejected() {
        assert!(matches!(
            parse_powerup_kinds("strength,jetpack"),
            Err(ConfigError::Invalid("POWERUP_TYPES"))
        ));
    }

    #[test]
    fn empty_powerup_list_is_rejected() {
        assert!(matches!(parse_powerup_kinds(" , "), Err(ConfigError::NoPowerups)));
    }
}
