//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Maximum players per room
    pub room_max_slots: usize,
    /// Maximum number of rooms open at once
    pub max_rooms: usize,
    /// Ticks of per-player history kept for lag compensation
    pub lag_comp_history_ticks: usize,
    /// Inbound WebSocket frames allowed per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            room_max_slots: parse_or("ROOM_MAX_SLOTS", 16)?,
            max_rooms: parse_or("MAX_ROOMS", 32)?,
            lag_comp_history_ticks: parse_or("LAG_COMP_HISTORY_TICKS", 1024)?,
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", 120)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            room_max_slots: 16,
            max_rooms: 32,
            lag_comp_history_ticks: 1024,
            input_rate_limit: 120,
        }
    }
}

/// Read a numeric variable, using `default` when unset
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_falls_back_to_default() {
        let value: usize = parse_or("ARENA_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn malformed_variable_is_rejected() {
        env::set_var("ARENA_TEST_MALFORMED_SLOTS", "lots");
        let result: Result<usize, _> = parse_or("ARENA_TEST_MALFORMED_SLOTS", 7);
        assert!(matches!(result, Err(ConfigError::Invalid("ARENA_TEST_MALFORMED_SLOTS"))));
    }
}
