//! Process configuration read from environment variables.
//!
//! # Responsibility
//! - Collect storage, logging and ordering settings in one typed value.
//! - Reject malformed values at startup instead of at first use.
//!
//! # Invariants
//! - `rebalance_epsilon` lies in `(0, 0.5]`, so a rebalanced day always has
//!   room for one more key in every slot.
//! - Unset variables fall back to defaults; set-but-invalid ones are errors.

use crate::logging::default_log_level;
use crate::ordering::sequence::REBALANCE_EPSILON;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "WAYPOINT_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "WAYPOINT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "WAYPOINT_LOG_DIR";
pub const ENV_REBALANCE_EPSILON: &str = "WAYPOINT_REBALANCE_EPSILON";

const MAX_REBALANCE_EPSILON: f64 = 0.5;

/// Configuration failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Variable is set but blank.
    Empty(&'static str),
    /// Variable does not parse as the expected type.
    Invalid { key: &'static str, value: String },
    /// Epsilon parses but is outside `(0, 0.5]`.
    EpsilonOutOfRange(f64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(key) => write!(f, "{key} is set but empty"),
            Self::Invalid { key, value } => write!(f, "{key} has invalid value `{value}`"),
            Self::EpsilonOutOfRange(value) => write!(
                f,
                "rebalance epsilon must be within (0, {MAX_REBALANCE_EPSILON}], got {value}"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Core process configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// SQLite file; `None` opens an in-memory store.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Rolling log directory; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub rebalance_epsilon: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            rebalance_epsilon: REBALANCE_EPSILON,
        }
    }
}

impl CoreConfig {
    /// Reads configuration from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's value
    /// or `None` when unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = non_empty(&lookup, ENV_DB_PATH)? {
            config.db_path = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(&lookup, ENV_LOG_LEVEL)? {
            config.log_level = value;
        }
        if let Some(value) = non_empty(&lookup, ENV_LOG_DIR)? {
            config.log_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(&lookup, ENV_REBALANCE_EPSILON)? {
            let epsilon: f64 = value.parse().map_err(|_| ConfigError::Invalid {
                key: ENV_REBALANCE_EPSILON,
                value: value.clone(),
            })?;
            config.rebalance_epsilon = validate_epsilon(epsilon)?;
        }

        Ok(config)
    }

    /// Settings the reorder coordinator needs.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            rebalance_epsilon: self.rebalance_epsilon,
        }
    }
}

/// Ordering settings for one reorder coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Smallest adjacent key gap tolerated before a day is rebalanced.
    pub rebalance_epsilon: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rebalance_epsilon: REBALANCE_EPSILON,
        }
    }
}

impl CoordinatorConfig {
    /// Builds a config with a checked epsilon.
    pub fn with_epsilon(rebalance_epsilon: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            rebalance_epsilon: validate_epsilon(rebalance_epsilon)?,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &'static str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::Empty(key)),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

fn validate_epsilon(value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 && value <= MAX_REBALANCE_EPSILON {
        Ok(value)
    } else {
        Err(ConfigError::EpsilonOutOfRange(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, CoordinatorConfig, CoreConfig, ENV_DB_PATH, ENV_LOG_DIR, ENV_LOG_LEVEL,
        ENV_REBALANCE_EPSILON,
    };
    use crate::ordering::sequence::REBALANCE_EPSILON;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_environment_yields_defaults() {
        let config = CoreConfig::from_lookup(|_| None).expect("defaults should load");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.db_path, None);
        assert_eq!(config.rebalance_epsilon, REBALANCE_EPSILON);
    }

    #[test]
    fn set_variables_override_defaults() {
        let config = CoreConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/tmp/waypoint.sqlite3"),
            (ENV_LOG_LEVEL, "warn"),
            (ENV_LOG_DIR, " /tmp/waypoint-logs "),
            (ENV_REBALANCE_EPSILON, "0.001"),
        ]))
        .expect("config should load");

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/waypoint.sqlite3")));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/waypoint-logs")));
        assert_eq!(config.coordinator().rebalance_epsilon, 0.001);
    }

    #[test]
    fn blank_and_malformed_values_are_rejected() {
        let err = CoreConfig::from_lookup(lookup_from(&[(ENV_DB_PATH, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty(ENV_DB_PATH));

        let err =
            CoreConfig::from_lookup(lookup_from(&[(ENV_REBALANCE_EPSILON, "tiny")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn epsilon_must_leave_room_after_rebalance() {
        for bad in ["0", "-1", "0.75", "NaN"] {
            let err =
                CoreConfig::from_lookup(lookup_from(&[(ENV_REBALANCE_EPSILON, bad)])).unwrap_err();
            assert!(matches!(err, ConfigError::EpsilonOutOfRange(_)), "{bad}");
        }
        assert!(CoordinatorConfig::with_epsilon(0.5).is_ok());
    }
}
