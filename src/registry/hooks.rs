//! Built-in agent hooks.

use serde::{Deserialize, Serialize};

use super::{ensure, from_map, to_map};
use crate::config::JsonMap;
use crate::error::ConfigError;

const LOG_LEVELS: [&str; 6] = ["DEBUG", "INFO", "WARNING", "ERROR", "FATAL", "CRITICAL"];

/// Periodically switch between training and policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingHook {
    /// Episodes between policy evaluations.
    pub test_policy_every: i64,
    /// Episodes per evaluation.
    pub test_policy_total: i64,
}

impl Default for TrainingHook {
    fn default() -> Self {
        Self {
            test_policy_every: 100,
            test_policy_total: 5,
        }
    }
}

/// Log to terminal and tensorboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingHook {
    /// Log level, upper-cased on parse.
    pub loglvl: String,
    /// Log to the terminal.
    pub terminal: bool,
    /// Log to tensorboard.
    pub tensorboard: bool,
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self {
            loglvl: "INFO".to_string(),
            terminal: true,
            tensorboard: true,
        }
    }
}

/// Save weights, buffer and status on a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoSaveHook {
    /// Steps between saves.
    pub per_steps: i64,
    /// Episodes between saves.
    pub per_episodes: i64,
    /// Save model weights.
    pub save_weights: bool,
    /// Save the replay buffer.
    pub save_buffer: bool,
    /// Save the model status.
    pub save_status: bool,
}

impl Default for AutoSaveHook {
    fn default() -> Self {
        Self {
            per_steps: 10_000,
            per_episodes: 100,
            save_weights: true,
            save_buffer: false,
            save_status: false,
        }
    }
}

/// Arguments of a registered hook, tagged by hook name.
#[derive(Debug, Clone, PartialEq)]
pub enum HookArgs {
    /// `Training`.
    Training(TrainingHook),
    /// `Logging`.
    Logging(LoggingHook),
    /// `AutoSave`.
    AutoSave(AutoSaveHook),
}

impl HookArgs {
    /// Registered name of this hook.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Training(_) => "Training",
            Self::Logging(_) => "Logging",
            Self::AutoSave(_) => "AutoSave",
        }
    }

    /// Parses and validates Training hook args.
    pub fn parse_training(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: TrainingHook = from_map("Training hook", map)?;
        ensure(h.test_policy_every > 0, "test_policy_every", "must be positive")?;
        ensure(h.test_policy_total > 0, "test_policy_total", "must be positive")?;
        Ok(Self::Training(h))
    }

    /// Parses and validates Logging hook args.
    pub fn parse_logging(map: &JsonMap) -> Result<Self, ConfigError> {
        let mut h: LoggingHook = from_map("Logging hook", map)?;
        h.loglvl = h.loglvl.to_uppercase();
        ensure(
            LOG_LEVELS.contains(&h.loglvl.as_str()),
            "loglvl",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        )?;
        Ok(Self::Logging(h))
    }

    /// Parses and validates AutoSave hook args.
    pub fn parse_auto_save(map: &JsonMap) -> Result<Self, ConfigError> {
        let h: AutoSaveHook = from_map("AutoSave hook", map)?;
        ensure(h.per_steps > 0, "per_steps", "must be positive")?;
        ensure(h.per_episodes > 0, "per_episodes", "must be positive")?;
        ensure(
            h.save_weights || h.save_buffer || h.save_status,
            "save_weights",
            "at least one of save_weights, save_buffer, save_status must be true",
        )?;
        Ok(Self::AutoSave(h))
    }

    /// Dumps the arguments, defaults included.
    pub fn to_map(&self) -> Result<JsonMap, ConfigError> {
        match self {
            Self::Training(h) => to_map(self.name(), h),
            Self::Logging(h) => to_map(self.name(), h),
            Self::AutoSave(h) => to_map(self.name(), h),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logging_level_is_normalized() {
        let args = json!({"loglvl": "debug"}).as_object().cloned().unwrap();
        let HookArgs::Logging(h) = HookArgs::parse_logging(&args).unwrap() else {
            panic!("expected logging hook");
        };
        assert_eq!(h.loglvl, "DEBUG");

        let bad = json!({"loglvl": "verbose"}).as_object().cloned().unwrap();
        assert!(HookArgs::parse_logging(&bad).is_err());
    }

    #[test]
    fn auto_save_needs_something_to_save() {
        let args = json!({"save_weights": false}).as_object().cloned().unwrap();
        assert!(HookArgs::parse_auto_save(&args).is_err());
        assert!(HookArgs::parse_auto_save(&JsonMap::new()).is_ok());
    }

    #[test]
    fn training_rejects_non_positive_intervals() {
        let args = json!({"test_policy_every": 0}).as_object().cloned().unwrap();
        assert!(HookArgs::parse_training(&args).is_err());
    }
}
