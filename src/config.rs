//! Runtime configuration of a signing node.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::round::RoundKind;

/// Upper bound on every configured duration, so deadlines stay well inside `Instant`'s range.
pub const MAX_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CosiConfig {
    /// The root starts a round on every tick.
    pub round_interval_ms: u64,
    /// Silence from the parent for this long triggers a view change.
    pub heartbeat_timeout_ms: u64,
    /// Per level of subtree height, for collecting commitments and again for responses.
    pub phase_timeout_ms: u64,
    /// Ticks a round may stay in flight before it is abandoned.
    pub max_missed_deadlines: u32,
    pub view_change_timeout_ms: u64,
    pub max_view_change_attempts: u32,
    pub branching_factor: usize,
    /// Tag of the round behaviour, see [`RoundKind::from_tag`].
    pub round_kind: String,
    /// The root closes the tree after this many rounds; unbounded when absent.
    pub max_rounds: Option<u64>,
}

impl Default for CosiConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: 1_000,
            heartbeat_timeout_ms: 5_000,
            phase_timeout_ms: 200,
            max_missed_deadlines: 3,
            view_change_timeout_ms: 2_000,
            max_view_change_attempts: 5,
            branching_factor: 2,
            round_kind: RoundKind::Cosi.tag().to_string(),
            max_rounds: None,
        }
    }
}

impl CosiConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CosiConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.round_kind()?;
        if self.branching_factor == 0 {
            return Err(ConfigError::Invalid("branching_factor must be positive".into()));
        }
        if self.round_interval_ms == 0 || self.phase_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "round_interval_ms and phase_timeout_ms must be positive".into(),
            ));
        }
        let longest = [
            self.round_interval_ms,
            self.heartbeat_timeout_ms,
            self.phase_timeout_ms,
            self.view_change_timeout_ms,
        ];
        if longest.iter().any(|ms| *ms > MAX_TIMEOUT_MS) {
            return Err(ConfigError::Invalid(format!("timeouts are capped at {}ms", MAX_TIMEOUT_MS)));
        }
        if self.heartbeat_timeout_ms <= self.round_interval_ms {
            return Err(ConfigError::Invalid(
                "heartbeat_timeout_ms must exceed round_interval_ms".into(),
            ));
        }
        if self.max_missed_deadlines == 0 || self.max_view_change_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_missed_deadlines and max_view_change_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn round_kind(&self) -> Result<RoundKind, ConfigError> {
        RoundKind::from_tag(&self.round_kind)
            .ok_or_else(|| ConfigError::UnknownRoundKind(self.round_kind.clone()))
    }

    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// How long a node of subtree height `height` waits for its children in one phase.
    pub fn phase_timeout(&self, height: u32) -> Duration {
        Duration::from_millis(self.phase_timeout_ms.saturating_mul(u64::from(height)))
    }

    pub fn view_change_timeout(&self) -> Duration {
        Duration::from_millis(self.view_change_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            CosiConfig::from_json_str(r#"{"round_kind": "stamp", "max_rounds": 10}"#).unwrap();
        assert_eq!(config.round_kind().unwrap(), RoundKind::Stamp);
        assert_eq!(config.max_rounds, Some(10));
        assert_eq!(config.branching_factor, CosiConfig::default().branching_factor);
        assert_eq!(config.phase_timeout(3), Duration::from_millis(600));
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(matches!(
            CosiConfig::from_json_str(r#"{"round_kind": "pbft"}"#),
            Err(ConfigError::UnknownRoundKind(kind)) if kind == "pbft"
        ));
        assert!(matches!(
            CosiConfig::from_json_str(r#"{"branching_factor": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CosiConfig::from_json_str(r#"{"heartbeat_timeout_ms": 10}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CosiConfig::from_json_str(r#"{"phase_timeout_ms": 18446744073709551615}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CosiConfig::from_json_str(r#"{"round_interval": 10}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CosiConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn phase_timeout_saturates() {
        let config = CosiConfig {
            phase_timeout_ms: u64::MAX / 2,
            ..CosiConfig::default()
        };
        assert_eq!(config.phase_timeout(3), Duration::from_millis(u64::MAX));

        let config = CosiConfig {
            phase_timeout_ms: MAX_TIMEOUT_MS,
            ..CosiConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(
            config.phase_timeout(u32::MAX),
            Duration::from_millis(MAX_TIMEOUT_MS * u64::from(u32::MAX))
        );
    }
}
