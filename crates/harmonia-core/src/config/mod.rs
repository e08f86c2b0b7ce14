//! Harmonizer configuration.
//!
//! Provides `HarmonizerConfig`, loaded from a JSON file and adjusted by
//! `HARMONIA_*` environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const DEFAULT_STALE_LOCK_SECS: u64 = 3600;
const DEFAULT_MAX_PASSES: u32 = 32;

/// Which side wins when both sides changed the same entity since the last
/// harmonization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Local content is forced onto the remote side
    PreferLocal,
    /// Remote content overwrites the local entity
    #[default]
    PreferRemote,
}

impl ConflictPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreferLocal => "prefer_local",
            Self::PreferRemote => "prefer_remote",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "prefer_local" | "local" => Ok(Self::PreferLocal),
            "prefer_remote" | "remote" => Ok(Self::PreferRemote),
            other => Err(Error::Config(format!("unknown conflict policy '{other}'"))),
        }
    }
}

/// Runtime configuration shared by the scheduler and the harmonizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct HarmonizerConfig {
    /// Seconds after which a held lock with no heartbeat may be stolen
    pub stale_lock_threshold_secs: u64,
    /// Resolution applied when both sides changed the same entity
    pub conflict_policy: ConflictPolicy,
    /// Update lock heartbeat fields without marking the lock held
    pub dry_run_locks: bool,
    /// Upper bound on passes per collection before giving up for this cycle
    pub max_passes: u32,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            stale_lock_threshold_secs: DEFAULT_STALE_LOCK_SECS,
            conflict_policy: ConflictPolicy::default(),
            dry_run_locks: false,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl HarmonizerConfig {
    /// Stale lock threshold as a `Duration`.
    pub const fn stale_lock_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_lock_threshold_secs)
    }

    /// Parse a config from a raw JSON payload and validate it.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
            .map_err(|error| Error::Config(format!("{} ({})", error, path.display())))
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `HARMONIA_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `HARMONIA_*` overrides using the given lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| normalize_text_option(lookup(key));

        if let Some(value) = read("HARMONIA_CONFLICT_POLICY") {
            self.conflict_policy = value.parse()?;
        }
        if let Some(value) = read("HARMONIA_STALE_LOCK_SECS") {
            self.stale_lock_threshold_secs = value.parse().map_err(|_| {
                Error::Config(format!("HARMONIA_STALE_LOCK_SECS must be an integer, got '{value}'"))
            })?;
        }
        if let Some(value) = read("HARMONIA_DRY_RUN_LOCKS") {
            self.dry_run_locks = matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(value) = read("HARMONIA_MAX_PASSES") {
            self.max_passes = value.parse().map_err(|_| {
                Error::Config(format!("HARMONIA_MAX_PASSES must be an integer, got '{value}'"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.stale_lock_threshold_secs == 0 {
            return Err(Error::Config(
                "stale_lock_threshold_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_passes == 0 {
            return Err(Error::Config("max_passes must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = HarmonizerConfig::default();
        assert_eq!(config.stale_lock_threshold(), Duration::from_secs(3600));
        assert_eq!(config.conflict_policy, ConflictPolicy::PreferRemote);
        assert!(!config.dry_run_locks);
        assert_eq!(config.max_passes, 32);
    }

    #[test]
    fn parses_partial_json() {
        let config = HarmonizerConfig::from_json_str(r#"{ "conflict_policy": "prefer_local" }"#)
            .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::PreferLocal);
        assert_eq!(config.stale_lock_threshold_secs, 3600);
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = HarmonizerConfig::from_json_str(r#"{ "lock_timeout": 5 }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_zero_threshold() {
        let error =
            HarmonizerConfig::from_json_str(r#"{ "stale_lock_threshold_secs": 0 }"#).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HARMONIA_CONFLICT_POLICY", "local"),
            ("HARMONIA_STALE_LOCK_SECS", "60"),
            ("HARMONIA_DRY_RUN_LOCKS", "yes"),
            ("HARMONIA_MAX_PASSES", " "),
        ]);
        let config = HarmonizerConfig::default()
            .with_overrides(|key| env.get(key).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::PreferLocal);
        assert_eq!(config.stale_lock_threshold_secs, 60);
        assert!(config.dry_run_locks);
        assert_eq!(config.max_passes, 32);
    }

    #[test]
    fn env_override_rejects_bad_number() {
        let result = HarmonizerConfig::default().with_overrides(|key| {
            (key == "HARMONIA_MAX_PASSES").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_yields_defaults_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harmonia.json");
        assert_eq!(
            HarmonizerConfig::load_from_path(&path).unwrap(),
            HarmonizerConfig::default()
        );

        let config = HarmonizerConfig {
            max_passes: 4,
            ..HarmonizerConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(HarmonizerConfig::load_from_path(&path).unwrap(), config);
    }
}
