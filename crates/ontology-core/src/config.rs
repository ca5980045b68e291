//! Runtime configuration: every tunable named in the DAG runtime's external-interface
//! table, loaded from an optional TOML file overlaid with `ONTOLOGY_`-prefixed
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_llm_max_concurrent() -> u32 {
    4
}
fn default_llm_retry_attempts() -> u32 {
    3
}
fn default_circuit_breaker_threshold() -> u32 {
    5
}
fn default_circuit_breaker_cooldown_secs() -> u64 {
    30
}
fn default_heartbeat_interval_secs() -> u64 {
    10
}
fn default_heartbeat_stale_factor() -> u32 {
    3
}
fn default_high_confidence_threshold() -> f64 {
    0.85
}
fn default_promotion_threshold() -> i32 {
    50
}
fn default_max_columns_depth_tables() -> u32 {
    10
}
fn default_database_url() -> String {
    "postgres://localhost/ontology".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Process-wide tunables for the DAG runtime and LLM worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// `LLM_MAX_CONCURRENT` — bounded parallelism of the LLM worker pool.
    #[serde(default = "default_llm_max_concurrent")]
    pub llm_max_concurrent: u32,
    /// `LLM_RETRY_ATTEMPTS` — max attempts (including the first) for a transient LLM error.
    #[serde(default = "default_llm_retry_attempts")]
    pub llm_retry_attempts: u32,
    /// `CIRCUIT_BREAKER_THRESHOLD` — consecutive transient failures before the breaker opens.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// `CIRCUIT_BREAKER_COOLDOWN` (seconds) — cool-off before a half-open probe is allowed.
    #[serde(default = "default_circuit_breaker_cooldown_secs")]
    pub circuit_breaker_cooldown_secs: u64,
    /// `HEARTBEAT_INTERVAL` (seconds) — how often a running DAG refreshes its heartbeat.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// `HEARTBEAT_STALE_FACTOR` — staleness threshold as a multiple of the heartbeat interval.
    #[serde(default = "default_heartbeat_stale_factor")]
    pub heartbeat_stale_factor: u32,
    /// `HIGH_CONFIDENCE_THRESHOLD` — relationship candidates at or above this confidence auto-resolve.
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,
    /// `PROMOTION_THRESHOLD` — minimum promotion score for a table to become an entity.
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: i32,
    /// `MAX_COLUMNS_DEPTH_TABLES` — max tables batched into a single enrichment prompt.
    #[serde(default = "default_max_columns_depth_tables")]
    pub max_columns_depth_tables: u32,
    /// Postgres connection string for the DAG/ontology repositories.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info", "ontology_core=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            llm_max_concurrent: default_llm_max_concurrent(),
            llm_retry_attempts: default_llm_retry_attempts(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_cooldown_secs: default_circuit_breaker_cooldown_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_stale_factor: default_heartbeat_stale_factor(),
            high_confidence_threshold: default_high_confidence_threshold(),
            promotion_threshold: default_promotion_threshold(),
            max_columns_depth_tables: default_max_columns_depth_tables(),
            database_url: default_database_url(),
            log_level: default_log_level(),
        }
    }
}

impl RuntimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Threshold past which a DAG's heartbeat is considered stale and eligible for reclaim.
    pub fn heartbeat_stale_after(&self) -> Duration {
        self.heartbeat_interval() * self.heartbeat_stale_factor
    }

    /// Same threshold, as a `chrono::Duration` for comparison against `heartbeat_at`
    /// timestamps stored on [`crate::model::Dag`].
    pub fn heartbeat_stale_after_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.heartbeat_stale_after()).unwrap_or(chrono::Duration::seconds(30))
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_cooldown_secs)
    }

    /// Loads config from file and environment. Precedence: env `ONTOLOGY_CONFIG` path >
    /// `ontology.toml` > built-in defaults. Env vars use prefix `ONTOLOGY_` and `__` as
    /// the nested-key separator (e.g. `ONTOLOGY_LLM_MAX_CONCURRENT`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("ONTOLOGY_CONFIG").unwrap_or_else(|_| "ontology.toml".to_string());

        let defaults = RuntimeConfig::default();
        let builder = config::Config::builder()
            .set_default("llm_max_concurrent", defaults.llm_max_concurrent)?
            .set_default("llm_retry_attempts", defaults.llm_retry_attempts)?
            .set_default("circuit_breaker_threshold", defaults.circuit_breaker_threshold)?
            .set_default(
                "circuit_breaker_cooldown_secs",
                defaults.circuit_breaker_cooldown_secs,
            )?
            .set_default("heartbeat_interval_secs", defaults.heartbeat_interval_secs)?
            .set_default("heartbeat_stale_factor", defaults.heartbeat_stale_factor)?
            .set_default("high_confidence_threshold", defaults.high_confidence_threshold)?
            .set_default("promotion_threshold", defaults.promotion_threshold)?
            .set_default("max_columns_depth_tables", defaults.max_columns_depth_tables)?
            .set_default("database_url", defaults.database_url)?
            .set_default("log_level", defaults.log_level)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("ONTOLOGY").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_hints() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.llm_max_concurrent, 4);
        assert_eq!(cfg.llm_retry_attempts, 3);
        assert_eq!(cfg.circuit_breaker_threshold, 5);
        assert_eq!(cfg.circuit_breaker_cooldown_secs, 30);
        assert_eq!(cfg.heartbeat_interval_secs, 10);
        assert_eq!(cfg.heartbeat_stale_factor, 3);
        assert!((cfg.high_confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(cfg.promotion_threshold, 50);
        assert_eq!(cfg.max_columns_depth_tables, 10);
    }

    #[test]
    fn heartbeat_stale_after_is_interval_times_factor() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.heartbeat_stale_after(), Duration::from_secs(30));
    }
}
