use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use serde::{Deserialize, Serialize};

use crate::{
    BACKOFF_BASE_MS, BACKOFF_CEILING_MS, CONFIRM_TIMEOUT_MS, DEFAULT_ADMIN, DEFAULT_RPC_URL,
    POLL_INTERVAL_ACTIVE_MS, POLL_INTERVAL_INACTIVE_MS, ROUNDS_PER_STAGE,
};

pub const ENV_RPC_URL:            &str = "LAST_MOVER_RPC_URL";
pub const ENV_PROGRAM_ID:         &str = "LAST_MOVER_PROGRAM_ID";
pub const ENV_ADMIN:              &str = "LAST_MOVER_ADMIN";
pub const ENV_POLL_ACTIVE_MS:     &str = "LAST_MOVER_POLL_INTERVAL_ACTIVE_MS";
pub const ENV_POLL_INACTIVE_MS:   &str = "LAST_MOVER_POLL_INTERVAL_INACTIVE_MS";
pub const ENV_ROUNDS_PER_STAGE:   &str = "LAST_MOVER_ROUNDS_PER_STAGE";
pub const ENV_NAME_CACHE:         &str = "LAST_MOVER_NAME_CACHE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything the controller needs to know about the deployment it tracks.
///
/// Defaults come from the crate constants; a JSON file may override any
/// subset of fields and the `LAST_MOVER_*` environment variables win over
/// both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub rpc_url:                   String,
    #[serde(with = "pubkey_string")]
    pub program_id:                Pubkey,
    /// Wallet allowed to initialize, start, pause and close the game.
    #[serde(with = "pubkey_string")]
    pub admin:                     Pubkey,
    pub poll_interval_active_ms:   u64,
    pub poll_interval_inactive_ms: u64,
    pub backoff_base_ms:           u64,
    pub backoff_ceiling_ms:        u64,
    pub rounds_per_stage:          u64,
    pub confirm_timeout_ms:        u64,
    /// Where player display names are cached. `None` keeps them in memory.
    pub name_cache:                Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url:                   DEFAULT_RPC_URL.to_string(),
            program_id:                crate::ID,
            admin:                     DEFAULT_ADMIN,
            poll_interval_active_ms:   POLL_INTERVAL_ACTIVE_MS,
            poll_interval_inactive_ms: POLL_INTERVAL_INACTIVE_MS,
            backoff_base_ms:           BACKOFF_BASE_MS,
            backoff_ceiling_ms:        BACKOFF_CEILING_MS,
            rounds_per_stage:          ROUNDS_PER_STAGE,
            confirm_timeout_ms:        CONFIRM_TIMEOUT_MS,
            name_cache:                None,
        }
    }
}

impl SyncConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()
    }

    /// Reject values the fee schedule cannot work with.
    fn validate(self) -> Result<Self, ConfigError> {
        if self.rounds_per_stage == 0 {
            return Err(ConfigError::InvalidValue {
                key:   "rounds_per_stage",
                value: self.rounds_per_stage.to_string(),
            });
        }
        Ok(self)
    }

    /// Load `path` if given (defaults otherwise), then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.rpc_url = url;
        }
        if let Some(raw) = lookup(ENV_PROGRAM_ID) {
            self.program_id = parse_value(ENV_PROGRAM_ID, raw)?;
        }
        if let Some(raw) = lookup(ENV_ADMIN) {
            self.admin = parse_value(ENV_ADMIN, raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_ACTIVE_MS) {
            self.poll_interval_active_ms = parse_value(ENV_POLL_ACTIVE_MS, raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_INACTIVE_MS) {
            self.poll_interval_inactive_ms = parse_value(ENV_POLL_INACTIVE_MS, raw)?;
        }
        if let Some(raw) = lookup(ENV_ROUNDS_PER_STAGE) {
            let rounds: u64 = parse_value(ENV_ROUNDS_PER_STAGE, raw.clone())?;
            if rounds == 0 {
                return Err(ConfigError::InvalidValue { key: ENV_ROUNDS_PER_STAGE, value: raw });
            }
            self.rounds_per_stage = rounds;
        }
        if let Some(path) = lookup(ENV_NAME_CACHE) {
            self.name_cache = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_active_ms)
    }

    pub fn inactive_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_inactive_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}

/// Pubkeys are written base58 in config files, not as byte arrays.
mod pubkey_string {
    use std::str::FromStr;

    use anchor_lang::prelude::Pubkey;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pubkey::from_str(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.program_id, crate::ID);
        assert_eq!(config.active_interval(), Duration::from_secs(60));
        assert_eq!(config.inactive_interval(), Duration::from_secs(120));
        assert_eq!(config.backoff_base(), Duration::from_secs(60));
        assert_eq!(config.backoff_ceiling(), Duration::from_secs(300));
        assert_eq!(config.rounds_per_stage, 5);
    }

    #[test]
    fn environment_overrides_defaults() {
        let admin = Pubkey::new_unique();
        let config = SyncConfig::default()
            .with_overrides(env(&[
                (ENV_RPC_URL, "http://localhost:8899"),
                (ENV_ADMIN, &admin.to_string()),
                (ENV_POLL_ACTIVE_MS, "15000"),
                (ENV_ROUNDS_PER_STAGE, "50"),
            ]))
            .unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.admin, admin);
        assert_eq!(config.poll_interval_active_ms, 15_000);
        assert_eq!(config.poll_interval_inactive_ms, POLL_INTERVAL_INACTIVE_MS);
        assert_eq!(config.rounds_per_stage, 50);
    }

    #[test]
    fn bad_override_names_the_variable() {
        let err = SyncConfig::default()
            .with_overrides(env(&[(ENV_POLL_INACTIVE_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_POLL_INACTIVE_MS, .. }));

        let err = SyncConfig::default()
            .with_overrides(env(&[(ENV_ROUNDS_PER_STAGE, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_ROUNDS_PER_STAGE, .. }));
    }

    #[test]
    fn file_with_zero_rounds_per_stage_is_rejected() {
        let path = std::env::temp_dir().join(format!("last-mover-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "rounds_per_stage": 0 }"#).unwrap();
        let err = SyncConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "rounds_per_stage", .. }));

        std::fs::write(&path, r#"{ "rounds_per_stage": 50 }"#).unwrap();
        assert_eq!(SyncConfig::from_file(&path).unwrap().rounds_per_stage, 50);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let program = Pubkey::new_unique();
        let raw = format!(r#"{{ "program_id": "{program}", "backoff_ceiling_ms": 120000 }}"#);
        let config: SyncConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(config.program_id, program);
        assert_eq!(config.backoff_ceiling_ms, 120_000);
        assert_eq!(config.admin, DEFAULT_ADMIN);
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);

        let written = serde_json::to_string(&config).unwrap();
        assert!(written.contains(&program.to_string()));
    }
}
