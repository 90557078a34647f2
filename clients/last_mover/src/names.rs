use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anchor_lang::prelude::Pubkey;
use tracing::debug;

use crate::ledger::{Ledger, LedgerError};
use crate::pda::player_profile_address;
use crate::state::decode_profile;

#[derive(Debug, thiserror::Error)]
pub enum NameCacheError {
    #[error("name cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("name cache {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Display names this client has set or seen, keyed by base58 address.
/// Only a fallback label; the on-chain profile is the source of truth.
#[derive(Debug, Default)]
pub struct NameCache {
    names: BTreeMap<String, String>,
    path:  Option<PathBuf>,
}

impl NameCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, NameCacheError> {
        let names = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| NameCacheError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(NameCacheError::Io { path: path.to_path_buf(), source });
            }
        };
        Ok(Self { names, path: Some(path.to_path_buf()) })
    }

    pub fn get(&self, player: &Pubkey) -> Option<&str> {
        self.names.get(&player.to_string()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Record a name and write the file through, if there is one. The entry
    /// stays in memory even when the write fails.
    pub fn insert(&mut self, player: &Pubkey, name: &str) -> Result<(), NameCacheError> {
        self.names.insert(player.to_string(), name.to_string());
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(&self.names).map_err(|source| NameCacheError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(path, raw).map_err(|source| NameCacheError::Io { path: path.clone(), source })
    }
}

/// Name stored in `player`'s on-chain profile, `None` if there is no
/// profile or it does not decode.
pub async fn profile_name<L: Ledger>(
    ledger: &L,
    program_id: &Pubkey,
    player: &Pubkey,
) -> Result<Option<String>, LedgerError> {
    let (profile, _) = player_profile_address(program_id, player);
    let Some(data) = ledger.account_data(&profile).await? else {
        return Ok(None);
    };
    match decode_profile(&data) {
        Ok(p) if !p.name.is_empty() => Ok(Some(p.name)),
        Ok(_) => Ok(None),
        Err(e) => {
            debug!(%player, error = %e, "ignoring undecodable profile");
            Ok(None)
        }
    }
}
