use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Hex digits in a digest; no target above this is satisfiable.
const MAX_DIFFICULTY: u32 = 64;

/// Configuration for a [`crate::Ledger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Leading zero hex digits required of every sealed block hash.
    pub difficulty: u32,
    /// Highest nonce tried before a sealing pass gives up.
    pub max_nonce: u64,
    /// Period of the background seal scheduler.
    pub seal_interval_secs: u64,
    /// Role recorded on the issuer signature created at registration.
    pub issuer_role: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            max_nonce: 50_000_000,
            seal_interval_secs: 10,
            issuer_role: "issuer".into(),
        }
    }
}

impl LedgerConfig {
    /// A configuration suited to tests: trivial proof-of-work.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Default::default()
        }
    }

    pub fn seal_interval(&self) -> Duration {
        Duration::from_secs(self.seal_interval_secs)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "difficulty {} exceeds the {MAX_DIFFICULTY} hex digits of a digest",
                self.difficulty
            )));
        }
        if self.seal_interval_secs == 0 {
            return Err(LedgerError::Config("seal_interval_secs must be positive".into()));
        }
        if self.issuer_role.trim().is_empty() {
            return Err(LedgerError::Config("issuer_role must not be empty".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, LedgerError> {
        let config: Self = toml::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, LedgerError> {
        toml::to_string_pretty(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}
