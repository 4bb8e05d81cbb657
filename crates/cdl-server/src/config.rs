use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use cdl_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Run the periodic seal scheduler alongside the HTTP listener.
    pub seal_on_interval: bool,
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8787)),
            seal_on_interval: true,
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))?;
        config.ledger.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8787".parse::<SocketAddr>().unwrap());
        assert!(c.seal_on_interval);
        assert_eq!(c.ledger, LedgerConfig::default());
    }

    #[test]
    fn nested_ledger_table() {
        let c = ServerConfig::from_toml_str(
            "bind_addr = \"0.0.0.0:9000\"\nseal_on_interval = false\n\n[ledger]\ndifficulty = 2\n",
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert!(!c.seal_on_interval);
        assert_eq!(c.ledger.difficulty, 2);
        assert_eq!(c.ledger.seal_interval_secs, 10);
    }

    #[test]
    fn invalid_ledger_section_is_rejected() {
        assert!(ServerConfig::from_toml_str("[ledger]\nseal_interval_secs = 0\n").is_err());
    }

    #[test]
    fn load_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let original = ServerConfig::default();
        write!(file, "{}", original.to_toml_string().unwrap()).unwrap();
        assert_eq!(ServerConfig::load(file.path()).unwrap(), original);
    }
}
