//! Operator profile persistence and effective-setting resolution.
//!
//! The profile is a single JSON record. Commands never read it through a
//! global: `main` loads it once and threads an [`EffectiveConfig`] through
//! every invocation.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AdminError, AdminResult};
use crate::wallet;

/// Current on-disk schema version
pub const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_KEYPAIR: &str = "~/.config/solana/id.json";

const CONFIG_DIR: &str = ".config/perp-admin";
const CONFIG_FILE: &str = "config.json";

/// Solana cluster the operator targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Devnet,
    Testnet,
    MainnetBeta,
    Localnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::MainnetBeta => "mainnet-beta",
            Network::Localnet => "localnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet-beta" | "mainnet" => Ok(Network::MainnetBeta),
            "localnet" | "localhost" => Ok(Network::Localnet),
            other => Err(AdminError::invalid_value(
                "network",
                format!("`{}` (expected devnet, testnet, mainnet-beta or localnet)", other),
            )),
        }
    }
}

/// Keys accepted by `config set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Network,
    Url,
    Keypair,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::Network => "network",
            ConfigKey::Url => "url",
            ConfigKey::Keypair => "keypair",
        }
    }

    /// CLI flag that overrides this key
    pub fn flag(&self) -> &'static str {
        match self {
            ConfigKey::Network => "env",
            ConfigKey::Url => "url",
            ConfigKey::Keypair => "keypair",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(ConfigKey::Network),
            "url" => Ok(ConfigKey::Url),
            "keypair" => Ok(ConfigKey::Keypair),
            other => Err(AdminError::InvalidKey(other.to_string())),
        }
    }
}

/// Persisted operator profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Schema version, missing in files written before versioning
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    /// JSON-RPC endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path to the operator keypair file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypair: Option<String>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            network: Some(Network::Devnet),
            url: Some(DEFAULT_URL.to_string()),
            keypair: Some(DEFAULT_KEYPAIR.to_string()),
        }
    }
}

impl OperatorConfig {
    /// Apply a single validated key/value pair
    pub fn apply(&mut self, key: ConfigKey, value: &str) -> AdminResult<()> {
        let value = value.trim();
        match key {
            ConfigKey::Network => self.network = Some(value.parse()?),
            ConfigKey::Url => {
                if value.is_empty() {
                    return Err(AdminError::invalid_value("url", "empty"));
                }
                self.url = Some(value.to_string());
            }
            ConfigKey::Keypair => {
                if value.is_empty() {
                    return Err(AdminError::invalid_value("keypair", "empty"));
                }
                self.keypair = Some(value.to_string());
            }
        }
        Ok(())
    }
}

/// Values supplied on the command line, each overriding the stored profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub env: Option<Network>,
    pub url: Option<String>,
    pub keypair: Option<String>,
}

/// Settings after applying override precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub network: Network,
    pub url: String,
    pub keypair: String,
}

impl EffectiveConfig {
    /// Resolve each setting: CLI override, then stored value, else
    /// [`AdminError::MissingSetting`].
    pub fn resolve(
        stored: Option<&OperatorConfig>,
        overrides: &ConfigOverrides,
    ) -> AdminResult<Self> {
        let network = overrides
            .env
            .or_else(|| stored.and_then(|c| c.network))
            .ok_or(AdminError::MissingSetting(ConfigKey::Network))?;

        let url = overrides
            .url
            .clone()
            .or_else(|| stored.and_then(|c| c.url.clone()))
            .ok_or(AdminError::MissingSetting(ConfigKey::Url))?;

        let keypair = overrides
            .keypair
            .clone()
            .or_else(|| stored.and_then(|c| c.keypair.clone()))
            .ok_or(AdminError::MissingSetting(ConfigKey::Keypair))?;

        Ok(Self {
            network,
            url,
            keypair,
        })
    }
}

/// File-backed profile store
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.config/perp-admin/config.json`
    pub fn default_location() -> AdminResult<Self> {
        let home = wallet::home_dir()?;
        Ok(Self::new(home.join(CONFIG_DIR).join(CONFIG_FILE)))
    }

    /// Store at `path` if given (with `~` expanded), else the default location
    pub fn locate(path: Option<&str>) -> AdminResult<Self> {
        match path {
            Some(p) => Ok(Self::new(wallet::expand_home(p)?)),
            None => Self::default_location(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the default profile, replacing any existing file
    pub fn init(&self) -> AdminResult<OperatorConfig> {
        let config = OperatorConfig::default();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| AdminError::ConfigIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.write(&config)?;
        debug!(path = %self.path.display(), "wrote default operator config");
        Ok(config)
    }

    /// Stored profile, or [`AdminError::ConfigMissing`]
    pub fn get(&self) -> AdminResult<OperatorConfig> {
        self.load_optional()?
            .ok_or_else(|| AdminError::ConfigMissing {
                path: self.path.clone(),
            })
    }

    /// Stored profile if the file exists
    pub fn load_optional(&self) -> AdminResult<Option<OperatorConfig>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AdminError::ConfigIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let config: OperatorConfig =
            serde_json::from_str(&content).map_err(|source| AdminError::ConfigFormat {
                path: self.path.clone(),
                source,
            })?;

        if config.version > CONFIG_VERSION {
            warn!(
                path = %self.path.display(),
                version = config.version,
                supported = CONFIG_VERSION,
                "operator config was written by a newer version; unknown fields are ignored"
            );
        }

        Ok(Some(config))
    }

    /// Read-modify-write of one key
    pub fn set(&self, key: &str, value: &str) -> AdminResult<OperatorConfig> {
        let key: ConfigKey = key.parse()?;
        let mut config = self.get()?;
        config.apply(key, value)?;
        self.write(&config)?;
        debug!(%key, path = %self.path.display(), "updated operator config");
        Ok(config)
    }

    fn write(&self, config: &OperatorConfig) -> AdminResult<()> {
        let content =
            serde_json::to_string_pretty(config).map_err(|source| AdminError::ConfigFormat {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, content).map_err(|source| AdminError::ConfigIo {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_devnet() -> OperatorConfig {
        OperatorConfig {
            version: CONFIG_VERSION,
            network: Some(Network::Devnet),
            url: Some("http://localhost:8899".to_string()),
            keypair: Some("/tmp/id.json".to_string()),
        }
    }

    #[test]
    fn test_override_wins_over_stored() {
        let overrides = ConfigOverrides {
            env: Some(Network::MainnetBeta),
            ..Default::default()
        };
        let effective = EffectiveConfig::resolve(Some(&stored_devnet()), &overrides).unwrap();
        assert_eq!(effective.network, Network::MainnetBeta);
        assert_eq!(effective.url, "http://localhost:8899");
    }

    #[test]
    fn test_stored_used_without_override() {
        let effective =
            EffectiveConfig::resolve(Some(&stored_devnet()), &ConfigOverrides::default()).unwrap();
        assert_eq!(effective.network, Network::Devnet);
        assert_eq!(effective.keypair, "/tmp/id.json");
    }

    #[test]
    fn test_missing_everywhere() {
        let err = EffectiveConfig::resolve(None, &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, AdminError::MissingSetting(ConfigKey::Network)));

        let partial = OperatorConfig {
            url: None,
            ..stored_devnet()
        };
        let err = EffectiveConfig::resolve(Some(&partial), &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, AdminError::MissingSetting(ConfigKey::Url)));
    }

    #[test]
    fn test_overrides_alone_are_enough() {
        let overrides = ConfigOverrides {
            env: Some(Network::Localnet),
            url: Some("http://127.0.0.1:8899".to_string()),
            keypair: Some("/tmp/k.json".to_string()),
        };
        let effective = EffectiveConfig::resolve(None, &overrides).unwrap();
        assert_eq!(effective.network, Network::Localnet);
    }

    #[test]
    fn test_network_names() {
        assert_eq!("mainnet-beta".parse::<Network>().unwrap(), Network::MainnetBeta);
        assert_eq!(Network::MainnetBeta.to_string(), "mainnet-beta");
        assert!("moonnet".parse::<Network>().is_err());
        assert_eq!(
            serde_json::to_string(&Network::MainnetBeta).unwrap(),
            "\"mainnet-beta\""
        );
    }

    #[test]
    fn test_invalid_key() {
        let err = "rpc".parse::<ConfigKey>().unwrap_err();
        assert!(matches!(err, AdminError::InvalidKey(ref k) if k == "rpc"));
    }

    #[test]
    fn test_missing_version_defaults_to_current() {
        let config: OperatorConfig =
            serde_json::from_str(r#"{"network":"devnet","url":"u","keypair":"k"}"#).unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
    }

    #[test]
    fn test_apply_rejects_empty_url() {
        let mut config = OperatorConfig::default();
        assert!(config.apply(ConfigKey::Url, "  ").is_err());
        assert_eq!(config.url.as_deref(), Some(DEFAULT_URL));
    }
}
