//! Node configuration

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vmog_hot_swap::HotSwapConfig;
use vmog_registry::RegistryConfig;
use vmog_runtime::RuntimeConfig;

/// Everything a node needs, loaded from one TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Where the runtime snapshot is written after the scenario; stdout
    /// when unset.
    pub snapshot_path: Option<PathBuf>,

    pub registry: RegistryConfig,
    pub runtime: RuntimeConfig,
    pub hot_swap: HotSwapConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            snapshot_path: None,
            registry: RegistryConfig::default(),
            runtime: RuntimeConfig::default(),
            hot_swap: HotSwapConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `path`, or from the default location. Only a missing
    /// file at the default location yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("config file {} does not exist", p.display());
                }
                p.to_path_buf()
            }
            None => match Self::default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("loading {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/vmog/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vmog").join("config.toml"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.registry.timeout_ms == 0 {
            bail!("registry.timeout_ms must be positive");
        }
        if self.runtime.resolve_timeout_ms == 0 {
            bail!("runtime.resolve_timeout_ms must be positive");
        }
        if self.hot_swap.verify_timeout_ms == 0 {
            bail!("hot_swap.verify_timeout_ms must be positive");
        }
        if self.registry.backoff.multiplier < 1.0 {
            bail!("registry.backoff.multiplier must be at least 1.0");
        }
        if let Some((name, _)) = self.runtime.remotes.iter().find(|(_, url)| url.trim().is_empty()) {
            bail!("remote '{}' has no URL", name);
        }
        Ok(())
    }
}
