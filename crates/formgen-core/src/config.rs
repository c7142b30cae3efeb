//! Engine configuration
//!
//! Loads [`EngineConfig`] from YAML.
//!
//! Lookup order for [`EngineConfig::from_env`]:
//! 1. `FORMGEN_CONFIG` environment variable (path to a YAML file)
//! 2. `formgen.yaml` in the working directory
//! 3. built-in defaults
//!
//! `FORMGEN_MAX_NODE_VISITS` then overrides the visit budget.

use crate::schema::EnablePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_ENV: &str = "FORMGEN_CONFIG";
pub const MAX_NODE_VISITS_ENV: &str = "FORMGEN_MAX_NODE_VISITS";
pub const DEFAULT_CONFIG_FILE: &str = "formgen.yaml";
pub const DEFAULT_MAX_NODE_VISITS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node-visit budget per resolution request
    pub max_node_visits: usize,
    pub enable_policy: EnablePolicy,
    /// Directories searched by the file-system type resolver, in order
    pub library_roots: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_node_visits: DEFAULT_MAX_NODE_VISITS,
            enable_policy: EnablePolicy::default(),
            library_roots: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).context("Failed to parse engine config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&source)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load using the process environment and working directory
    pub fn from_env() -> Result<Self> {
        Self::from_sources(|key| std::env::var(key).ok(), Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Lookup with an injectable environment, see module docs
    pub fn from_sources(env: impl Fn(&str) -> Option<String>, default_file: &Path) -> Result<Self> {
        let config = if let Some(path) = env(CONFIG_ENV) {
            info!(path = %path, "loading engine config from {}", CONFIG_ENV);
            Self::load(&path)?
        } else if default_file.is_file() {
            info!(path = %default_file.display(), "loading engine config");
            Self::load(default_file)?
        } else {
            Self::default()
        };
        config.apply_overrides(env)
    }

    /// Apply environment overrides on top of loaded values
    pub fn apply_overrides(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = env(MAX_NODE_VISITS_ENV) {
            self.max_node_visits = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", MAX_NODE_VISITS_ENV, raw))?;
        }
        Ok(self)
    }

    pub fn with_enable_policy(mut self, policy: EnablePolicy) -> Self {
        self.enable_policy = policy;
        self
    }

    pub fn with_library_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.library_roots.push(root.into());
        self
    }
}
