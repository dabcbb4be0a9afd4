//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/docrag.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! default_limit = 5
//!
//! [providers]
//! test_timeout_secs = 15
//!
//! [providers.openai]
//! api_key_env = "OPENAI_API_KEY"
//! required_models = ["gpt-4o"]
//!
//! [server]
//! bind = "127.0.0.1:7331"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Defaults applied to newly created collections.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Per-provider overrides keyed by provider name.
    #[serde(flatten)]
    pub overrides: BTreeMap<String, ProviderOverride>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: default_test_timeout(),
            request_timeout_secs: default_request_timeout(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_test_timeout() -> u64 {
    15
}
fn default_request_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ProviderOverride {
    pub base_url: Option<String>,
    /// Environment variable holding the credential, read at bootstrap.
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub required_models: Vec<String>,
}

impl ProvidersConfig {
    pub fn get(&self, name: &str) -> Option<&ProviderOverride> {
        self.overrides.get(name)
    }

    /// Models that must appear in `name`'s catalog, from configuration.
    pub fn required_models(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|o| o.required_models.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Where uploaded files are written. Defaults to `uploads/` next to
    /// the database.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7331".to_string()
}

impl Config {
    /// A configuration with every default and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Config {
            db: DbConfig { path: path.into() },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            providers: ProvidersConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        match &self.server.upload_dir {
            Some(dir) => dir.clone(),
            None => self
                .db
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("uploads"),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    // Validate providers
    if config.providers.test_timeout_secs < 1 {
        anyhow::bail!("providers.test_timeout_secs must be >= 1");
    }
    if config.providers.request_timeout_secs < 1 {
        anyhow::bail!("providers.request_timeout_secs must be >= 1");
    }
    for (name, o) in &config.providers.overrides {
        if let Some(url) = &o.base_url {
            let parsed = reqwest::Url::parse(url)
                .with_context(|| format!("providers.{}.base_url is not a valid URL", name))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("providers.{}.base_url must be http or https", name);
            }
        }
    }

    Ok(())
}
