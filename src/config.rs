use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embed::ProviderKind;

const CONFIG_DIR: &str = ".repograph";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory names excluded before files reach the extractor
    #[serde(default = "default_deny_dirs")]
    pub deny_dirs: Vec<String>,

    /// Binary/media/lock extensions excluded from parsing
    #[serde(default = "default_deny_extensions")]
    pub deny_extensions: Vec<String>,

    /// Line limit per chunk; also the cumulative line-span budget
    /// of an upload batch
    #[serde(default = "default_max_lines_per_chunk")]
    pub max_lines_per_chunk: usize,

    /// Record limit per upload batch
    #[serde(default = "default_max_records_per_batch")]
    pub max_records_per_batch: usize,

    /// Maximum upload batches in flight at once
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            deny_dirs: default_deny_dirs(),
            deny_extensions: default_deny_extensions(),
            max_lines_per_chunk: default_max_lines_per_chunk(),
            max_records_per_batch: default_max_records_per_batch(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

fn default_deny_dirs() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "target".to_string(),
        ".git".to_string(),
        "dist".to_string(),
        "build".to_string(),
        "__pycache__".to_string(),
        ".venv".to_string(),
        "vendor".to_string(),
    ]
}

fn default_deny_extensions() -> Vec<String> {
    vec![
        "png", "jpg", "jpeg", "gif", "webp", "ico", "svg", "pdf", "zip", "gz", "tar", "mp3",
        "mp4", "mov", "wasm", "woff", "woff2", "ttf", "eot", "lock", "bin", "exe", "so", "dylib",
        "class", "o", "a",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_lines_per_chunk() -> usize {
    200
}

fn default_max_records_per_batch() -> usize {
    100
}

fn default_upload_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Provider strategy: remote, local, or hash (default)
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model name for remote or local providers
    #[serde(default = "default_model")]
    pub model: String,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Vector dimension used by the hash fallback provider
    #[serde(default = "default_hash_dim")]
    pub hash_dim: usize,

    /// Per-call timeout for remote embedding requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API key for the remote provider; `${VAR}` references resolve
    /// through the environment
    #[serde(default)]
    pub api_key: String,

    /// Override base URL for OpenAI-compatible endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            batch_size: default_batch_size(),
            hash_dim: default_hash_dim(),
            timeout_secs: default_timeout_secs(),
            api_key: String::new(),
            base_url: None,
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_hash_dim() -> usize {
    256
}

fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingsConfig {
    /// Resolve the remote API key from config or environment.
    ///
    /// Priority: explicit value, `${VAR}` reference, then the
    /// `OPENAI_API_KEY` environment variable.
    pub fn load_api_key(&self) -> Result<String> {
        if !self.api_key.is_empty() && !self.api_key.starts_with("${") {
            return Ok(self.api_key.clone());
        }

        if self.api_key.starts_with("${") && self.api_key.ends_with('}') {
            let var_name = &self.api_key[2..self.api_key.len() - 1];
            return std::env::var(var_name)
                .with_context(|| format!("Environment variable {} not set", var_name));
        }

        std::env::var("OPENAI_API_KEY")
            .context("No API key configured and OPENAI_API_KEY environment variable not set")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the vector database (relative to .repograph/).
    /// When absent the store is disabled and every call is a no-op.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    /// Per-call timeout for store operations
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable file logging
    #[serde(default)]
    pub enabled: bool,

    /// Also log to stderr
    #[serde(default = "default_stderr")]
    pub stderr: bool,

    /// Log level for the file layer
    #[serde(default = "default_level")]
    pub level: String,

    /// Log directory (relative paths resolve against the project root)
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// Prefix for rolled log files
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Rotation strategy: hourly, daily, minutely, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stderr: default_stderr(),
            level: default_level(),
            directory: default_log_dir(),
            file_prefix: default_file_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_stderr() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".repograph/logs")
}

fn default_file_prefix() -> String {
    "repograph".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from the .repograph directory
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the .repograph directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Path to the .repograph directory
    pub fn repograph_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Resolved vector database path, if the store is configured
    pub fn db_path(&self, root: &Path) -> Option<PathBuf> {
        self.store
            .db_path
            .as_ref()
            .map(|p| Self::repograph_dir(root).join(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.indexer.deny_dirs.contains(&"node_modules".to_string()));
        assert_eq!(config.indexer.max_lines_per_chunk, 200);
        assert_eq!(config.indexer.max_records_per_batch, 100);
        assert_eq!(config.embeddings.provider, ProviderKind::Hash);
        assert!(config.store.db_path.is_none());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.store.db_path = Some("index.lance".to_string());

        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();

        assert_eq!(loaded.store.db_path, Some("index.lance".to_string()));
        assert_eq!(config.indexer.deny_dirs, loaded.indexer.deny_dirs);
    }

    #[test]
    fn test_load_missing_config_returns_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.indexer.max_lines_per_chunk, 200);
    }

    #[test]
    fn test_db_path_disabled_when_unset() {
        let config = Config::default();
        assert!(config.db_path(Path::new("/tmp/x")).is_none());
    }
}
