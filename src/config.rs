/// Configuration module for docrag.
///
/// Handles loading, validating, and providing default configuration values,
/// plus reading the LLM API key from a local env-style file.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_persist_dir() -> String {
    "./storage".to_string()
}

fn default_html_path() -> String {
    "./static/chat_interface.html".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".txt".to_string(), ".pdf".to_string()]
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_top_k() -> usize {
    2
}

fn default_context_window_chars() -> usize {
    12_000
}

fn default_model_dir() -> String {
    "models/bge-small-en-v1.5".to_string()
}

fn default_model_repo() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_api_key_file() -> String {
    "./openai_key.env".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000/query_with_context".to_string()
}

fn default_dataset_path() -> String {
    "Eval_data_subset.csv".to_string()
}

fn default_results_path() -> String {
    "eval_results.csv".to_string()
}

fn default_eval_timeout_secs() -> u64 {
    60
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory scanned on first build; also used to stage uploads.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Its existence at startup selects reload over build.
    #[serde(default = "default_persist_dir")]
    pub persist_dir: String,

    #[serde(default = "default_html_path")]
    pub html_path: String,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// How retrieved chunks are turned into a single answer.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    TreeSummarize,
    Compact,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Character budget for the context packed into one LLM prompt.
    #[serde(default = "default_context_window_chars")]
    pub context_window_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderProvider {
    #[default]
    Onnx,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbedderConfig {
    #[serde(default)]
    pub provider: EmbedderProvider,

    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// HuggingFace repository the ONNX export is fetched from.
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_api_key_file")]
    pub api_key_file: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EvalConfig {
    /// The query-with-context endpoint of a running service.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,

    #[serde(default = "default_results_path")]
    pub results_path: String,

    #[serde(default = "default_eval_timeout_secs")]
    pub timeout_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            persist_dir: default_persist_dir(),
            html_path: default_html_path(),
            allowed_extensions: default_allowed_extensions(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            response_mode: ResponseMode::default(),
            context_window_chars: default_context_window_chars(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            model_dir: default_model_dir(),
            model_repo: default_model_repo(),
            dimensions: default_dimensions(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            api_key_file: default_api_key_file(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            dataset_path: default_dataset_path(),
            results_path: default_results_path(),
            timeout_secs: default_eval_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.index.chunk_size > 0, "index.chunk_size must be positive");
        anyhow::ensure!(
            self.index.chunk_overlap < self.index.chunk_size,
            "index.chunk_overlap must be smaller than index.chunk_size"
        );
        anyhow::ensure!(self.index.top_k > 0, "index.top_k must be positive");
        anyhow::ensure!(
            self.index.context_window_chars >= self.index.chunk_size,
            "index.context_window_chars must hold at least one chunk"
        );
        anyhow::ensure!(
            self.embedder.dimensions > 0,
            "embedder.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.server.allowed_extensions.is_empty(),
            "at least one allowed extension must be specified"
        );
        anyhow::ensure!(
            self.eval.timeout_secs > 0,
            "eval.timeout_secs must be positive"
        );
        Ok(())
    }

    #[must_use]
    pub fn persist_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.persist_dir)
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.data_dir)
    }
}

// ── API key ──────────────────────────────────────────────────────────

/// Resolve the LLM API key.
///
/// A process environment variable named `llm.api_key_env` wins; otherwise the
/// key is read from the dotenv file at `llm.api_key_file`. The file is parsed
/// without touching the process environment.
pub fn load_api_key(llm: &LlmConfig) -> Result<String> {
    if let Ok(key) = std::env::var(&llm.api_key_env) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    let path = Path::new(&llm.api_key_file);
    read_env_file(path, &llm.api_key_env)?.with_context(|| {
        format!(
            "{} not set in {} or the environment",
            llm.api_key_env,
            path.display()
        )
    })
}

/// Value of `key` in a dotenv file; a later assignment overrides an earlier
/// one, and an empty value counts as unset.
fn read_env_file(path: &Path, key: &str) -> Result<Option<String>> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read API key file: {}", path.display()))?;

    let mut value = None;
    for entry in entries {
        let (name, v) = entry.with_context(|| format!("failed to parse {}", path.display()))?;
        if name == key {
            value = Some(v);
        }
    }
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.chunk_size, 512);
        assert_eq!(config.index.chunk_overlap, 50);
        assert_eq!(config.index.top_k, 2);
        assert_eq!(config.index.response_mode, ResponseMode::TreeSummarize);
        assert_eq!(config.embedder.dimensions, 384);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.eval.timeout_secs, 60);
        assert_eq!(config.server.allowed_extensions, vec![".txt", ".pdf"]);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"index": {"chunk_size": 1000, "response_mode": "compact"}, "server": {"port": 9000}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.index.chunk_size, 1000);
        assert_eq!(config.index.response_mode, ResponseMode::Compact);
        assert_eq!(config.server.port, 9000);
        // Other fields should have defaults
        assert_eq!(config.index.top_k, 2);
        assert_eq!(config.server.persist_dir, "./storage");
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_too_large() {
        let mut config = Config::default();
        config.index.chunk_overlap = config.index.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_no_extensions() {
        let mut config = Config::default();
        config.server.allowed_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_custom_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 8000);
        // Templates are only generated for the default path
        assert!(!path.exists());
    }

    #[test]
    fn test_load_invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.index.chunk_size, 512);
    }

    fn env_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openai_key.env");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_env_file_quoting() {
        let (_dir, path) = env_file(
            "# comment\nOTHER=1\nexport OPENAI_API_KEY=\"sk-a#b\" # trailing comment\n",
        );
        assert_eq!(
            read_env_file(&path, "OPENAI_API_KEY").unwrap().as_deref(),
            Some("sk-a#b")
        );
        assert_eq!(read_env_file(&path, "MISSING").unwrap(), None);
    }

    #[test]
    fn test_read_env_file_multiline_and_override() {
        let (_dir, path) = env_file("KEY=first\nNOTE=\"line one\nline two\"\nKEY=second\n");
        assert_eq!(read_env_file(&path, "KEY").unwrap().as_deref(), Some("second"));
        assert_eq!(
            read_env_file(&path, "NOTE").unwrap().as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn test_read_env_file_empty_value_and_missing_file() {
        let (_dir, path) = env_file("OPENAI_API_KEY=\n");
        assert_eq!(read_env_file(&path, "OPENAI_API_KEY").unwrap(), None);
        assert!(read_env_file(&path.with_file_name("absent.env"), "OPENAI_API_KEY").is_err());
    }

    #[test]
    fn test_load_api_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.env");
        std::fs::write(&path, "DOCRAG_TEST_ONLY_KEY=sk-file\n").unwrap();

        let llm = LlmConfig {
            api_key_file: path.to_string_lossy().to_string(),
            api_key_env: "DOCRAG_TEST_ONLY_KEY".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(load_api_key(&llm).unwrap(), "sk-file");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.index.chunk_size, config.index.chunk_size);
        assert_eq!(parsed.server.persist_dir, config.server.persist_dir);
        assert_eq!(parsed.llm.model, config.llm.model);
    }
}
