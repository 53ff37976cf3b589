use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    512
}
fn default_overlap_chars() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Hits scoring below this cosine similarity are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            search_limit: default_search_limit(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_min_score() -> f32 {
    0.2
}
fn default_search_limit() -> usize {
    10
}
fn default_snippet_chars() -> usize {
    240
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// How many retrieved chunks ground a chat answer.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// "hash" (built-in deterministic), "openai", or "disabled".
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// "openai" or "disabled".
    #[serde(default = "default_disabled_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_disabled_provider() -> String {
    "disabled".to_string()
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    /// "openai" or "disabled".
    #[serde(default = "default_disabled_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_transcription_timeout_secs(),
        }
    }
}

fn default_transcription_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3030
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub notes_dir: Option<PathBuf>,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notes_dir: None,
            debounce_secs: default_debounce_secs(),
        }
    }
}

fn default_debounce_secs() -> u64 {
    2
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl TranscriptionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Expand a leading `~/` against $HOME. Paths that do not start with a tilde
/// pass through untouched.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

/// Default config location, `~/.memex/memex.toml`.
pub fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.memex/memex.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.db.path = expand_tilde(&config.db.path);
    if let Some(dir) = config.watcher.notes_dir.take() {
        config.watcher.notes_dir = Some(expand_tilde(&dir));
    }

    // Validate chunking
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }

    // Validate retrieval
    if config.retrieval.search_limit < 1 {
        anyhow::bail!("retrieval.search_limit must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }
    if config.retrieval.snippet_chars == 0 {
        anyhow::bail!("retrieval.snippet_chars must be > 0");
    }

    if config.chat.top_k < 1 {
        anyhow::bail!("chat.top_k must be >= 1");
    }

    // Validate providers
    match config.embedding.provider.as_str() {
        "hash" | "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or disabled.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be openai or disabled.",
            other
        ),
    }

    match config.transcription.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.transcription.model.is_none() {
                anyhow::bail!("transcription.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown transcription provider: '{}'. Must be openai or disabled.",
            other
        ),
    }

    if config.watcher.enabled && config.watcher.notes_dir.is_none() {
        anyhow::bail!("watcher.notes_dir must be set when watcher.enabled is true");
    }

    Ok(config)
}
