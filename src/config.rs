use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{HsgError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HsgConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub maintenance: MaintenanceConfig,
    pub ingestion: IngestionConfig,
    pub langgraph: LangGraphConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Which embedding backend serves every sector. Chosen once at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Gemini,
    Ollama,
    Local,
    Synthetic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::Local => "local",
            Self::Synthetic => "synthetic",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            "synthetic" => Ok(Self::Synthetic),
            _ => Err(format!("unknown embedding provider: {s}")),
        }
    }
}

/// `Simple` embeds the full text for all sectors in one batched call;
/// `Advanced` issues one call per sector and aggregates chunks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    Simple,
    Advanced,
}

impl EmbedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for EmbedMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "advanced" => Ok(Self::Advanced),
            _ => Err(format!("unknown embed mode: {s}")),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub mode: EmbedMode,
    pub dimensions: usize,
    /// Run per-sector calls concurrently in advanced mode (ignored for serialized providers).
    pub parallel: bool,
    pub sector_delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_cooldown_ms: u64,
    pub ollama_url: String,
    pub local_model_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub decay_interval_hours: u64,
    pub prune_interval_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    /// Estimated token count above which a document is split into root + children.
    pub large_doc_threshold: usize,
    /// Maximum characters per child section.
    pub section_size: usize,
}

/// Agent-graph memory mode.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LangGraphConfig {
    /// Namespace used when a request names none.
    pub namespace: String,
    /// Default item budget for node retrieval and graph context.
    pub max_context: usize,
    /// Store an automatic reflection alongside every non-reflect node memory.
    pub reflective: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_hsg_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Synthetic,
            mode: EmbedMode::Simple,
            dimensions: 768,
            parallel: false,
            sector_delay_ms: 200,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_ms: 1000,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".into(),
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            gemini_cooldown_ms: 1500,
            ollama_url: "http://localhost:11434".into(),
            local_model_path: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_k: 8 }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            decay_interval_hours: 24,
            prune_interval_hours: 168,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            large_doc_threshold: 8000,
            section_size: 3000,
        }
    }
}

impl Default for LangGraphConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            max_context: 50,
            reflective: true,
        }
    }
}

/// Returns `~/.hsgmem/`
pub fn default_hsg_dir() -> PathBuf {
    home_dir().join(".hsgmem")
}

/// Returns the default config file path: `~/.hsgmem/config.toml`
pub fn default_config_path() -> PathBuf {
    default_hsg_dir().join("config.toml")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl HsgConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                HsgError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            toml::from_str(&contents)
                .map_err(|e| HsgError::Config(format!("failed to parse config TOML: {e}")))?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HsgConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. Unparseable values are logged and ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HSG_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("HSG_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("HSG_EMBEDDINGS") {
            match val.parse() {
                Ok(kind) => self.embedding.provider = kind,
                Err(e) => warn!(value = %val, "ignoring HSG_EMBEDDINGS: {e}"),
            }
        }
        if let Ok(val) = std::env::var("HSG_EMBED_MODE") {
            match val.parse() {
                Ok(mode) => self.embedding.mode = mode,
                Err(e) => warn!(value = %val, "ignoring HSG_EMBED_MODE: {e}"),
            }
        }
        if let Ok(val) = std::env::var("HSG_VEC_DIM") {
            match val.parse::<usize>() {
                Ok(dim) if dim > 0 => self.embedding.dimensions = dim,
                _ => warn!(value = %val, "ignoring HSG_VEC_DIM: expected a positive integer"),
            }
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.embedding.gemini_api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = val;
        }
        if let Ok(val) = std::env::var("LOCAL_MODEL_PATH") {
            self.embedding.local_model_path = Some(val);
        }
        if let Ok(val) = std::env::var("HSG_LG_NAMESPACE") {
            self.langgraph.namespace = val;
        }
        if let Ok(val) = std::env::var("HSG_LG_MAX_CONTEXT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.langgraph.max_context = n,
                _ => warn!(value = %val, "ignoring HSG_LG_MAX_CONTEXT: expected a positive integer"),
            }
        }
        if let Ok(val) = std::env::var("HSG_LG_REFLECTIVE") {
            self.langgraph.reflective = !val.eq_ignore_ascii_case("false");
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = HsgConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.embedding.provider, ProviderKind::Synthetic);
        assert_eq!(config.embedding.mode, EmbedMode::Simple);
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.embedding.gemini_cooldown_ms, 1500);
        assert_eq!(config.retrieval.default_k, 8);
        assert_eq!(config.ingestion.section_size, 3000);
        assert_eq!(config.langgraph.namespace, "default");
        assert_eq!(config.langgraph.max_context, 50);
        assert!(config.langgraph.reflective);
        assert!(config.storage.db_path.ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
level = "debug"

[storage]
db_path = "/tmp/test.db"

[embedding]
provider = "gemini"
mode = "advanced"
dimensions = 256
parallel = true

[maintenance]
decay_interval_hours = 12

[langgraph]
namespace = "agents"
reflective = false
"#;
        let config: HsgConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.embedding.provider, ProviderKind::Gemini);
        assert_eq!(config.embedding.mode, EmbedMode::Advanced);
        assert_eq!(config.embedding.dimensions, 256);
        assert!(config.embedding.parallel);
        assert_eq!(config.maintenance.decay_interval_hours, 12);
        // defaults still apply for unset fields
        assert_eq!(config.maintenance.prune_interval_hours, 168);
        assert_eq!(config.embedding.sector_delay_ms, 200);
        assert_eq!(config.langgraph.namespace, "agents");
        assert!(!config.langgraph.reflective);
        assert_eq!(config.langgraph.max_context, 50);
    }

    #[test]
    fn unknown_provider_is_rejected_by_toml() {
        let toml_str = r#"
[embedding]
provider = "word2vec"
"#;
        assert!(toml::from_str::<HsgConfig>(toml_str).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = HsgConfig::default();
        std::env::set_var("HSG_DB", "/tmp/override.db");
        std::env::set_var("HSG_LOG_LEVEL", "trace");
        std::env::set_var("HSG_EMBEDDINGS", "OpenAI");
        std::env::set_var("HSG_EMBED_MODE", "advanced");
        std::env::set_var("HSG_VEC_DIM", "not-a-number");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.embedding.provider, ProviderKind::OpenAi);
        assert_eq!(config.embedding.mode, EmbedMode::Advanced);
        // invalid dimension is ignored
        assert_eq!(config.embedding.dimensions, 768);

        // Clean up
        std::env::remove_var("HSG_DB");
        std::env::remove_var("HSG_LOG_LEVEL");
        std::env::remove_var("HSG_EMBEDDINGS");
        std::env::remove_var("HSG_EMBED_MODE");
        std::env::remove_var("HSG_VEC_DIM");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HsgConfig::load_from(dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.retrieval.default_k, 8);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[embedding\nprovider = ").unwrap();
        let err = HsgConfig::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
