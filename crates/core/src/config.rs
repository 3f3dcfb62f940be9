//! Configuration management for the Colloquy answering engine.
//!
//! This module handles loading and merging configuration from multiple
//! sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (YAML)
//!
//! Provider credentials are intentionally NOT part of this struct; they are
//! resolved from the environment at client-construction time so that a
//! missing key fails at provider resolution, never mid-request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Pipeline step identifiers used for model routing.
///
/// Each step can be routed to a different `{provider, model}` pair in the
/// config file; unrouted steps use the global default provider.
pub const KNOWN_STEPS: &[&str] = &[
    "contextualize",
    "intent",
    "rag_search",
    "generation",
    "complex_reasoning",
    "grading",
    "rewrite",
    "embedding",
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database file (documents + conversation memory)
    pub database: PathBuf,

    /// Optional config file path
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Default LLM provider (e.g., "ollama", "openai", "gemini")
    pub provider: String,

    /// Default model identifier override
    pub model: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    #[serde(default)]
    pub verbose: bool,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Engine behavior knobs
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-step model routing (step name -> provider/model)
    #[serde(default)]
    pub steps: HashMap<String, StepRoute>,
}

/// Routing entry for a single pipeline step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepRoute {
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Engine behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Expand queries with a hypothetical answer before embedding
    #[serde(default)]
    pub use_hyde: bool,

    /// Rerank retrieval candidates with the LLM
    #[serde(default)]
    pub use_rerank: bool,

    /// Maximum rewrite-and-retry cycles after a failed grade
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Final number of retrieval candidates handed to the synthesizer
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    /// Number of recent turns used for contextualization
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Ingestion chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Ingestion chunk overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Timeout for generation-class model calls (seconds)
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Timeout for retrieval-class model calls (seconds)
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_history_window() -> usize {
    5
}

fn default_chunk_size() -> usize {
    1024
}

fn default_chunk_overlap() -> usize {
    20
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_retrieval_timeout() -> u64 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_hyde: false,
            use_rerank: false,
            max_retries: default_max_retries(),
            retrieval_limit: default_retrieval_limit(),
            history_window: default_history_window(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            generation_timeout_secs: default_generation_timeout(),
            retrieval_timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("colloquy.db"),
            config_file: None,
            provider: "ollama".to_string(), // local-first default
            model: None,
            log_level: None,
            verbose: false,
            no_color: false,
            engine: EngineConfig::default(),
            steps: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `COLLOQUY_DATABASE` - database file path
    /// - `COLLOQUY_PROVIDER` - default provider name
    /// - `COLLOQUY_MODEL` - default model identifier
    /// - `COLLOQUY_CONFIG` - config file path
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(database) = std::env::var("COLLOQUY_DATABASE") {
            config.database = PathBuf::from(database);
        }
        if let Ok(provider) = std::env::var("COLLOQUY_PROVIDER") {
            config.provider = provider;
        }
        if let Ok(model) = std::env::var("COLLOQUY_MODEL") {
            config.model = Some(model);
        }
        if let Ok(path) = std::env::var("COLLOQUY_CONFIG") {
            config = config.merge_file(PathBuf::from(path))?;
        }

        Ok(config)
    }

    /// Merge a YAML config file into this configuration.
    ///
    /// File values win over environment values for everything except the
    /// database path, which the file may simply omit.
    pub fn merge_file(mut self, path: PathBuf) -> AppResult<Self> {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config {:?}: {}", path, e)))?;

        let file: ConfigFile = serde_yaml::from_str(&raw)?;

        if let Some(database) = file.database {
            self.database = PathBuf::from(database);
        }
        if let Some(provider) = file.provider {
            self.provider = provider;
        }
        if let Some(model) = file.model {
            self.model = Some(model);
        }
        if let Some(engine) = file.engine {
            self.engine = engine;
        }
        if let Some(steps) = file.steps {
            self.steps = steps;
        }
        self.config_file = Some(path);

        Ok(self)
    }

    /// Apply command-line overrides to the loaded configuration.
    pub fn with_overrides(
        mut self,
        database: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if let Some(provider) = provider {
            self.provider = provider;
        }
        if let Some(model) = model {
            self.model = Some(model);
        }
        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }
        if verbose {
            self.log_level = Some("debug".to_string());
        }
        self.verbose = verbose;
        self.no_color = no_color;

        self
    }

    /// Resolve the `{provider, model}` route for a pipeline step.
    ///
    /// Priority: explicit step route > global default. The returned provider
    /// is always present; the model may be `None`, in which case the
    /// provider's own default model applies.
    pub fn route_for_step(&self, step: &str) -> (String, Option<String>) {
        if let Some(route) = self.steps.get(step) {
            let provider = route
                .provider
                .clone()
                .unwrap_or_else(|| self.provider.clone());
            let model = route.model.clone().or_else(|| self.model.clone());
            return (provider, model);
        }

        (self.provider.clone(), self.model.clone())
    }

    /// Ensure the database's parent directory exists.
    pub fn ensure_data_dir(&self) -> AppResult<()> {
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Config(format!("Failed to create data directory: {}", e))
                })?;
            }
        }
        Ok(())
    }
}

/// On-disk config file structure.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    database: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    engine: Option<EngineConfig>,
    steps: Option<HashMap<String, StepRoute>>,
}
