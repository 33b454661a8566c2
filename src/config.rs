use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub docrag: DocragConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Core paths and logging
#[derive(Debug, Clone, Deserialize)]
pub struct DocragConfig {
    /// Directory scanned for source documents (pdf, txt, md).
    pub docs_folder: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub dimensions: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Generation (answering) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Semantic chunking configuration.
///
/// A breakpoint is inserted between consecutive sentence groups whose
/// embedding distance exceeds the given percentile of all observed
/// distances in the document. Each group is a sentence joined with
/// `sentence_buffer` neighbors on each side for context.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_breakpoint_percentile")]
    pub breakpoint_percentile: f32,
    #[serde(default = "default_sentence_buffer")]
    pub sentence_buffer: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_k: usize,
    #[serde(default)]
    pub min_score: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            temperature: default_temperature(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            breakpoint_percentile: default_breakpoint_percentile(),
            sentence_buffer: default_sentence_buffer(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_top_k(),
            min_score: 0.0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_breakpoint_percentile() -> f32 {
    95.0
}

fn default_sentence_buffer() -> usize {
    1
}

fn default_top_k() -> usize {
    4
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DOCRAG_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DOCRAG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.docrag.docs_folder.exists() {
            anyhow::bail!(
                "docs_folder path does not exist: {}. Set docs_folder in config.toml to your documents directory.",
                self.docrag.docs_folder.display()
            );
        }

        if !self.docrag.docs_folder.is_dir() {
            anyhow::bail!(
                "docs_folder must be a directory, not a file: {}",
                self.docrag.docs_folder.display()
            );
        }

        std::env::var(&self.embeddings.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your API key.",
                self.embeddings.api_key_env
            )
        })?;

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.chunking.breakpoint_percentile <= 0.0 || self.chunking.breakpoint_percentile > 100.0
        {
            anyhow::bail!("chunking.breakpoint_percentile must be in (0, 100]");
        }

        if self.retrieval.default_k == 0 {
            anyhow::bail!("retrieval.default_k must be greater than 0");
        }

        if self.retrieval.min_score < 0.0 || self.retrieval.min_score > 1.0 {
            anyhow::bail!("retrieval.min_score must be between 0.0 and 1.0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.docrag.db_path
    }

    /// Get the documents root path (docs_folder from config.toml)
    pub fn docs_folder(&self) -> &Path {
        &self.docrag.docs_folder
    }
}
