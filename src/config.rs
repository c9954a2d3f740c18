//! TOML configuration for E-Cris.
//!
//! Every setting the pipeline needs (index location, document set, chunking,
//! retrieval, embedding provider, chat models, prompts, crisis thresholds and
//! the HTTP bind address) lives in one [`Config`] value that is loaded once
//! and passed explicitly to each component.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub crisis: Option<CrisisConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

/// Which reference files make up the document set.
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Explicit file list, loaded in order.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Optional directory walked for additional files.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            dir: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of one document.
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
    2048
}
fn default_chunk_overlap() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `openai` and `ollama` providers.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the key for the `openai` provider.
    #[serde(default = "default_embedding_key_env")]
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
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_embedding_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_key_env() -> String {
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

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Chat-completion settings shared by the primary and fallback tiers.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. `https://api.groq.com/openai/v1`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Environment variable checked first for the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    /// File whose trimmed contents are used when the variable is unset.
    #[serde(default)]
    pub api_key_file: Option<PathBuf>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            primary_model: default_primary_model(),
            fallback_model: default_fallback_model(),
            api_key_env: default_llm_key_env(),
            api_key_file: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_primary_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_fallback_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_llm_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Upper bound, in characters, of the context sent in one chat call.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_max_context_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_apology")]
    pub apology: String,
    #[serde(default = "default_empty_question_reply")]
    pub empty_question_reply: String,
    /// Wall-clock budget for each answer tier.
    #[serde(default = "default_tier_timeout_secs")]
    pub tier_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            apology: default_apology(),
            empty_question_reply: default_empty_question_reply(),
            tier_timeout_secs: default_tier_timeout_secs(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are E-Cris, a virtual assistant specialised in corporate crisis management. \
     Give practical, concise guidance on identifying crisis types, responding to \
     stakeholders and protecting brand reputation."
        .to_string()
}
fn default_apology() -> String {
    "Sorry, E-Cris cannot answer right now. Please try again in a few minutes.".to_string()
}
fn default_empty_question_reply() -> String {
    "Please type a question.".to_string()
}
fn default_tier_timeout_secs() -> u64 {
    120
}

/// Negative-comment volume thresholds. No default is shipped: the value is
/// a policy decision of whoever deploys the dashboard.
#[derive(Debug, Deserialize, Clone)]
pub struct CrisisConfig {
    pub negative_threshold: usize,
    #[serde(default)]
    pub subsidiaries: HashMap<String, usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// A config with every default and the index at `index_path`.
    pub fn with_index(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index: IndexConfig {
                path: index_path.into(),
            },
            documents: DocumentsConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            synthesis: SynthesisConfig::default(),
            assistant: AssistantConfig::default(),
            crisis: None,
            server: ServerConfig::default(),
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
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    // Values above 1.0 are accepted: they disable the retrieval tier.
    if config.retrieval.similarity_threshold.is_nan()
        || config.retrieval.similarity_threshold < -1.0
    {
        anyhow::bail!("retrieval.similarity_threshold must be a number >= -1.0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    if config.llm.primary_model.trim().is_empty() || config.llm.fallback_model.trim().is_empty() {
        anyhow::bail!("llm.primary_model and llm.fallback_model must not be empty");
    }
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }
    if config.assistant.tier_timeout_secs == 0 {
        anyhow::bail!("assistant.tier_timeout_secs must be > 0");
    }
    if config.synthesis.max_context_chars < 64 {
        anyhow::bail!("synthesis.max_context_chars must be >= 64");
    }
    if config.assistant.apology.trim().is_empty() {
        anyhow::bail!("assistant.apology must not be empty");
    }
    if config.assistant.empty_question_reply.trim().is_empty() {
        anyhow::bail!("assistant.empty_question_reply must not be empty");
    }

    Ok(())
}
