use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for `DOC_RAG_RETRIEVAL_K`; larger contexts do not fit a prompt.
pub const MAX_RETRIEVAL_K: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the chunk store and vector data are persisted
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Number of fused chunks used as answer context
    pub retrieval_k: usize,
    /// What happens when a `doc_id` is ingested twice
    pub reingest: ReingestPolicy,
    /// Maximum concurrent generation streams
    pub max_concurrent_streams: usize,
}

/// Behaviour when an already-present `doc_id` is ingested again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReingestPolicy {
    /// Keep old chunks; new chunks are added next to them.
    #[default]
    Append,
    /// Delete old chunks of the same document before adding.
    Replace,
}

impl ReingestPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "append" => Some(Self::Append),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Connection setup timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-read timeout in seconds; generation is slow, so this is much longer
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            retrieval_k: 8,
            reingest: ReingestPolicy::Append,
            max_concurrent_streams: 3,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// HTTP client carrying the dual timeout contract for every upstream call.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout())
            .read_timeout(self.read_timeout())
            .build()
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DOC_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("DOC_RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_CONNECT_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.connect_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LLM_READ_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.llm.read_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("DOC_RAG_RETRIEVAL_K") {
            if let Some(k) = parse_retrieval_k(&val) {
                config.retrieval_k = k;
            }
        }
        if let Ok(val) = std::env::var("DOC_RAG_REINGEST") {
            match ReingestPolicy::parse(&val) {
                Some(policy) => config.reingest = policy,
                None => tracing::warn!("Ignoring unknown DOC_RAG_REINGEST value: {val}"),
            }
        }
        if let Ok(val) = std::env::var("DOC_RAG_MAX_CONCURRENT_STREAMS") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_concurrent_streams = v.max(1);
            }
        }

        config
    }

    pub fn chunk_store_path(&self) -> PathBuf {
        self.data_dir.join("chunks.json")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

fn parse_retrieval_k(val: &str) -> Option<usize> {
    val.trim().parse::<usize>().ok().map(|k| k.clamp(1, MAX_RETRIEVAL_K))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_k_clamped() {
        assert_eq!(parse_retrieval_k("8"), Some(8));
        assert_eq!(parse_retrieval_k("0"), Some(1));
        assert_eq!(parse_retrieval_k(&usize::MAX.to_string()), Some(MAX_RETRIEVAL_K));
        assert_eq!(parse_retrieval_k("lots"), None);
    }

    #[test]
    fn test_reingest_policy_parse() {
        assert_eq!(ReingestPolicy::parse("append"), Some(ReingestPolicy::Append));
        assert_eq!(ReingestPolicy::parse(" Replace "), Some(ReingestPolicy::Replace));
        assert_eq!(ReingestPolicy::parse("merge"), None);
    }

    #[test]
    fn test_default_timeouts_distinguish_connect_and_read() {
        let llm = LlmConfig::default();
        assert!(llm.connect_timeout() < llm.read_timeout());
    }
}
