use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub dedup: Dedup,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
	pub prompts: PromptRegistryConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	#[serde(default = "default_provider_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_provider_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PromptRegistryConfig {
	pub host: String,
	pub public_key: String,
	pub secret_key: String,
	#[serde(default = "default_prompt_cache_ttl_ms")]
	pub cache_ttl_ms: u64,
	#[serde(default = "default_prompt_production_cache_ttl_ms")]
	pub production_cache_ttl_ms: u64,
	#[serde(default = "default_prompt_retries")]
	pub retries: u32,
	#[serde(default = "default_provider_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Dedup {
	#[serde(default = "default_candidate_limit")]
	pub candidate_limit: u32,
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
	#[serde(default = "default_auto_merge_threshold")]
	pub auto_merge_threshold: u8,
	#[serde(default = "default_session_ttl_seconds")]
	pub session_ttl_seconds: i64,
	#[serde(default = "default_sweep_interval_seconds")]
	pub sweep_interval_seconds: u64,
	#[serde(default = "default_max_inflight_llm_calls")]
	pub max_inflight_llm_calls: usize,
	#[serde(default = "default_workflow_timeout_ms")]
	pub workflow_timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
	30_000
}

fn default_prompt_cache_ttl_ms() -> u64 {
	60_000
}

fn default_prompt_production_cache_ttl_ms() -> u64 {
	360_000
}

fn default_prompt_retries() -> u32 {
	2
}

fn default_candidate_limit() -> u32 {
	5
}

fn default_similarity_threshold() -> f32 {
	0.80
}

fn default_auto_merge_threshold() -> u8 {
	90
}

fn default_session_ttl_seconds() -> i64 {
	900
}

fn default_sweep_interval_seconds() -> u64 {
	60
}

fn default_max_inflight_llm_calls() -> usize {
	4
}

fn default_workflow_timeout_ms() -> u64 {
	600_000
}
