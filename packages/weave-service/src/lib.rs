pub mod confirm;
pub mod ingest;
pub mod notes;
pub mod sessions;
pub mod tracer;
pub mod types;

mod adjudicate;
mod candidates;
mod dedup;
mod error;
mod extract;
mod merge;

pub use self::{
	confirm::ConfirmDeduplicationRequest,
	error::{Error, Result},
	ingest::{NoteCreateRequest, NoteCreateResponse},
	notes::NoteDto,
	sessions::{PendingDedupSession, SessionStore},
	types::{
		ArtifactCandidate, ArtifactMatch, DeduplicationDecision, DeduplicationResult, ItemKind,
		MergeProposal, NewArtifact, NewRelationship, Note, PointType, RelationshipCandidate,
		RelationshipMatch,
	},
};

use std::{
	collections::HashMap,
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use uuid::Uuid;

use weave_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, PromptRegistryConfig};
use weave_providers::{
	ChatMessage, EmbeddingBatch, LlmResponse, PromptContent, PromptOptions, PromptRegistry,
	embedding, llm,
};
use weave_storage::{campaigns, db::Db, models::Campaign, vectors::VectorStore};

use crate::tracer::{NoopTracer, Tracer};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>>;
}

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<LlmResponse>>;
}

pub trait PromptProvider
where
	Self: Send + Sync,
{
	fn resolve<'a>(
		&'a self,
		name: &'a str,
		variables: &'a Map<String, Value>,
		options: &'a PromptOptions,
	) -> BoxFuture<'a, Option<PromptContent>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub llm: Arc<dyn LlmProvider>,
	pub prompts: Arc<dyn PromptProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		llm: Arc<dyn LlmProvider>,
		prompts: Arc<dyn PromptProvider>,
	) -> Self {
		Self { embedding, llm, prompts }
	}

	pub fn live(prompts_cfg: PromptRegistryConfig) -> Result<Self> {
		let registry = PromptRegistry::new(prompts_cfg)
			.map_err(|err| Error::Provider { message: err.to_string() })?;
		let live = Arc::new(LiveProviders);

		Ok(Self {
			embedding: live.clone(),
			llm: live,
			prompts: Arc::new(LivePrompts { registry }),
		})
	}
}

pub struct WeaveService {
	pub cfg: Config,
	pub db: Db,
	pub vectors: VectorStore,
	pub providers: Providers,
	pub sessions: SessionStore,
	pub(crate) llm_permits: Arc<Semaphore>,
	pub(crate) commit_locks: CampaignLocks,
	pub(crate) tracer: Arc<dyn Tracer>,
}
impl WeaveService {
	pub fn new(cfg: Config, db: Db, vectors: VectorStore) -> Result<Self> {
		let providers = Providers::live(cfg.providers.prompts.clone())?;

		Ok(Self::with_providers(cfg, db, vectors, providers))
	}

	pub fn with_providers(cfg: Config, db: Db, vectors: VectorStore, providers: Providers) -> Self {
		let llm_permits = Arc::new(Semaphore::new(cfg.dedup.max_inflight_llm_calls));

		Self {
			cfg,
			db,
			vectors,
			providers,
			sessions: SessionStore::new(),
			llm_permits,
			commit_locks: CampaignLocks::default(),
			tracer: Arc::new(NoopTracer),
		}
	}

	pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
		self.tracer = tracer;

		self
	}

	pub(crate) async fn fetch_campaign(&self, campaign_uuid: Uuid) -> Result<Campaign> {
		campaigns::fetch_campaign(&self.db.pool, campaign_uuid)
			.await?
			.ok_or(Error::CampaignNotFound { campaign_uuid })
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<(Vec<f32>, u64)> {
		let texts = [text.to_string()];
		let batch =
			self.providers.embedding.embed(&self.cfg.providers.embedding, &texts).await?;
		let tokens = u64::from(batch.tokens_used);
		let Some(vector) = batch.vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok((vector, tokens))
	}
}

/// Per-campaign commit locks. Graph writes are idempotent upserts keyed by
/// name, so this is a write-skew policy, not a correctness requirement: two
/// concurrent ingests discovering the same new artifact commit one at a time.
#[derive(Default)]
pub(crate) struct CampaignLocks {
	inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}
impl CampaignLocks {
	pub(crate) fn lock_for(&self, campaign_uuid: Uuid) -> Arc<tokio::sync::Mutex<()>> {
		let mut locks = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		locks.entry(campaign_uuid).or_default().clone()
	}
}

/// Wall-clock budget for one ingest; checked between pipeline stages.
pub(crate) struct WorkflowBudget {
	started: Instant,
	limit: Duration,
}
impl WorkflowBudget {
	pub(crate) fn new(limit_ms: u64) -> Self {
		Self { started: Instant::now(), limit: Duration::from_millis(limit_ms) }
	}

	pub(crate) fn ensure_remaining(&self, stage: &'static str) -> Result<()> {
		if self.started.elapsed() >= self.limit {
			return Err(Error::WorkflowTimeout { stage });
		}

		Ok(())
	}
}

pub(crate) fn artifact_embed_text(name: &str, artifact_type: &str, description: &str) -> String {
	if description.trim().is_empty() {
		return format!("{name} ({artifact_type})");
	}

	format!("{name} ({artifact_type}): {description}")
}

pub(crate) fn relationship_embed_text(
	source_name: &str,
	label: &str,
	target_name: &str,
	description: &str,
) -> String {
	if description.trim().is_empty() {
		return format!("{source_name} {label} {target_name}");
	}

	format!("{source_name} {label} {target_name}: {description}")
}

/// Chat prompts keep their message list (first message is the system turn).
/// Text prompts collapse to a single system message with the input appended.
pub(crate) fn build_messages(content: PromptContent, input: &str) -> Vec<ChatMessage> {
	match content {
		PromptContent::Text(text) => vec![ChatMessage::system(format!("{text}\n\n{input}"))],
		PromptContent::Chat(messages) => messages,
	}
}

struct LiveProviders;
impl EmbeddingProvider for LiveProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<EmbeddingBatch>> {
		Box::pin(async move {
			embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::Provider { message: err.to_string() })
		})
	}
}

impl LlmProvider for LiveProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, Result<LlmResponse>> {
		Box::pin(async move {
			llm::generate(cfg, messages)
				.await
				.map_err(|err| Error::Provider { message: err.to_string() })
		})
	}
}

struct LivePrompts {
	registry: PromptRegistry,
}
impl PromptProvider for LivePrompts {
	fn resolve<'a>(
		&'a self,
		name: &'a str,
		variables: &'a Map<String, Value>,
		options: &'a PromptOptions,
	) -> BoxFuture<'a, Option<PromptContent>> {
		Box::pin(async move { self.registry.resolve(name, variables, options).await })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exhausted_budget_fails_with_the_stage_name() {
		let budget = WorkflowBudget::new(0);
		let err = budget
			.ensure_remaining("artifact extraction")
			.expect_err("Expected a timeout error.");

		assert!(matches!(err, Error::WorkflowTimeout { stage: "artifact extraction" }));
	}

	#[test]
	fn campaign_locks_hand_out_one_lock_per_campaign() {
		let locks = CampaignLocks::default();
		let campaign = Uuid::new_v4();
		let first = locks.lock_for(campaign);
		let second = locks.lock_for(campaign);
		let other = locks.lock_for(Uuid::new_v4());

		assert!(Arc::ptr_eq(&first, &second));
		assert!(!Arc::ptr_eq(&first, &other));
	}

	#[test]
	fn embed_texts_skip_empty_descriptions() {
		assert_eq!(artifact_embed_text("Vexa", "characters", ""), "Vexa (characters)");
		assert_eq!(
			artifact_embed_text("Vexa", "characters", "A pirate captain."),
			"Vexa (characters): A pirate captain."
		);
		assert_eq!(
			relationship_embed_text("Vexa", "attacked", "Redfern Mill", ""),
			"Vexa attacked Redfern Mill"
		);
	}

	#[test]
	fn text_prompts_collapse_to_one_system_message() {
		let messages =
			build_messages(PromptContent::Text("Extract artifacts.".to_string()), "The note.");

		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].role, "system");
		assert_eq!(messages[0].content, "Extract artifacts.\n\nThe note.");
	}

	#[test]
	fn chat_prompts_pass_through() {
		let chat = PromptContent::Chat(vec![
			ChatMessage::system("You compare artifacts."),
			ChatMessage::user("details"),
		]);
		let messages = build_messages(chat, "ignored");

		assert_eq!(messages.len(), 2);
		assert_eq!(messages[1].content, "details");
	}
}
