use std::{sync::Arc, time::Instant};

use tokio::task::JoinSet;
use uuid::Uuid;

use weave_domain::classify;
use weave_storage::{models::Campaign, vectors::VectorStore};

use crate::{
	Result, WeaveService, WorkflowBudget,
	adjudicate::{self, AdjudicationContext},
	extract::Extraction,
	types::{
		ArtifactCandidate, ArtifactMatch, DeduplicationDecision, DeduplicationResult, NewArtifact,
		NewRelationship, Note, RelationshipCandidate, RelationshipMatch,
	},
};

impl WeaveService {
	/// Phase 1 (candidate search) then phase 2 (LLM adjudication) for every
	/// extracted item, classifying each as new, auto-merge, or
	/// needs-confirmation.
	pub(crate) async fn deduplicate(
		&self,
		campaign: &Campaign,
		note: &Note,
		extraction: Extraction,
		budget: &WorkflowBudget,
	) -> Result<DeduplicationResult> {
		let total_started = Instant::now();
		let mut tokens_used = extraction.tokens_used;

		budget.ensure_remaining("candidate search")?;

		let phase1_started = Instant::now();
		let mut artifact_inputs = Vec::with_capacity(extraction.artifacts.len());

		for extracted in extraction.artifacts {
			let artifact = NewArtifact {
				artifact_id: Uuid::new_v4(),
				name: extracted.name,
				artifact_type: extracted.artifact_type,
				description: extracted.description,
				note_ids: vec![note.note_id],
			};
			let (candidates, tokens) = self.find_artifact_candidates(campaign, &artifact).await?;

			tokens_used += tokens;
			artifact_inputs.push((artifact, candidates));
		}

		let mut relationship_inputs = Vec::with_capacity(extraction.relationships.len());

		for extracted in extraction.relationships {
			let relationship = NewRelationship {
				relationship_id: Uuid::new_v4(),
				source_name: extracted.source,
				target_name: extracted.target,
				label: extracted.label,
				description: extracted.description,
				reasoning: extracted.reasoning,
				note_ids: vec![note.note_id],
			};
			let (candidates, tokens) =
				self.find_relationship_candidates(campaign, &relationship).await?;

			tokens_used += tokens;
			relationship_inputs.push((relationship, candidates));
		}

		let phase1_ms = phase1_started.elapsed().as_millis() as u64;

		budget.ensure_remaining("deduplication reasoning")?;

		let phase2_started = Instant::now();
		let collection = VectorStore::collection_name(campaign.campaign_uuid);
		let ctx = Arc::new(AdjudicationContext {
			llm: self.providers.llm.clone(),
			prompts: self.providers.prompts.clone(),
			llm_cfg: self.cfg.providers.llm.clone(),
			note_content: note.content.clone(),
		});
		let mut result = DeduplicationResult::default();

		for (artifact, candidates) in artifact_inputs {
			// An empty candidate set short-circuits phase 2 for this item.
			if candidates.is_empty() {
				result.new_artifacts.push(artifact);

				continue;
			}

			let (decisions, tokens) =
				self.adjudicate_artifact_candidates(&ctx, &collection, &artifact, candidates).await;

			tokens_used += tokens;

			match best_match(decisions) {
				Some(decision) => {
					let class = classify::classify(
						true,
						decision.confidence,
						self.cfg.dedup.auto_merge_threshold,
					);

					result.artifact_decisions.push(ArtifactMatch { artifact, decision, class });
				},
				None => result.new_artifacts.push(artifact),
			}
		}

		for (relationship, candidates) in relationship_inputs {
			if candidates.is_empty() {
				result.new_relationships.push(relationship);

				continue;
			}

			let (decisions, tokens) = self
				.adjudicate_relationship_candidates(&ctx, &collection, &relationship, candidates)
				.await;

			tokens_used += tokens;

			match best_match(decisions) {
				Some(decision) => {
					let class = classify::classify(
						true,
						decision.confidence,
						self.cfg.dedup.auto_merge_threshold,
					);

					result.relationship_decisions.push(RelationshipMatch {
						relationship,
						decision,
						class,
					});
				},
				None => result.new_relationships.push(relationship),
			}
		}

		result.phase1_ms = phase1_ms;
		result.phase2_ms = phase2_started.elapsed().as_millis() as u64;
		result.total_ms = total_started.elapsed().as_millis() as u64;
		result.tokens_used = tokens_used;

		Ok(result)
	}

	/// Fans candidate adjudications out on a JoinSet, bounded by the
	/// in-flight LLM permit pool.
	async fn adjudicate_artifact_candidates(
		&self,
		ctx: &Arc<AdjudicationContext>,
		collection: &str,
		artifact: &NewArtifact,
		candidates: Vec<ArtifactCandidate>,
	) -> (Vec<DeduplicationDecision>, u64) {
		let mut set = JoinSet::new();

		for candidate in candidates {
			let history = self.candidate_history(collection, &candidate.note_ids).await;
			let ctx = ctx.clone();
			let artifact = artifact.clone();
			let permits = self.llm_permits.clone();

			set.spawn(async move {
				let _permit = permits.acquire_owned().await.ok();

				adjudicate::adjudicate_artifact(&ctx, &artifact, &candidate, &history).await
			});
		}

		collect_decisions(set).await
	}

	async fn adjudicate_relationship_candidates(
		&self,
		ctx: &Arc<AdjudicationContext>,
		collection: &str,
		relationship: &NewRelationship,
		candidates: Vec<RelationshipCandidate>,
	) -> (Vec<DeduplicationDecision>, u64) {
		let mut set = JoinSet::new();

		for candidate in candidates {
			let history = self.candidate_history(collection, &candidate.note_ids).await;
			let ctx = ctx.clone();
			let relationship = relationship.clone();
			let permits = self.llm_permits.clone();

			set.spawn(async move {
				let _permit = permits.acquire_owned().await.ok();

				adjudicate::adjudicate_relationship(&ctx, &relationship, &candidate, &history)
					.await
			});
		}

		collect_decisions(set).await
	}
}

async fn collect_decisions(
	mut set: JoinSet<(DeduplicationDecision, u64)>,
) -> (Vec<DeduplicationDecision>, u64) {
	let mut decisions = Vec::new();
	let mut tokens = 0;

	while let Some(joined) = set.join_next().await {
		match joined {
			Ok((decision, decision_tokens)) => {
				tokens += decision_tokens;
				decisions.push(decision);
			},
			Err(err) => {
				tracing::warn!(error = %err, "Deduplication reasoning task failed.");
			},
		}
	}

	(decisions, tokens)
}

/// The item's outcome is the highest-confidence `is_same` decision, or none.
pub(crate) fn best_match(decisions: Vec<DeduplicationDecision>) -> Option<DeduplicationDecision> {
	decisions.into_iter().filter(|decision| decision.is_same).max_by_key(|decision| decision.confidence)
}

#[cfg(test)]
mod tests {
	use weave_domain::classify::DedupClass;

	use super::*;

	fn decision(is_same: bool, confidence: u8, name: &str) -> DeduplicationDecision {
		DeduplicationDecision {
			is_same,
			confidence,
			reasoning: String::new(),
			candidate_id: Uuid::new_v4(),
			candidate_name: name.to_string(),
		}
	}

	#[test]
	fn best_match_picks_highest_confidence_same() {
		let picked = best_match(vec![
			decision(true, 70, "a"),
			decision(false, 99, "b"),
			decision(true, 92, "c"),
		])
		.expect("Expected a match.");

		assert_eq!(picked.candidate_name, "c");
		assert_eq!(picked.confidence, 92);
	}

	#[test]
	fn best_match_ignores_non_same_decisions() {
		assert!(best_match(vec![decision(false, 99, "a"), decision(false, 50, "b")]).is_none());
	}

	#[test]
	fn best_match_of_empty_is_none() {
		assert!(best_match(vec![]).is_none());
	}

	#[test]
	fn classification_matches_threshold_semantics() {
		assert_eq!(classify::classify(true, 95, 90), DedupClass::AutoMerge);
		assert_eq!(classify::classify(true, 72, 90), DedupClass::NeedsConfirmation);
	}
}
