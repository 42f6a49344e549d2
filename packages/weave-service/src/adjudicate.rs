use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use weave_config::LlmProviderConfig;
use weave_domain::classify::clamp_confidence;
use weave_providers::{ChatMessage, PromptContent, PromptOptions};

use crate::{
	LlmProvider, PromptProvider, WeaveService, build_messages,
	extract::extract_json,
	types::{ArtifactCandidate, DeduplicationDecision, NewArtifact, NewRelationship, RelationshipCandidate},
};

pub(crate) const ARTIFACT_DEDUP_PROMPT: &str = "ArtifactDeduplicationReasoning";
pub(crate) const RELATIONSHIP_DEDUP_PROMPT: &str = "RelationshipDeduplicationReasoning";
pub(crate) const NO_HISTORY: &str = "No historical notes available";

const HISTORY_LIMIT: usize = 3;

const FALLBACK_SYSTEM: &str = "\
You decide whether a newly extracted item and an existing campaign item \
describe the same narrative entity. Weigh names, descriptions, and the \
narrative context. Respond with JSON only, in the shape \
{\"is_same\": boolean, \"confidence\": 0-100, \"reasoning\": string}.";

const FALLBACK_ARTIFACT_TEMPLATE: &str = "\
New artifact:
- name: {{new_name}}
- type: {{new_type}}
- description: {{new_description}}

Existing artifact:
- name: {{candidate_name}}
- type: {{candidate_type}}
- description: {{candidate_description}}

Source note:
{{note_content}}

Existing artifact's recent notes:
{{historical_notes}}";

const FALLBACK_RELATIONSHIP_TEMPLATE: &str = "\
New relationship:
- {{new_source}} --{{new_label}}--> {{new_target}}
- description: {{new_description}}

Existing relationship:
- {{candidate_source}} --{{candidate_label}}--> {{candidate_target}}
- description: {{candidate_description}}

Source note:
{{note_content}}

Existing relationship's recent notes:
{{historical_notes}}";

/// Everything a spawned adjudication task needs, detached from the service's
/// lifetime.
pub(crate) struct AdjudicationContext {
	pub llm: Arc<dyn LlmProvider>,
	pub prompts: Arc<dyn PromptProvider>,
	pub llm_cfg: LlmProviderConfig,
	pub note_content: String,
}

impl WeaveService {
	/// Renders up to three of the candidate's most-recent backing notes from
	/// the vector store's note points, newest first.
	pub(crate) async fn candidate_history(&self, collection: &str, note_ids: &[Uuid]) -> String {
		let mut notes = Vec::new();

		for note_id in note_ids {
			match self.vectors.get_payload(collection, *note_id).await {
				Ok(Some(payload)) => {
					let title =
						weave_storage::vectors::payload_string(&payload, "title");
					let content =
						weave_storage::vectors::payload_string(&payload, "content");

					if let (Some(title), Some(content)) = (title, content) {
						let created_at =
							weave_storage::vectors::payload_rfc3339(&payload, "created_at");

						notes.push((created_at, title, content));
					}
				},
				Ok(None) => {},
				Err(err) => {
					tracing::warn!(note_id = %note_id, error = %err, "Failed to fetch a historical note.");
				},
			}
		}

		if notes.is_empty() {
			return NO_HISTORY.to_string();
		}

		notes.sort_by(|a, b| b.0.cmp(&a.0));
		notes.truncate(HISTORY_LIMIT);

		notes
			.iter()
			.map(|(_, title, content)| format!("- {title}: {content}"))
			.collect::<Vec<_>>()
			.join("\n")
	}
}

pub(crate) async fn adjudicate_artifact(
	ctx: &AdjudicationContext,
	new: &NewArtifact,
	candidate: &ArtifactCandidate,
	history: &str,
) -> (DeduplicationDecision, u64) {
	let mut variables = Map::new();

	variables.insert("new_name".to_string(), Value::String(new.name.clone()));
	variables.insert("new_type".to_string(), Value::String(new.artifact_type.clone()));
	variables.insert("new_description".to_string(), Value::String(new.description.clone()));
	variables.insert("candidate_name".to_string(), Value::String(candidate.name.clone()));
	variables
		.insert("candidate_type".to_string(), Value::String(candidate.artifact_type.clone()));
	variables.insert(
		"candidate_description".to_string(),
		Value::String(candidate.description.clone()),
	);
	variables.insert("note_content".to_string(), Value::String(ctx.note_content.clone()));
	variables.insert("historical_notes".to_string(), Value::String(history.to_string()));

	run_adjudication(
		ctx,
		ARTIFACT_DEDUP_PROMPT,
		FALLBACK_ARTIFACT_TEMPLATE,
		variables,
		candidate.artifact_id,
		&candidate.name,
	)
	.await
}

pub(crate) async fn adjudicate_relationship(
	ctx: &AdjudicationContext,
	new: &NewRelationship,
	candidate: &RelationshipCandidate,
	history: &str,
) -> (DeduplicationDecision, u64) {
	let candidate_name = relationship_display_name(
		&candidate.source_name,
		&candidate.label,
		&candidate.target_name,
	);
	let mut variables = Map::new();

	variables.insert("new_source".to_string(), Value::String(new.source_name.clone()));
	variables.insert("new_label".to_string(), Value::String(new.label.clone()));
	variables.insert("new_target".to_string(), Value::String(new.target_name.clone()));
	variables.insert("new_description".to_string(), Value::String(new.description.clone()));
	variables
		.insert("candidate_source".to_string(), Value::String(candidate.source_name.clone()));
	variables.insert("candidate_label".to_string(), Value::String(candidate.label.clone()));
	variables
		.insert("candidate_target".to_string(), Value::String(candidate.target_name.clone()));
	variables.insert(
		"candidate_description".to_string(),
		Value::String(candidate.description.clone()),
	);
	variables.insert("note_content".to_string(), Value::String(ctx.note_content.clone()));
	variables.insert("historical_notes".to_string(), Value::String(history.to_string()));

	run_adjudication(
		ctx,
		RELATIONSHIP_DEDUP_PROMPT,
		FALLBACK_RELATIONSHIP_TEMPLATE,
		variables,
		candidate.relationship_id,
		&candidate_name,
	)
	.await
}

pub(crate) fn relationship_display_name(source: &str, label: &str, target: &str) -> String {
	format!("{source} --{label}--> {target}")
}

async fn run_adjudication(
	ctx: &AdjudicationContext,
	prompt_name: &str,
	fallback_template: &str,
	variables: Map<String, Value>,
	candidate_id: Uuid,
	candidate_name: &str,
) -> (DeduplicationDecision, u64) {
	let prompt = ctx
		.prompts
		.resolve(prompt_name, &variables, &PromptOptions::default())
		.await
		.unwrap_or_else(|| fallback_prompt(fallback_template, &variables));
	let messages = build_messages(prompt, &ctx.note_content);

	match ctx.llm.generate(&ctx.llm_cfg, &messages).await {
		Ok(response) => {
			let decision = parse_decision(&response.content, candidate_id, candidate_name);

			(decision, u64::from(response.tokens_used))
		},
		Err(err) => {
			tracing::warn!(candidate = candidate_name, error = %err, "Deduplication reasoning call failed.");

			(error_decision(candidate_id, candidate_name, "LLM error"), 0)
		},
	}
}

fn fallback_prompt(template: &str, variables: &Map<String, Value>) -> PromptContent {
	PromptContent::Chat(vec![
		ChatMessage::system(FALLBACK_SYSTEM),
		ChatMessage::user(weave_providers::prompts::interpolate_str(template, variables)),
	])
}

/// Malformed output degrades to a conservative "not the same" decision; the
/// pipeline never aborts on an adjudication failure.
pub(crate) fn parse_decision(
	content: &str,
	candidate_id: Uuid,
	candidate_name: &str,
) -> DeduplicationDecision {
	let Some(json) = extract_json(content) else {
		return error_decision(candidate_id, candidate_name, "Failed to parse response");
	};
	let Some(is_same) = json.get("is_same").and_then(Value::as_bool) else {
		return error_decision(candidate_id, candidate_name, "Failed to parse response");
	};
	let confidence = json
		.get("confidence")
		.and_then(|value| value.as_i64().or_else(|| value.as_f64().map(|v| v.round() as i64)))
		.map(clamp_confidence)
		.unwrap_or(0);
	let reasoning =
		json.get("reasoning").and_then(Value::as_str).unwrap_or_default().to_string();

	DeduplicationDecision {
		is_same,
		confidence,
		reasoning,
		candidate_id,
		candidate_name: candidate_name.to_string(),
	}
}

pub(crate) fn error_decision(
	candidate_id: Uuid,
	candidate_name: &str,
	reasoning: &str,
) -> DeduplicationDecision {
	DeduplicationDecision {
		is_same: false,
		confidence: 0,
		reasoning: reasoning.to_string(),
		candidate_id,
		candidate_name: candidate_name.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_well_formed_decision() {
		let id = Uuid::new_v4();
		let decision = parse_decision(
			r#"{"is_same": true, "confidence": 95, "reasoning": "Same captain."}"#,
			id,
			"Captain Vexa",
		);

		assert!(decision.is_same);
		assert_eq!(decision.confidence, 95);
		assert_eq!(decision.reasoning, "Same captain.");
		assert_eq!(decision.candidate_id, id);
	}

	#[test]
	fn clamps_out_of_range_confidence() {
		let decision = parse_decision(
			r#"{"is_same": true, "confidence": 250, "reasoning": "sure"}"#,
			Uuid::new_v4(),
			"x",
		);

		assert_eq!(decision.confidence, 100);

		let decision = parse_decision(
			r#"{"is_same": true, "confidence": -3, "reasoning": "sure"}"#,
			Uuid::new_v4(),
			"x",
		);

		assert_eq!(decision.confidence, 0);
	}

	#[test]
	fn accepts_fractional_confidence() {
		let decision = parse_decision(
			r#"{"is_same": true, "confidence": 87.6}"#,
			Uuid::new_v4(),
			"x",
		);

		assert_eq!(decision.confidence, 88);
		assert_eq!(decision.reasoning, "");
	}

	#[test]
	fn malformed_output_degrades_to_no_merge() {
		let decision = parse_decision("I think they are the same.", Uuid::new_v4(), "x");

		assert!(!decision.is_same);
		assert_eq!(decision.confidence, 0);
		assert_eq!(decision.reasoning, "Failed to parse response");
	}

	#[test]
	fn missing_is_same_degrades_to_no_merge() {
		let decision =
			parse_decision(r#"{"confidence": 90}"#, Uuid::new_v4(), "x");

		assert!(!decision.is_same);
		assert_eq!(decision.reasoning, "Failed to parse response");
	}
}
