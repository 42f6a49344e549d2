use std::collections::HashSet;

use serde_json::{Map, Value};

use weave_domain::sanitise;
use weave_providers::{PromptContent, PromptOptions};
use weave_storage::models::{Campaign, CampaignCategory};

use crate::{Result, WeaveService, WorkflowBudget, build_messages, types::Note};

pub(crate) const NAE_PROMPT: &str = "NarrativeArtefactExtractorV2";
pub(crate) const ARE_PROMPT: &str = "ArtifactRelationshipExtractor";

const FALLBACK_NAE_TEMPLATE: &str = "\
You extract narrative artifacts from tabletop-campaign notes.

Artifact categories for this campaign:
{{categories}}

Read the note below and list every distinct narrative artifact it mentions. \
Respond with JSON only, in the shape \
{\"artefacts\": [{\"name\": string, \"type\": string, \"description\": string}]}. \
Use the category names above as types.";

const FALLBACK_ARE_TEMPLATE: &str = "\
You extract directed relationships between narrative artifacts.

Artifacts extracted from the note:
{{artifacts}}

Read the note below and list every relationship between two of the artifacts \
above. Respond with JSON only, in the shape \
{\"relations\": [{\"source\": string, \"target\": string, \"label\": string, \
\"description\": string, \"reasoning\": string}]}. \
Use the artifact names exactly as given; the label is a short directional \
verb phrase.";

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedArtifact {
	pub name: String,
	pub artifact_type: String,
	pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedRelationship {
	pub source: String,
	pub target: String,
	pub label: String,
	pub description: String,
	pub reasoning: String,
}

#[derive(Debug)]
pub struct Extraction {
	pub artifacts: Vec<ExtractedArtifact>,
	pub relationships: Vec<ExtractedRelationship>,
	pub tokens_used: u64,
}

impl WeaveService {
	/// Two-stage extraction: narrative artifacts first, then relationships
	/// between them. A provider failure aborts; a malformed payload degrades
	/// to the lenient text parser.
	pub(crate) async fn extract_note(
		&self,
		campaign: &Campaign,
		note: &Note,
		budget: &WorkflowBudget,
	) -> Result<Extraction> {
		budget.ensure_remaining("artifact extraction")?;

		let categories = format_categories(&campaign.category_list());
		let mut variables = Map::new();

		variables.insert("categories".to_string(), Value::String(categories));

		let prompt = self
			.providers
			.prompts
			.resolve(NAE_PROMPT, &variables, &PromptOptions::default())
			.await
			.unwrap_or_else(|| fallback_prompt(FALLBACK_NAE_TEMPLATE, &variables));
		let messages = build_messages(prompt, &note.text());
		let response = self.providers.llm.generate(&self.cfg.providers.llm, &messages).await?;
		let mut tokens_used = u64::from(response.tokens_used);
		let artifacts = parse_artifacts(&response.content);

		if artifacts.is_empty() {
			return Ok(Extraction { artifacts, relationships: vec![], tokens_used });
		}

		budget.ensure_remaining("relationship extraction")?;

		let mut variables = Map::new();

		variables.insert("artifacts".to_string(), Value::String(format_artifacts(&artifacts)));

		let prompt = self
			.providers
			.prompts
			.resolve(ARE_PROMPT, &variables, &PromptOptions::default())
			.await
			.unwrap_or_else(|| fallback_prompt(FALLBACK_ARE_TEMPLATE, &variables));
		let messages = build_messages(prompt, &note.text());
		let response = self.providers.llm.generate(&self.cfg.providers.llm, &messages).await?;

		tokens_used += u64::from(response.tokens_used);

		let relationships = parse_relationships(&response.content, &artifacts);

		Ok(Extraction { artifacts, relationships, tokens_used })
	}
}

fn fallback_prompt(template: &str, variables: &Map<String, Value>) -> PromptContent {
	PromptContent::Text(weave_providers::prompts::interpolate_str(template, variables))
}

fn format_categories(categories: &[CampaignCategory]) -> String {
	categories
		.iter()
		.map(|category| format!("- {}: {}", category.name, category.description))
		.collect::<Vec<_>>()
		.join("\n")
}

fn format_artifacts(artifacts: &[ExtractedArtifact]) -> String {
	artifacts
		.iter()
		.map(|artifact| format!("- {} ({})", artifact.name, artifact.artifact_type))
		.collect::<Vec<_>>()
		.join("\n")
}

/// Locates the outermost JSON object (or a bare top-level array) in an LLM
/// response that may be wrapped in prose or code fences.
pub(crate) fn extract_json(content: &str) -> Option<Value> {
	let object = slice_between(content, '{', '}');
	let array = slice_between(content, '[', ']');
	let candidate = match (object, array) {
		(Some(object), Some(array)) =>
			if content.find('{') < content.find('[') {
				object
			} else {
				array
			},
		(Some(object), None) => object,
		(None, Some(array)) => array,
		(None, None) => return None,
	};

	serde_json::from_str(candidate).ok()
}

fn slice_between(content: &str, open: char, close: char) -> Option<&str> {
	let start = content.find(open)?;
	let end = content.rfind(close)?;

	if end <= start {
		return None;
	}

	Some(&content[start..=end])
}

fn parse_artifacts(content: &str) -> Vec<ExtractedArtifact> {
	let Some(json) = extract_json(content) else {
		tracing::warn!("Artifact extraction output is not JSON; using the lenient parser.");

		return lenient_artifacts(content);
	};
	let Some(items) = artifact_items(&json) else {
		tracing::warn!("Artifact extraction output has no artifact list; using the lenient parser.");

		return lenient_artifacts(content);
	};
	let mut artifacts = Vec::with_capacity(items.len());
	let mut seen = HashSet::new();

	for item in items {
		let Some(name) = item.get("name").and_then(Value::as_str) else {
			tracing::warn!("Dropping extracted artifact without a name.");

			continue;
		};
		let name = name.trim();

		if name.is_empty() || !seen.insert(name.to_string()) {
			continue;
		}

		let artifact_type = sanitise::artifact_type(
			item.get("type").and_then(Value::as_str).unwrap_or_default(),
		);
		let description =
			item.get("description").and_then(Value::as_str).unwrap_or_default().trim().to_string();

		artifacts.push(ExtractedArtifact { name: name.to_string(), artifact_type, description });
	}

	artifacts
}

fn artifact_items(json: &Value) -> Option<&Vec<Value>> {
	if let Some(items) = json.get("artefacts").and_then(Value::as_array) {
		return Some(items);
	}
	if let Some(items) = json.get("artifacts").and_then(Value::as_array) {
		return Some(items);
	}

	json.as_array()
}

/// Last-resort parser for non-JSON output: each bulleted line becomes an
/// artifact of type `unknown`.
fn lenient_artifacts(content: &str) -> Vec<ExtractedArtifact> {
	let mut artifacts = Vec::new();
	let mut seen = HashSet::new();

	for line in content.lines() {
		let trimmed = line.trim();
		let Some(name) = trimmed
			.strip_prefix("- ")
			.or_else(|| trimmed.strip_prefix("* "))
			.or_else(|| trimmed.strip_prefix("\u{2022} "))
		else {
			continue;
		};
		let name = name.trim();

		if name.is_empty() || !seen.insert(name.to_string()) {
			continue;
		}

		artifacts.push(ExtractedArtifact {
			name: name.to_string(),
			artifact_type: "unknown".to_string(),
			description: String::new(),
		});
	}

	artifacts
}

fn parse_relationships(
	content: &str,
	artifacts: &[ExtractedArtifact],
) -> Vec<ExtractedRelationship> {
	let Some(json) = extract_json(content) else {
		tracing::warn!("Relationship extraction output is not JSON; dropping the stage.");

		return vec![];
	};
	let Some(items) = relation_items(&json) else {
		tracing::warn!("Relationship extraction output has no relation list; dropping the stage.");

		return vec![];
	};
	let names: HashSet<&str> = artifacts.iter().map(|artifact| artifact.name.as_str()).collect();
	let mut relationships = Vec::with_capacity(items.len());

	for item in items {
		let source = item.get("source").and_then(Value::as_str).unwrap_or_default().trim();
		let target = item.get("target").and_then(Value::as_str).unwrap_or_default().trim();
		let label = item.get("label").and_then(Value::as_str).unwrap_or_default().trim();

		if source.is_empty() || target.is_empty() || label.is_empty() {
			tracing::warn!("Dropping relationship with missing fields.");

			continue;
		}
		if source == target {
			tracing::warn!(source, "Dropping self-referential relationship.");

			continue;
		}
		// Endpoint names must match stage-one artifacts exactly.
		if !names.contains(source) || !names.contains(target) {
			tracing::warn!(source, target, "Dropping relationship with unknown endpoints.");

			continue;
		}

		relationships.push(ExtractedRelationship {
			source: source.to_string(),
			target: target.to_string(),
			label: label.to_string(),
			description: item
				.get("description")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.trim()
				.to_string(),
			reasoning: item
				.get("reasoning")
				.and_then(Value::as_str)
				.unwrap_or_default()
				.trim()
				.to_string(),
		});
	}

	relationships
}

fn relation_items(json: &Value) -> Option<&Vec<Value>> {
	if let Some(items) = json.get("relations").and_then(Value::as_array) {
		return Some(items);
	}
	if let Some(items) = json.get("relationships").and_then(Value::as_array) {
		return Some(items);
	}

	json.as_array()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn artifact(name: &str) -> ExtractedArtifact {
		ExtractedArtifact {
			name: name.to_string(),
			artifact_type: "characters".to_string(),
			description: String::new(),
		}
	}

	#[test]
	fn parses_artefacts_object() {
		let content = r#"Here you go:
{"artefacts": [
	{"name": "Captain Vexa", "type": "Characters", "description": "A pirate captain."},
	{"name": "Redfern Mill", "type": "locations"}
]}"#;
		let artifacts = parse_artifacts(content);

		assert_eq!(artifacts.len(), 2);
		assert_eq!(artifacts[0].name, "Captain Vexa");
		assert_eq!(artifacts[0].artifact_type, "characters");
		assert_eq!(artifacts[1].description, "");
	}

	#[test]
	fn parses_top_level_array() {
		let content = r#"[{"name": "Redfern Mill", "type": "locations"}]"#;
		let artifacts = parse_artifacts(content);

		assert_eq!(artifacts.len(), 1);
		assert_eq!(artifacts[0].name, "Redfern Mill");
	}

	#[test]
	fn falls_back_to_bulleted_lines() {
		let content = "I could not produce JSON, but the artifacts are:\n- Captain Vexa\n* Redfern Mill\n- Captain Vexa\n";
		let artifacts = parse_artifacts(content);

		assert_eq!(artifacts.len(), 2);
		assert_eq!(artifacts[0].artifact_type, "unknown");
	}

	#[test]
	fn drops_artifacts_without_names() {
		let content = r#"{"artefacts": [{"type": "characters"}, {"name": "  "}, {"name": "Vexa"}]}"#;
		let artifacts = parse_artifacts(content);

		assert_eq!(artifacts.len(), 1);
		assert_eq!(artifacts[0].name, "Vexa");
	}

	#[test]
	fn validates_relationship_endpoints_case_sensitively() {
		let artifacts = vec![artifact("Captain Vexa"), artifact("Redfern Mill")];
		let content = r#"{"relations": [
			{"source": "Captain Vexa", "target": "Redfern Mill", "label": "attacked"},
			{"source": "captain vexa", "target": "Redfern Mill", "label": "attacked"},
			{"source": "Captain Vexa", "target": "Captain Vexa", "label": "knows"},
			{"source": "Captain Vexa", "target": "The Keep", "label": "visited"}
		]}"#;
		let relationships = parse_relationships(content, &artifacts);

		assert_eq!(relationships.len(), 1);
		assert_eq!(relationships[0].label, "attacked");
	}

	#[test]
	fn accepts_relationships_key_alias() {
		let artifacts = vec![artifact("A"), artifact("B")];
		let content = r#"{"relationships": [{"source": "A", "target": "B", "label": "knows"}]}"#;
		let relationships = parse_relationships(content, &artifacts);

		assert_eq!(relationships.len(), 1);
	}

	#[test]
	fn extract_json_prefers_the_first_structure() {
		let content = r#"{"artefacts": []} trailing [1, 2]"#;
		let json = extract_json(content).expect("Expected JSON.");

		assert!(json.get("artefacts").is_some());
	}
}
