use std::{
	collections::HashMap,
	sync::Arc,
	time::{Duration, Instant},
};

use reqwest::Client;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{Error, Result, llm::ChatMessage};

pub const PRODUCTION_LABEL: &str = "production";

#[derive(Clone, Debug, PartialEq)]
pub enum PromptContent {
	Text(String),
	Chat(Vec<ChatMessage>),
}

#[derive(Clone, Debug, Default)]
pub struct PromptOptions {
	pub version: Option<u32>,
	pub label: Option<String>,
}

#[derive(Default)]
struct CacheSlot {
	cached: Option<(PromptContent, Instant)>,
}

/// Remote prompt-registry client with an in-process TTL cache. Callers must
/// carry a built-in fallback prompt: a miss plus an upstream failure resolves
/// to `None`.
pub struct PromptRegistry {
	cfg: weave_config::PromptRegistryConfig,
	client: Client,
	slots: Mutex<HashMap<String, Arc<Mutex<CacheSlot>>>>,
}
impl PromptRegistry {
	pub fn new(cfg: weave_config::PromptRegistryConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { cfg, client, slots: Mutex::new(HashMap::new()) })
	}

	pub async fn resolve(
		&self,
		name: &str,
		variables: &Map<String, Value>,
		options: &PromptOptions,
	) -> Option<PromptContent> {
		let slot = self.slot(&cache_key(name, options)).await;
		// Concurrent resolves of the same key queue on the slot lock, so at
		// most one upstream fetch per key is in flight.
		let mut slot = slot.lock().await;
		let ttl = self.ttl_for(options);
		let cached = match slot.cached.as_ref() {
			Some((content, fetched_at)) if fetched_at.elapsed() < ttl => Some(content.clone()),
			_ => None,
		};
		let content = match cached {
			Some(content) => content,
			None => match self.fetch(name, options).await {
				Ok(content) => {
					slot.cached = Some((content.clone(), Instant::now()));

					content
				},
				Err(err) => {
					tracing::warn!(prompt = name, error = %err, "Prompt registry fetch failed.");

					return None;
				},
			},
		};

		Some(interpolate(name, &content, variables))
	}

	async fn slot(&self, key: &str) -> Arc<Mutex<CacheSlot>> {
		let mut slots = self.slots.lock().await;

		slots.entry(key.to_string()).or_default().clone()
	}

	fn ttl_for(&self, options: &PromptOptions) -> Duration {
		if options.label.as_deref() == Some(PRODUCTION_LABEL) {
			return Duration::from_millis(self.cfg.production_cache_ttl_ms);
		}

		Duration::from_millis(self.cfg.cache_ttl_ms)
	}

	async fn fetch(&self, name: &str, options: &PromptOptions) -> Result<PromptContent> {
		let url = format!("{}/api/public/v2/prompts/{name}", self.cfg.host);
		let mut query: Vec<(&str, String)> = Vec::new();

		if let Some(version) = options.version {
			query.push(("version", version.to_string()));
		} else if let Some(label) = options.label.as_ref() {
			query.push(("label", label.clone()));
		}

		let mut last_err = None;

		for attempt in 0..=self.cfg.retries {
			if attempt > 0 {
				tokio::time::sleep(crate::backoff_for_attempt(attempt)).await;
			}

			let sent = self
				.client
				.get(&url)
				.query(&query)
				.basic_auth(&self.cfg.public_key, Some(&self.cfg.secret_key))
				.send()
				.await;
			let res = match sent {
				Ok(res) => res,
				Err(err) => {
					last_err = Some(Error::Reqwest(err));

					continue;
				},
			};
			let status = res.status();

			if crate::is_retryable_status(status) {
				last_err = Some(Error::Status {
					status: status.as_u16(),
					message: res.text().await.unwrap_or_default(),
				});

				continue;
			}
			if !status.is_success() {
				return Err(Error::Status {
					status: status.as_u16(),
					message: res.text().await.unwrap_or_default(),
				});
			}

			let json: Value = res.json().await?;

			return parse_prompt_payload(json);
		}

		Err(last_err.unwrap_or_else(|| Error::InvalidResponse {
			message: "Prompt registry exhausted all attempts.".to_string(),
		}))
	}
}

fn cache_key(name: &str, options: &PromptOptions) -> String {
	match (options.version, options.label.as_deref()) {
		(Some(version), _) => format!("{name}@v{version}"),
		(None, Some(label)) => format!("{name}@{label}"),
		(None, None) => format!("{name}@latest"),
	}
}

fn parse_prompt_payload(json: Value) -> Result<PromptContent> {
	let prompt = json.get("prompt").unwrap_or(&json);

	match json.get("type").and_then(|v| v.as_str()) {
		Some("chat") => parse_chat_prompt(prompt),
		Some("text") => parse_text_prompt(prompt),
		// Untyped payloads are inferred from the prompt value's shape.
		_ =>
			if prompt.is_array() {
				parse_chat_prompt(prompt)
			} else {
				parse_text_prompt(prompt)
			},
	}
}

fn parse_text_prompt(prompt: &Value) -> Result<PromptContent> {
	let text = prompt.as_str().ok_or_else(|| Error::InvalidResponse {
		message: "Text prompt payload is not a string.".to_string(),
	})?;

	Ok(PromptContent::Text(text.to_string()))
}

fn parse_chat_prompt(prompt: &Value) -> Result<PromptContent> {
	let items = prompt.as_array().ok_or_else(|| Error::InvalidResponse {
		message: "Chat prompt payload is not an array.".to_string(),
	})?;
	let mut messages = Vec::with_capacity(items.len());

	for item in items {
		let role = item.get("role").and_then(|v| v.as_str()).ok_or_else(|| {
			Error::InvalidResponse { message: "Chat prompt message missing role.".to_string() }
		})?;
		let content = item.get("content").and_then(|v| v.as_str()).ok_or_else(|| {
			Error::InvalidResponse { message: "Chat prompt message missing content.".to_string() }
		})?;

		messages.push(ChatMessage { role: role.to_string(), content: content.to_string() });
	}

	if messages.is_empty() {
		return Err(Error::InvalidResponse {
			message: "Chat prompt payload has no messages.".to_string(),
		});
	}

	Ok(PromptContent::Chat(messages))
}

/// `{{key}}` interpolation. Unresolved placeholders are left intact for the
/// caller to see.
pub fn interpolate_str(template: &str, variables: &Map<String, Value>) -> String {
	let mut out = template.to_string();

	for (key, value) in variables {
		let placeholder = format!("{{{{{key}}}}}");
		let replacement = match value {
			Value::String(text) => text.clone(),
			other => other.to_string(),
		};

		out = out.replace(&placeholder, &replacement);
	}

	out
}

fn interpolate(name: &str, content: &PromptContent, variables: &Map<String, Value>) -> PromptContent {
	let interpolated = match content {
		PromptContent::Text(text) => PromptContent::Text(interpolate_str(text, variables)),
		PromptContent::Chat(messages) => PromptContent::Chat(
			messages
				.iter()
				.map(|message| ChatMessage {
					role: message.role.clone(),
					content: interpolate_str(&message.content, variables),
				})
				.collect(),
		),
	};
	let leftover = match &interpolated {
		PromptContent::Text(text) => text.contains("{{"),
		PromptContent::Chat(messages) =>
			messages.iter().any(|message| message.content.contains("{{")),
	};

	if leftover {
		tracing::warn!(prompt = name, "Prompt contains unresolved placeholders.");
	}

	interpolated
}
