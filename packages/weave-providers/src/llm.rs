use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: "system".to_string(), content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: "user".to_string(), content: content.into() }
	}
}

#[derive(Clone, Debug)]
pub struct LlmResponse {
	pub content: String,
	pub model: String,
	pub input_tokens: u32,
	pub output_tokens: u32,
	pub tokens_used: u32,
	pub duration_ms: u64,
}

pub async fn generate(
	cfg: &weave_config::LlmProviderConfig,
	messages: &[ChatMessage],
) -> Result<LlmResponse> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let started = Instant::now();
	let mut last_err = None;

	for attempt in 1..=crate::MAX_ATTEMPTS {
		if attempt > 1 {
			tokio::time::sleep(crate::backoff_for_attempt(attempt - 1)).await;
		}

		let sent = client
			.post(&url)
			.headers(crate::bearer_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
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

		return parse_chat_response(json, started.elapsed().as_millis() as u64);
	}

	Err(last_err.unwrap_or_else(|| Error::InvalidResponse {
		message: "LLM provider exhausted all attempts.".to_string(),
	}))
}

fn parse_chat_response(json: Value, duration_ms: u64) -> Result<LlmResponse> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Chat response is missing message content.".to_string(),
		})?
		.to_string();
	let model = json.get("model").and_then(|v| v.as_str()).unwrap_or_default().to_string();
	let usage = json.get("usage");
	let input_tokens = usage
		.and_then(|u| u.get("prompt_tokens"))
		.and_then(|v| v.as_u64())
		.unwrap_or(0) as u32;
	let output_tokens = usage
		.and_then(|u| u.get("completion_tokens"))
		.and_then(|v| v.as_u64())
		.unwrap_or(0) as u32;
	let tokens_used = usage
		.and_then(|u| u.get("total_tokens"))
		.and_then(|v| v.as_u64())
		.unwrap_or(u64::from(input_tokens + output_tokens)) as u32;

	Ok(LlmResponse { content, model, input_tokens, output_tokens, tokens_used, duration_ms })
}
