pub mod embedding;
pub mod llm;
pub mod prompts;

mod error;

use std::time::Duration;

use reqwest::{
	StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

pub use embedding::EmbeddingBatch;
pub use error::{Error, Result};
pub use llm::{ChatMessage, LlmResponse};
pub use prompts::{PromptContent, PromptOptions, PromptRegistry};

pub(crate) const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1_000;

pub fn bearer_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// 5xx and timeouts are retried; everything else surfaces immediately.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
	status.is_server_error()
}

pub(crate) fn backoff_for_attempt(attempt: u32) -> Duration {
	let exp = attempt.saturating_sub(1).min(4);

	Duration::from_millis(BACKOFF_BASE_MS << exp)
}
