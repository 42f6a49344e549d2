use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct EmbeddingBatch {
	pub vectors: Vec<Vec<f32>>,
	pub tokens_used: u32,
}

pub async fn embed(
	cfg: &weave_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<EmbeddingBatch> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
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

		return parse_embedding_response(json);
	}

	Err(last_err.unwrap_or_else(|| Error::InvalidResponse {
		message: "Embedding provider exhausted all attempts.".to_string(),
	}))
}

fn parse_embedding_response(json: Value) -> Result<EmbeddingBatch> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse {
				message: "Embedding item missing embedding array.".to_string(),
			}
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		normalise(&mut vec);
		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	let tokens_used = json
		.get("usage")
		.and_then(|usage| usage.get("total_tokens").or_else(|| usage.get("prompt_tokens")))
		.and_then(|v| v.as_u64())
		.unwrap_or(0) as u32;

	Ok(EmbeddingBatch { vectors: indexed.into_iter().map(|(_, vec)| vec).collect(), tokens_used })
}

/// Providers are contracted to return unit-norm vectors; this guards against
/// the ones that do not.
fn normalise(vec: &mut [f32]) {
	let norm = vec.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > f32::EPSILON {
		for value in vec.iter_mut() {
			*value /= norm;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [0.0, 1.0] },
				{ "index": 0, "embedding": [1.0, 0.0] }
			],
			"usage": { "total_tokens": 12 }
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed.vectors.len(), 2);
		assert_eq!(parsed.vectors[0], vec![1.0, 0.0]);
		assert_eq!(parsed.vectors[1], vec![0.0, 1.0]);
		assert_eq!(parsed.tokens_used, 12);
	}

	#[test]
	fn normalises_to_unit_length() {
		let json = serde_json::json!({
			"data": [
				{ "index": 0, "embedding": [3.0, 4.0] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");
		let norm = parsed.vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();

		assert!((norm - 1.0).abs() < 1e-6);
		assert_eq!(parsed.tokens_used, 0);
	}

	#[test]
	fn rejects_non_numeric_values() {
		let json = serde_json::json!({
			"data": [
				{ "index": 0, "embedding": ["oops"] }
			]
		});

		parse_embedding_response(json).expect_err("Expected a parse failure.");
	}
}
