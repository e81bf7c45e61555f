//! OpenAI-compatible embeddings adapter.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Embedding client for `POST {base}/embeddings` endpoints speaking the OpenAI schema.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    /// Bind a client to one credential. `http` is shared with the owning provider.
    pub fn new(http: reqwest::Client, base_url: &str, model: &str, api_key: String) -> Self {
        Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let request = EmbeddingRequest {
            model: &self.model,
            input: &texts,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.trim())
            .json(&request)
            .send()
            .await
            .map_err(|err| EmbeddingClientError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, body));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            EmbeddingClientError::Response(format!("failed to parse embedding response: {err}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != expected {
            return Err(EmbeddingClientError::Response(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            )));
        }
        if parsed
            .data
            .iter()
            .enumerate()
            .any(|(position, entry)| entry.index != position)
        {
            return Err(EmbeddingClientError::Response(
                "provider returned non-contiguous embedding indexes".to_string(),
            ));
        }

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| entry.embedding)
            .collect())
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: String) -> EmbeddingClientError {
    let detail = format!("{status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingClientError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => EmbeddingClientError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT => EmbeddingClientError::Transport(detail),
        status if status.is_server_error() => EmbeddingClientError::Transport(detail),
        _ => EmbeddingClientError::Response(detail),
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(
            reqwest::Client::new(),
            &server.base_url(),
            "text-embedding-3-small",
            "sk-test".into(),
        )
    }

    #[tokio::test]
    async fn reorders_response_by_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({
                        "model": "text-embedding-3-small",
                        "input": ["first", "second"]
                    }));
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client(&server)
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn maps_statuses_to_error_kinds() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("slow down");
            })
            .await;

        let error = client(&server)
            .generate_embeddings(vec!["text".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::RateLimited(_)));

        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            EmbeddingClientError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            EmbeddingClientError::Transport(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            EmbeddingClientError::Response(_)
        ));
    }

    #[tokio::test]
    async fn short_response_is_a_contract_violation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "index": 0, "embedding": [1.0] } ]
                }));
            })
            .await;

        let error = client(&server)
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::Response(_)));
    }
}
