//! Ollama embeddings adapter (`POST /api/embed`).

use super::{EmbeddingClient, EmbeddingClientError, openai::classify_status};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Embedding client for a local or remote Ollama runtime.
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    /// Build a client targeting `{base_url}/api/embed`.
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let response = self
            .http
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                input: &texts,
            })
            .send()
            .await
            .map_err(|err| EmbeddingClientError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|err| {
            EmbeddingClientError::Response(format!("failed to parse Ollama response: {err}"))
        })?;
        if parsed.embeddings.len() != expected {
            return Err(EmbeddingClientError::Response(format!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                expected
            )));
        }
        Ok(parsed.embeddings)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn posts_batch_to_embed_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed").json_body(json!({
                    "model": "nomic-embed-text",
                    "input": ["one", "two"]
                }));
                then.status(200).json_body(json!({
                    "model": "nomic-embed-text",
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let client =
            OllamaClient::new(reqwest::Client::new(), &server.base_url(), "nomic-embed-text");
        let vectors = client
            .generate_embeddings(vec!["one".into(), "two".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn server_errors_are_retryable_transport_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(503).body("loading model");
            })
            .await;

        let client =
            OllamaClient::new(reqwest::Client::new(), &server.base_url(), "nomic-embed-text");
        let error = client
            .generate_embeddings(vec!["one".into()])
            .await
            .unwrap_err();
        assert!(error.is_retryable());
    }
}
