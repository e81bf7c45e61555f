//! Streaming helpers for iterating Qdrant scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};

use super::client::{QdrantService, into_record, unexpected_status};
use super::types::{PointRecord, QdrantError, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 512;

/// Stream every point matching `filter`, with payloads and optionally vectors.
///
/// Points arrive in Qdrant's id order; callers that need insertion order sort by payload.
pub fn stream_points<'a>(
    service: &'a QdrantService,
    collection: &'a str,
    filter: Option<Value>,
    with_vector: bool,
) -> impl Stream<Item = Result<PointRecord, QdrantError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));

        loop {
            let body = json!({
                "with_payload": true,
                "with_vector": with_vector,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter_body.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    yield into_record(point);
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = Some(next),
                    _ => break,
                }
            } else {
                let error = unexpected_status(response).await;
                tracing::error!(collection = collection, error = %error, "Failed to scroll points via stream");
                Err::<(), _>(error)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qdrant::client::test_service;
    use futures_util::{pin_mut, stream::StreamExt};
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn stream_points_collects_multiple_pages() {
        let server = MockServer::start_async().await;
        let service = test_service(server.base_url());

        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/scroll")
                    .body_contains("\"offset\":null");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "a", "payload": { "ordinal": 0 }, "vector": [1.0, 0.0] }
                        ],
                        "next_page_offset": "b"
                    }
                }));
            })
            .await;

        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/scroll")
                    .body_contains("\"offset\":\"b\"");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "b", "payload": { "ordinal": 1 }, "vector": [0.0, 1.0] }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let stream = stream_points(&service, "demo", None, true);
        pin_mut!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item.expect("point"));
        }

        first.assert();
        second.assert();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[1].payload.get("ordinal").and_then(Value::as_u64), Some(1));
        assert_eq!(items[1].vector.as_deref(), Some(&[0.0_f32, 1.0][..]));
    }

    #[tokio::test]
    async fn stream_points_surfaces_errors() {
        let server = MockServer::start_async().await;
        let service = test_service(server.base_url());
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/scroll");
                then.status(503).body("unavailable");
            })
            .await;

        let stream = stream_points(&service, "demo", None, false);
        pin_mut!(stream);
        let first = stream.next().await.expect("one item");
        assert!(matches!(first, Err(QdrantError::UnexpectedStatus { .. })));
    }
}
