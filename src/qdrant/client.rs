//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::types::{
    Distance, GetPointResponse, ListCollectionsResponse, PointRecord, QdrantError, QueryResponse,
    QueryResponseResult, RawPoint,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the Qdrant instance at `url`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("rusty-bot/0.1").build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
        distance: Distance,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            distance = distance.as_str(),
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size, distance)
            .await
    }

    /// Create a collection with the specified vector size and distance.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
        distance: Distance,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": distance.as_str()
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection ensured/created");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections").send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let error = unexpected_status(response).await;
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Ensure payload indexes exist for the given `(field, schema)` pairs.
    ///
    /// Index failures are logged and tolerated; filters still work without them, only slower.
    pub async fn ensure_payload_indexes(
        &self,
        collection_name: &str,
        fields: &[(&str, &str)],
    ) -> Result<(), QdrantError> {
        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index ensured"
                );
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index already exists"
                );
            } else {
                let error = unexpected_status(response).await;
                tracing::warn!(collection = collection_name, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Write points (each `{id, vector, payload}`) and wait until they are applied.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<Value>,
    ) -> Result<(), QdrantError> {
        if points.is_empty() {
            return Ok(());
        }

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await
    }

    /// Fetch one point with its payload; `None` when the point does not exist.
    pub async fn get_point(
        &self,
        collection_name: &str,
        point_id: &str,
    ) -> Result<Option<PointRecord>, QdrantError> {
        let response = self
            .request(
                Method::GET,
                &format!("collections/{collection_name}/points/{point_id}"),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let payload: GetPointResponse = response.json().await?;
                Ok(payload.result.map(into_record))
            }
            _ => {
                let error = unexpected_status(response).await;
                tracing::error!(collection = collection_name, point_id, error = %error, "Failed to fetch point");
                Err(error)
            }
        }
    }

    /// Delete every point matching `filter`.
    pub async fn delete_points_by_filter(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<(), QdrantError> {
        self.delete_points(collection_name, json!({ "filter": filter }))
            .await
    }

    /// Delete points by identifier.
    pub async fn delete_points_by_id(
        &self,
        collection_name: &str,
        ids: &[String],
    ) -> Result<(), QdrantError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_points(collection_name, json!({ "points": ids }))
            .await
    }

    async fn delete_points(&self, collection_name: &str, body: Value) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Points deleted");
        })
        .await
    }

    /// Perform a similarity search against a collection, returning scored points.
    pub async fn query_points(
        &self,
        collection_name: &str,
        vector: &[f32],
        filter: Option<Value>,
        limit: usize,
        with_vector: bool,
    ) -> Result<Vec<PointRecord>, QdrantError> {
        let mut body = serde_json::Map::new();
        body.insert("query".into(), json!(vector));
        body.insert("limit".into(), Value::from(limit));
        body.insert("with_payload".into(), Value::Bool(true));
        body.insert("with_vector".into(), Value::Bool(with_vector));
        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&Value::Object(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = unexpected_status(response).await;
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points.into_iter().map(into_record).collect())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                let error = unexpected_status(response).await;
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let error = unexpected_status(response).await;
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

pub(crate) async fn unexpected_status(response: reqwest::Response) -> QdrantError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    QdrantError::UnexpectedStatus { status, body }
}

pub(crate) fn into_record(point: RawPoint) -> PointRecord {
    PointRecord {
        id: stringify_point_id(point.id),
        score: point.score.unwrap_or_default(),
        payload: point.payload.unwrap_or_default(),
        vector: point.vector.and_then(parse_vector),
    }
}

/// Accept both the bare-array form and the single named-vector form.
fn parse_vector(value: Value) -> Option<Vec<f32>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| item.as_f64().map(|number| number as f32))
            .collect(),
        Value::Object(map) if map.len() == 1 => map
            .into_iter()
            .next()
            .and_then(|(_, inner)| parse_vector(inner)),
        _ => None,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

pub(crate) fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn test_service(base_url: String) -> QdrantService {
    QdrantService {
        client: Client::builder()
            .user_agent("rusty-bot-test")
            .build()
            .expect("client"),
        base_url,
        api_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };

    #[tokio::test]
    async fn query_points_emits_expected_request() {
        let server = MockServer::start_async().await;
        let filter = json!({ "must": [ { "key": "profile_id", "match": { "value": "p1" } } ] });

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/demo/points/query")
                    .json_body_partial(r#"{"limit":3,"with_vector":true}"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": {
                        "points": [
                            {
                                "id": "chunk-1",
                                "score": 0.42,
                                "payload": { "text": "Example", "ordinal": 4 },
                                "vector": [0.6, 0.8]
                            }
                        ]
                    }
                }));
            })
            .await;

        let service = test_service(server.base_url());
        let results = service
            .query_points("demo", &[0.1, 0.2], Some(filter), 3, true)
            .await
            .expect("search request");

        mock.assert();
        assert_eq!(results.len(), 1);
        let hit = &results[0];
        assert_eq!(hit.id, "chunk-1");
        assert!((hit.score - 0.42).abs() < f32::EPSILON);
        assert_eq!(hit.payload["text"], Value::String("Example".into()));
        assert_eq!(hit.vector.as_deref(), Some(&[0.6_f32, 0.8][..]));
    }

    #[tokio::test]
    async fn get_point_maps_missing_to_none() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/profiles/points/abc");
                then.status(404).json_body(json!({ "status": { "error": "Not found" } }));
            })
            .await;

        let service = test_service(server.base_url());
        let point = service
            .get_point("profiles", "abc")
            .await
            .expect("lookup");

        mock.assert();
        assert!(point.is_none());
    }

    #[tokio::test]
    async fn upsert_waits_and_surfaces_failures() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/demo/points")
                    .query_param("wait", "true");
                then.status(500).body("disk full");
            })
            .await;

        let service = test_service(server.base_url());
        let error = service
            .upsert_points("demo", vec![json!({ "id": "a", "vector": [1.0], "payload": {} })])
            .await
            .unwrap_err();

        mock.assert();
        match error {
            QdrantError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_collection_skips_existing() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/demo");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/demo");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let service = test_service(server.base_url());
        service
            .create_collection_if_not_exists("demo", 3, Distance::Cosine)
            .await
            .expect("ensure");

        exists.assert();
        create.assert_hits(0);
    }

    #[test]
    fn parses_named_vectors() {
        assert_eq!(parse_vector(json!({ "": [1.0, 2.0] })), Some(vec![1.0, 2.0]));
        assert_eq!(parse_vector(json!("nope")), None);
    }
}
