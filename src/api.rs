//! HTTP surface for Rusty Bot.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /chatbots` – Multipart upload (`chat_name`, `chat_model`, `sys_message`, `temperature`,
//!   `openai_key`, one or more `files`) creating a chatbot profile from the documents.
//! - `GET /chatbots` – List profiles, restricted to the caller when `x-user-id` is present.
//! - `GET /chatbots/:id` / `DELETE /chatbots/:id` – Inspect or remove a profile.
//! - `POST /chatbots/:id/documents` – Append more documents to a profile.
//! - `POST /chatbots/:id/query` – Rank a profile's chunks against a query.
//! - `GET /metrics` – Observe ingestion and search counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Failures are returned as `{ "error": { "kind", "message" } }` with a stable `kind`.

use crate::processing::{
    Document, ErrorKind, IngestError, IngestRequest, MediaType, ProcessingApi, ProfileConfig,
    SearchError, SearchRequest,
};
use crate::store::{ChatbotProfile, StoreError};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the caller identity recorded as profile owner.
pub const USER_HEADER: &str = "x-user-id";

const ANONYMOUS_OWNER: &str = "anonymous";

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route(
            "/chatbots",
            post(create_chatbot::<S>).get(list_chatbots::<S>),
        )
        .route(
            "/chatbots/:id",
            get(get_chatbot::<S>).delete(delete_chatbot::<S>),
        )
        .route("/chatbots/:id/documents", post(append_documents::<S>))
        .route("/chatbots/:id/query", post(query_chatbot::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

/// Fields collected from a multipart upload.
#[derive(Default)]
struct UploadForm {
    chat_name: Option<String>,
    chat_model: Option<String>,
    sys_message: Option<String>,
    temperature: Option<String>,
    openai_key: Option<String>,
    documents: Vec<Document>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "files" | "file" => {
                    let file_name = field
                        .file_name()
                        .filter(|value| !value.trim().is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("upload-{}", form.documents.len() + 1));
                    let declared = field.content_type().map(str::to_string);
                    let content = field.bytes().await?.to_vec();
                    form.documents.push(Document {
                        media_type: media_type_for(declared.as_deref(), &file_name),
                        file_name,
                        content,
                    });
                }
                "chat_name" => form.chat_name = Some(field.text().await?),
                "chat_model" => form.chat_model = Some(field.text().await?),
                "sys_message" => form.sys_message = Some(field.text().await?),
                "temperature" => form.temperature = Some(field.text().await?),
                "openai_key" => form.openai_key = Some(field.text().await?),
                other => {
                    tracing::debug!(field = other, "Ignoring unknown multipart field");
                }
            }
        }
        Ok(form)
    }

    fn temperature(&self) -> Result<Option<f32>, AppError> {
        match self.temperature.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<f32>().map(Some).map_err(|_| {
                AppError::validation(format!("temperature '{raw}' is not a number"))
            }),
        }
    }
}

/// Declared type wins; generic or missing types fall back to the file extension.
fn media_type_for(declared: Option<&str>, file_name: &str) -> MediaType {
    match declared.map(str::trim) {
        Some(value) if !value.is_empty() && !value.starts_with("application/octet-stream") => {
            MediaType::from_declared(value)
        }
        _ => MediaType::from_path(std::path::Path::new(file_name)),
    }
}

fn caller_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Success response for `POST /chatbots`.
#[derive(Serialize)]
struct CreateChatbotResponse {
    profile_id: Uuid,
    chunk_count: usize,
    profile: ChatbotProfile,
}

/// Create a profile from uploaded documents.
async fn create_chatbot<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<CreateChatbotResponse>), AppError>
where
    S: ProcessingApi,
{
    let form = UploadForm::read(multipart?).await?;
    let temperature = form.temperature()?;
    let request = IngestRequest {
        profile: ProfileConfig {
            name: form.chat_name.unwrap_or_default(),
            model: form.chat_model.unwrap_or_default(),
            system_prompt: form.sys_message,
            temperature,
            owner: caller_identity(&headers).unwrap_or_else(|| ANONYMOUS_OWNER.to_string()),
        },
        documents: form.documents,
        credential: form.openai_key,
    };

    let outcome = service.ingest(request).await?;
    tracing::info!(
        profile_id = %outcome.profile.id,
        documents = outcome.documents,
        chunks = outcome.chunks_written,
        "Create chatbot request completed"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateChatbotResponse {
            profile_id: outcome.profile.id,
            chunk_count: outcome.profile.chunk_count,
            profile: outcome.profile,
        }),
    ))
}

/// Success response for `POST /chatbots/:id/documents`.
#[derive(Serialize)]
struct AppendResponse {
    profile_id: Uuid,
    chunks_added: usize,
    chunk_count: usize,
}

/// Append uploaded documents to an existing profile.
async fn append_documents<S>(
    State(service): State<Arc<S>>,
    profile_id: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AppendResponse>, AppError>
where
    S: ProcessingApi,
{
    let Path(profile_id) = profile_id?;
    let form = UploadForm::read(multipart?).await?;
    let outcome = service
        .append_documents(profile_id, form.documents, form.openai_key)
        .await?;
    Ok(Json(AppendResponse {
        profile_id,
        chunks_added: outcome.chunks_written,
        chunk_count: outcome.profile.chunk_count,
    }))
}

/// Request body for `POST /chatbots/:id/query`.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural language query.
    query: String,
    /// Optional result count (defaults to `SEARCH_DEFAULT_LIMIT`).
    #[serde(default)]
    top_k: Option<usize>,
    /// Optional embedding-provider credential for this request.
    #[serde(default)]
    openai_key: Option<String>,
}

#[derive(Serialize)]
struct QueryHit {
    text: String,
    distance: f32,
    ordinal: u64,
    file_name: String,
}

#[derive(Serialize)]
struct QueryResponse {
    results: Vec<QueryHit>,
}

/// Rank a profile's chunks against a query.
async fn query_chatbot<S>(
    State(service): State<Arc<S>>,
    profile_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: ProcessingApi,
{
    let Path(profile_id) = profile_id?;
    let Json(request) = request?;
    let hits = service
        .search(SearchRequest {
            profile_id,
            query_text: request.query,
            top_k: request.top_k,
            credential: request.openai_key,
        })
        .await?;
    let results = hits
        .into_iter()
        .map(|hit| QueryHit {
            text: hit.chunk.text,
            distance: hit.distance,
            ordinal: hit.chunk.ordinal,
            file_name: hit.chunk.file_name,
        })
        .collect();
    Ok(Json(QueryResponse { results }))
}

#[derive(Serialize)]
struct ListResponse {
    profiles: Vec<ChatbotProfile>,
}

/// List profiles, scoped to the caller when one is identified.
async fn list_chatbots<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse>, AppError>
where
    S: ProcessingApi,
{
    let owner = caller_identity(&headers);
    let profiles = service.list_profiles(owner.as_deref()).await?;
    Ok(Json(ListResponse { profiles }))
}

/// Fetch one profile.
async fn get_chatbot<S>(
    State(service): State<Arc<S>>,
    profile_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ChatbotProfile>, AppError>
where
    S: ProcessingApi,
{
    let Path(profile_id) = profile_id?;
    service
        .get_profile(profile_id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::ProfileNotFound(profile_id).into())
}

/// Delete a profile and its chunks.
async fn delete_chatbot<S>(
    State(service): State<Arc<S>>,
    profile_id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError>
where
    S: ProcessingApi,
{
    let Path(profile_id) = profile_id?;
    if service.delete_profile(profile_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StoreError::ProfileNotFound(profile_id).into())
    }
}

/// Return a concise metrics snapshot with ingestion and search counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_chatbot",
                method: "POST",
                path: "/chatbots",
                description: "Multipart upload of PDF or text files plus chat_name, chat_model, optional sys_message, temperature and openai_key. Extracts, segments, embeds and stores the documents under a new profile; responds with { \"profile_id\", \"chunk_count\", \"profile\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_chatbots",
                method: "GET",
                path: "/chatbots",
                description: "List chatbot profiles, restricted to the x-user-id caller when the header is present.",
                request_example: None,
            },
            CommandDescriptor {
                name: "get_chatbot",
                method: "GET",
                path: "/chatbots/:id",
                description: "Return one chatbot profile.",
                request_example: None,
            },
            CommandDescriptor {
                name: "delete_chatbot",
                method: "DELETE",
                path: "/chatbots/:id",
                description: "Delete a chatbot profile and every stored chunk it owns.",
                request_example: None,
            },
            CommandDescriptor {
                name: "append_documents",
                method: "POST",
                path: "/chatbots/:id/documents",
                description: "Multipart upload of more files (and optional openai_key) appended atomically to an existing profile.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query_chatbot",
                method: "POST",
                path: "/chatbots/:id/query",
                description: "Embed a query and return the closest stored chunks by cosine distance.",
                request_example: Some(json!({
                    "query": "How do I reset my password?",
                    "top_k": 3
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and search counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Client-facing error with a stable kind.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl AppError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::ValidationError,
            message: message.into(),
        }
    }

    fn from_kind(kind: ErrorKind, detail: String) -> Self {
        let message = match kind {
            ErrorKind::StorageError => "the storage backend failed".to_string(),
            ErrorKind::ProviderAuthError => {
                "the embedding provider rejected the credential".to_string()
            }
            ErrorKind::ProviderRateLimitError => {
                "the embedding provider kept rate limiting the request".to_string()
            }
            ErrorKind::ProviderTransportError | ErrorKind::ProviderResponseError => {
                "the embedding provider request failed".to_string()
            }
            ErrorKind::ExtractionError => "a document could not be read".to_string(),
            _ => detail.clone(),
        };
        Self::logged(kind, &detail, message)
    }

    /// Log the internal detail and keep only `message` for the caller.
    fn logged(kind: ErrorKind, detail: &str, message: String) -> Self {
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), error = %detail, "Request failed");
        } else {
            tracing::warn!(kind = kind.as_str(), error = %detail, "Request rejected");
        }
        Self {
            status,
            kind,
            message,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::InvalidConfiguration => StatusCode::BAD_REQUEST,
        ErrorKind::ExtractionError | ErrorKind::DegenerateVector => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::ProfileNotFound => StatusCode::NOT_FOUND,
        ErrorKind::ProviderRateLimitError => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ProviderAuthError
        | ErrorKind::ProviderTransportError
        | ErrorKind::ProviderResponseError => StatusCode::BAD_GATEWAY,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        match &inner {
            IngestError::Extraction(error) => Self::logged(
                ErrorKind::ExtractionError,
                &inner.to_string(),
                format!("could not extract text from '{}'", error.file_name()),
            ),
            _ => Self::from_kind(inner.kind(), inner.to_string()),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(inner: SearchError) -> Self {
        Self::from_kind(inner.kind(), inner.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self::from_kind(ErrorKind::from_store(&inner), inner.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection, "Malformed JSON body");
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::warn!(error = %rejection, "Malformed path parameter");
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::warn!(error = %rejection, "Request is not a multipart upload");
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        let status = inner.status();
        tracing::warn!(error = %inner, "Malformed multipart upload");
        Self {
            status,
            kind: ErrorKind::ValidationError,
            message: inner.body_text(),
        }
    }
}
