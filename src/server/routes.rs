//! HTTP route handlers for the assistant API.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::assistant::AssistantError;
use crate::citation::Citation;
use crate::ids::{DocumentId, MessageId, ProjectId};
use crate::ingest::{DropEntry, RawFile};
use crate::knowledge::Resource;
use crate::project::model::{ChatMessage, Document, Project};
use crate::project::store::StoreError;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}", delete(delete_project))
        .route("/api/projects/{id}/name", put(rename_project))
        .route("/api/projects/{id}/cross-memory", post(toggle_cross_memory))
        .route("/api/projects/{id}/switch", post(switch_project))
        .route("/api/projects/{id}/clear", post(clear_conversation))
        .route("/api/projects/{id}/chat", post(send_chat))
        .route("/api/projects/{id}/messages/{message_id}", put(edit_message))
        .route("/api/projects/{id}/documents/files", post(attach_files))
        .route("/api/projects/{id}/documents/dropped", post(attach_dropped))
        .route("/api/projects/{id}/documents/link", post(attach_link))
        .route("/api/projects/{id}/documents/{doc_id}", delete(remove_document))
        .route("/api/knowledge/search", get(knowledge_search))
        .route("/api/knowledge/rank", get(knowledge_rank))
        .route("/api/citations/parse", post(parse_citation))
        .route("/api/sessions/reset", post(reset_sessions))
        .fallback_service(ServeDir::new("static"))
        .with_state(state)
}

/// Map an assistant error to an HTTP status.
fn error_response(err: AssistantError) -> (StatusCode, String) {
    let status = match &err {
        AssistantError::Store(StoreError::ProjectCapReached(_) | StoreError::LastProject) => {
            StatusCode::CONFLICT
        }
        AssistantError::Store(_) => StatusCode::NOT_FOUND,
        AssistantError::StaleTurn => StatusCode::CONFLICT,
        AssistantError::State(_) | AssistantError::Pattern(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lexcitator",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Project collection response.
#[derive(serde::Serialize)]
struct ProjectsResponse {
    projects: Vec<Project>,
    current: ProjectId,
}

async fn list_projects(State(state): State<Arc<AppState>>) -> Json<ProjectsResponse> {
    let snapshot = state.assistant.snapshot();
    Json(ProjectsResponse {
        projects: snapshot.projects.clone(),
        current: snapshot.current,
    })
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    name: Option<String>,
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<Json<Project>, (StatusCode, String)> {
    state
        .assistant
        .create_project(request.name.as_deref())
        .await
        .map(Json)
        .map_err(error_response)
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .delete_project(ProjectId::from_uuid(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenameRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .rename_project(ProjectId::from_uuid(id), &request.name)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

async fn toggle_cross_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .assistant
        .toggle_cross_memory(ProjectId::from_uuid(id))
        .await
        .map(|flag| Json(serde_json::json!({ "cross_memory": flag })))
        .map_err(error_response)
}

async fn switch_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .switch_project(ProjectId::from_uuid(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .clear_conversation(ProjectId::from_uuid(id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// Chat request. Credential and backend failures come back in-band as a
/// message flagged `is_error`, not as transport errors.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    api_key: String,
}

async fn send_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    state
        .assistant
        .send_message(ProjectId::from_uuid(id), &request.message, &request.api_key)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct EditMessageRequest {
    text: String,
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<EditMessageRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .edit_message(
            ProjectId::from_uuid(id),
            MessageId::from_uuid(message_id),
            &request.text,
        )
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct AttachFilesRequest {
    paths: Vec<PathBuf>,
}

async fn attach_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachFilesRequest>,
) -> Result<Json<Vec<Document>>, (StatusCode, String)> {
    let files = request.paths.into_iter().map(RawFile::from_path).collect();
    state
        .assistant
        .attach_files(ProjectId::from_uuid(id), files)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct DroppedEntryDto {
    path: PathBuf,
    #[serde(default)]
    is_directory: bool,
}

#[derive(Debug, Deserialize)]
struct AttachDroppedRequest {
    entries: Vec<DroppedEntryDto>,
}

async fn attach_dropped(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachDroppedRequest>,
) -> Result<Json<Vec<Document>>, (StatusCode, String)> {
    let entries = request
        .entries
        .into_iter()
        .map(|entry| {
            if entry.is_directory {
                DropEntry::Directory(entry.path)
            } else {
                DropEntry::File(entry.path)
            }
        })
        .collect();
    state
        .assistant
        .attach_dropped(ProjectId::from_uuid(id), entries)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct AttachLinkRequest {
    url: String,
}

async fn attach_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttachLinkRequest>,
) -> Result<Json<Document>, (StatusCode, String)> {
    state
        .assistant
        .attach_link(ProjectId::from_uuid(id), &request.url)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn remove_document(
    State(state): State<Arc<AppState>>,
    Path((id, doc_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .assistant
        .remove_document(ProjectId::from_uuid(id), DocumentId::from_uuid(doc_id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

async fn knowledge_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Resource>> {
    Json(state.assistant.knowledge().search(&params.q).await)
}

async fn knowledge_rank(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<Resource>> {
    let limit = params.limit.unwrap_or(10);
    Json(state.assistant.knowledge().rank(&params.q, limit).await)
}

async fn reset_sessions(State(state): State<Arc<AppState>>) -> StatusCode {
    state.assistant.reset_sessions();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct ParseCitationRequest {
    text: String,
}

async fn parse_citation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ParseCitationRequest>,
) -> Json<Option<Citation>> {
    Json(state.assistant.parse_citation(&request.text))
}
