//! Per-project backend session lifecycle.
//!
//! Each project maps to at most one live backend conversation. The
//! credential is process-global: changing it invalidates every project's
//! session, and the comparison-and-rebuild happens as one atomic step under
//! a single lock. Turns within one project are strictly sequential by
//! caller discipline; turns across projects may run concurrently, so the
//! lock is never held across the backend call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::backend::{GenerativeBackend, RequestPart, TurnContent, TurnRequest, TurnResponse};
use crate::ids::ProjectId;
use crate::project::model::{ChatMessage, Document, DocumentKind, Role};

/// Errors surfaced from a conversational turn.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Neither the caller nor the process-wide fallback supplied a credential.
    #[error("no API credential is configured")]
    CredentialMissing,

    /// The backend rejected the credential.
    #[error("the API credential was rejected: {0}")]
    CredentialRejected(String),

    /// Any other backend failure, message passed through unchanged.
    #[error("{0}")]
    Backend(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Arguments for one conversational turn.
#[derive(Clone, Copy, Debug)]
pub struct TurnArgs<'a> {
    /// Caller-supplied credential; empty falls back to the process default.
    pub credential: &'a str,
    /// The user's message.
    pub text: &'a str,
    /// Documents attached to the project at send time.
    pub documents: &'a [Document],
    /// Prior conversation, used to seed a freshly built session.
    pub prior_messages: &'a [ChatMessage],
    /// System instruction for this turn.
    pub system_instruction: &'a str,
}

/// One cached backend conversation.
#[derive(Clone, Debug, Default)]
struct ProjectSession {
    history: Vec<TurnContent>,
}

/// Credential plus session map, guarded together so the credential
/// comparison and the rebuild are one atomic step.
#[derive(Default)]
struct SessionTable {
    credential: Option<String>,
    sessions: HashMap<ProjectId, ProjectSession>,
}

/// Owns every backend session, keyed by project id.
pub struct SessionManager {
    backend: Arc<dyn GenerativeBackend>,
    default_credential: Option<String>,
    temperature: f32,
    table: Mutex<SessionTable>,
    epochs: DashMap<ProjectId, u64>,
}

impl SessionManager {
    /// Create a manager around a backend.
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        default_credential: Option<String>,
        temperature: f32,
    ) -> Self {
        Self {
            backend,
            default_credential,
            temperature,
            table: Mutex::new(SessionTable::default()),
            epochs: DashMap::new(),
        }
    }

    /// Send one turn for a project.
    ///
    /// Builds (or rebuilds, on credential change) the project's session,
    /// composes the request parts from the attached documents plus the user
    /// text, and invokes the backend with web-search grounding enabled.
    ///
    /// # Errors
    /// [`SessionError::CredentialMissing`] when no credential is available,
    /// [`SessionError::CredentialRejected`] when the backend signals an
    /// authorization problem, [`SessionError::Backend`] otherwise. The
    /// session stays cached for retry; no turn is recorded on failure.
    pub async fn send_turn(
        &self,
        project_id: ProjectId,
        args: TurnArgs<'_>,
    ) -> SessionResult<TurnResponse> {
        let effective = self.resolve_credential(args.credential)?;
        let epoch = self.epoch(project_id);

        // Atomic credential compare-and-rebuild, then session lookup.
        let history = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.credential.as_deref() != Some(effective.as_str()) {
                if table.credential.is_some() {
                    info!("Credential changed; dropping all backend sessions");
                }
                table.sessions.clear();
                table.credential = Some(effective.clone());
            }
            table
                .sessions
                .entry(project_id)
                .or_insert_with(|| {
                    debug!("Building backend session for project {project_id}");
                    ProjectSession {
                        history: seed_history(args.prior_messages),
                    }
                })
                .history
                .clone()
        };

        let current = TurnContent::user(compose_parts(args.documents, args.text));
        let mut contents = history;
        contents.push(current.clone());

        let request = TurnRequest {
            system_instruction: args.system_instruction.to_string(),
            contents,
            temperature: self.temperature,
            web_search: true,
        };

        let response = match self.backend.generate(&effective, request).await {
            Ok(response) => response,
            Err(err) if err.is_credential_error() => {
                return Err(SessionError::CredentialRejected(err.to_string()));
            }
            Err(err) => return Err(SessionError::Backend(err.to_string())),
        };

        // Record the exchange, unless the session was invalidated while the
        // call was in flight.
        {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.credential.as_deref() == Some(effective.as_str())
                && self.epoch(project_id) == epoch
            {
                if let Some(session) = table.sessions.get_mut(&project_id) {
                    session.history.push(current);
                    session.history.push(TurnContent::model(response.text.clone()));
                }
            }
        }

        Ok(response)
    }

    /// Drop one project's cached session. Messages are untouched.
    pub fn reset(&self, project_id: ProjectId) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.sessions.remove(&project_id).is_some() {
            debug!("Dropped backend session for project {project_id}");
        }
        drop(table);
        self.bump_epoch(project_id);
    }

    /// Drop every cached session and forget the remembered credential.
    pub fn reset_all(&self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let ids: Vec<ProjectId> = table.sessions.keys().copied().collect();
        table.sessions.clear();
        table.credential = None;
        drop(table);
        for id in ids {
            self.bump_epoch(id);
        }
    }

    /// Current epoch for a project. The epoch advances on every reset, so a
    /// caller can detect that an in-flight response went stale.
    #[must_use]
    pub fn epoch(&self, project_id: ProjectId) -> u64 {
        self.epochs.get(&project_id).map_or(0, |e| *e)
    }

    /// Number of live backend sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .len()
    }

    fn resolve_credential(&self, supplied: &str) -> SessionResult<String> {
        let supplied = supplied.trim();
        if !supplied.is_empty() {
            return Ok(supplied.to_string());
        }
        self.default_credential
            .clone()
            .ok_or(SessionError::CredentialMissing)
    }

    fn bump_epoch(&self, project_id: ProjectId) {
        *self.epochs.entry(project_id).or_insert(0) += 1;
    }
}

/// Replay prior user/model messages into backend history. Error messages
/// and local system notices never reach the backend.
fn seed_history(messages: &[ChatMessage]) -> Vec<TurnContent> {
    messages
        .iter()
        .filter(|m| !m.is_error && !m.text.is_empty())
        .filter_map(|m| match m.role {
            Role::User => Some(TurnContent::user(vec![RequestPart::Text(m.text.clone())])),
            Role::Model => Some(TurnContent::model(m.text.clone())),
            Role::System => None,
        })
        .collect()
}

/// One request part per attached document, then the user's text.
fn compose_parts(documents: &[Document], text: &str) -> Vec<RequestPart> {
    let mut parts: Vec<RequestPart> = documents
        .iter()
        .map(|doc| match doc.kind {
            DocumentKind::File => RequestPart::InlineData {
                mime_type: doc.mime_type.clone(),
                data: doc.data.clone(),
            },
            DocumentKind::Link => RequestPart::Text(format!(
                "Web reference: {}. Consult this source if it is relevant to the question.",
                doc.data
            )),
        })
        .collect();
    parts.push(RequestPart::Text(text.to_string()));
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::testing::ScriptedBackend;
    use crate::ids::DocumentId;

    fn manager_with(backend: Arc<ScriptedBackend>) -> SessionManager {
        SessionManager::new(backend, None, 0.2)
    }

    fn args<'a>(credential: &'a str, text: &'a str, documents: &'a [Document]) -> TurnArgs<'a> {
        TurnArgs {
            credential,
            text,
            documents,
            prior_messages: &[],
            system_instruction: "system",
        }
    }

    fn file_doc() -> Document {
        Document {
            id: DocumentId::new(),
            kind: DocumentKind::File,
            name: "deed.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: "QUJD".to_string(),
            size: 3,
        }
    }

    fn link_doc() -> Document {
        Document {
            id: DocumentId::new(),
            kind: DocumentKind::Link,
            name: "https://example.com/act".to_string(),
            mime_type: "text/uri-list".to_string(),
            data: "https://example.com/act".to_string(),
            size: 0,
        }
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_backend_call() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let result = manager
            .send_turn(ProjectId::new(), args("", "hello", &[]))
            .await;
        assert!(matches!(result, Err(SessionError::CredentialMissing)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_credential_used_when_caller_supplies_none() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = SessionManager::new(backend.clone(), Some("env-key".to_string()), 0.2);
        manager
            .send_turn(ProjectId::new(), args("", "hello", &[]))
            .await
            .unwrap();
        assert_eq!(backend.calls()[0].credential, "env-key");
    }

    #[tokio::test]
    async fn test_credential_change_rebuilds_every_session() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let project_a = ProjectId::new();
        let project_b = ProjectId::new();

        manager.send_turn(project_a, args("key-1", "a1", &[])).await.unwrap();
        manager.send_turn(project_b, args("key-1", "b1", &[])).await.unwrap();
        assert_eq!(manager.active_sessions(), 2);

        manager.send_turn(project_a, args("key-2", "a2", &[])).await.unwrap();
        // The new credential invalidated both sessions; only project A was
        // rebuilt so far.
        assert_eq!(manager.active_sessions(), 1);

        // The rebuilt session carries no history from the key-1 era.
        let calls = backend.calls();
        assert_eq!(calls[2].request.contents.len(), 1);
    }

    #[tokio::test]
    async fn test_history_accumulates_within_one_session() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_text("first answer");
        let manager = manager_with(backend.clone());
        let project = ProjectId::new();

        manager.send_turn(project, args("key", "first", &[])).await.unwrap();
        manager.send_turn(project, args("key", "second", &[])).await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].request.contents.len(), 1);
        // user + model + new user
        assert_eq!(calls[1].request.contents.len(), 3);
        assert_eq!(calls[1].request.contents[1].role, "model");
    }

    #[tokio::test]
    async fn test_reset_only_touches_one_project() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let project_a = ProjectId::new();
        let project_b = ProjectId::new();

        manager.send_turn(project_a, args("key", "a", &[])).await.unwrap();
        manager.send_turn(project_b, args("key", "b", &[])).await.unwrap();

        let epoch_before = manager.epoch(project_a);
        manager.reset(project_a);
        assert_eq!(manager.active_sessions(), 1);
        assert_eq!(manager.epoch(project_a), epoch_before + 1);

        manager.send_turn(project_a, args("key", "a2", &[])).await.unwrap();
        // Fresh session for A: no history carried over.
        let calls = backend.calls();
        assert_eq!(calls[2].request.contents.len(), 1);
        assert_eq!(manager.active_sessions(), 2);
    }

    #[tokio::test]
    async fn test_reset_all_clears_sessions_and_credential() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let project = ProjectId::new();
        manager.send_turn(project, args("key", "a", &[])).await.unwrap();

        manager.reset_all();
        assert_eq!(manager.active_sessions(), 0);

        // Same credential builds a brand new session rather than reusing one.
        manager.send_turn(project, args("key", "b", &[])).await.unwrap();
        assert_eq!(backend.calls()[1].request.contents.len(), 1);
    }

    #[tokio::test]
    async fn test_parts_compose_documents_then_text() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let docs = vec![file_doc(), link_doc()];

        manager
            .send_turn(ProjectId::new(), args("key", "question", &docs))
            .await
            .unwrap();

        let parts = &backend.calls()[0].request.contents[0].parts;
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], RequestPart::InlineData { mime_type, .. }
            if mime_type == "application/pdf"));
        assert!(matches!(&parts[1], RequestPart::Text(text)
            if text.contains("https://example.com/act")));
        assert!(matches!(&parts[2], RequestPart::Text(text) if text == "question"));
        assert!(backend.calls()[0].request.web_search);
    }

    #[tokio::test]
    async fn test_credential_rejection_classified() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_error(BackendError::Api {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".to_string(),
        });
        let manager = manager_with(backend.clone());
        let result = manager
            .send_turn(ProjectId::new(), args("bad-key", "q", &[]))
            .await;
        assert!(matches!(result, Err(SessionError::CredentialRejected(_))));
    }

    #[tokio::test]
    async fn test_other_backend_errors_pass_through() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_error(BackendError::Api {
            status: 503,
            message: "model overloaded".to_string(),
        });
        let manager = manager_with(backend.clone());
        let project = ProjectId::new();
        let err = manager
            .send_turn(project, args("key", "q", &[]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model overloaded"));
        // Session stays cached for retry.
        assert_eq!(manager.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_failed_turn_records_no_history() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_error(BackendError::Api {
            status: 500,
            message: "internal".to_string(),
        });
        let manager = manager_with(backend.clone());
        let project = ProjectId::new();
        let _ = manager.send_turn(project, args("key", "q1", &[])).await;
        manager.send_turn(project, args("key", "q2", &[])).await.unwrap();
        // Second call still sees an empty history.
        assert_eq!(backend.calls()[1].request.contents.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_seeded_from_prior_messages() {
        let backend = Arc::new(ScriptedBackend::default());
        let manager = manager_with(backend.clone());
        let prior = vec![
            ChatMessage::user("old question"),
            ChatMessage::model("old answer", Vec::new()),
            ChatMessage::model_error("transient failure"),
        ];
        let turn = TurnArgs {
            credential: "key",
            text: "follow-up",
            documents: &[],
            prior_messages: &prior,
            system_instruction: "system",
        };
        manager.send_turn(ProjectId::new(), turn).await.unwrap();
        let contents = &backend.calls()[0].request.contents;
        // old user + old model + current; the error message is excluded.
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }
}
