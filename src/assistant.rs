//! Assistant service coordinating projects, sessions, ingestion, and
//! citations.
//!
//! This is the composition root's single entry point: every UI-facing
//! operation flows through here, which is also where the persisted state is
//! written back after each mutation.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::GenerativeBackend;
use crate::citation::{Citation, CitationExtractor};
use crate::config::AssistantConfig;
use crate::ids::{DocumentId, MessageId, ProjectId};
use crate::ingest::{self, DropEntry, RawFile};
use crate::knowledge::KnowledgeBase;
use crate::project::model::{ChatMessage, Document, Project};
use crate::project::store::{ProjectStore, Snapshot, StoreError};
use crate::session::{SessionError, SessionManager, TurnArgs};
use crate::storage::{StateError, StateStore};

/// Errors surfaced by the assistant service.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Project collection error (capacity, floor, unknown ids).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The turn completed after its project was deleted or reset; the
    /// response was discarded.
    #[error("the response arrived for a project that was reset or deleted")]
    StaleTurn,
    /// Persistence error.
    #[error(transparent)]
    State(#[from] StateError),
    /// Invalid extractor pattern at construction time.
    #[error("invalid citation pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

/// The assembled coordination core.
pub struct Assistant {
    config: AssistantConfig,
    store: ProjectStore,
    sessions: SessionManager,
    knowledge: KnowledgeBase,
    citations: CitationExtractor,
    state: Option<StateStore>,
    system_instruction: String,
}

impl Assistant {
    /// Assemble the service. When a [`StateStore`] is supplied, persisted
    /// projects and the last-used credential are restored from it.
    ///
    /// # Errors
    /// Returns an error if the citation pattern fails to compile.
    pub async fn new(
        config: AssistantConfig,
        backend: Arc<dyn GenerativeBackend>,
        state: Option<StateStore>,
        system_instruction: impl Into<String>,
    ) -> AssistantResult<Self> {
        let mut default_credential = config.default_credential.clone();
        let store = match &state {
            Some(state) => {
                if default_credential.is_none() {
                    default_credential = state.load_credential().await;
                }
                match state.load_projects().await {
                    Some(persisted) => {
                        info!("Restored {} persisted projects", persisted.projects.len());
                        ProjectStore::from_parts(
                            persisted.projects,
                            persisted.current,
                            config.max_projects,
                        )
                    }
                    None => ProjectStore::new(config.max_projects),
                }
            }
            None => ProjectStore::new(config.max_projects),
        };

        let client = reqwest::Client::new();
        let knowledge = KnowledgeBase::new(client, config.index_url.clone());
        let sessions = SessionManager::new(backend, default_credential, config.temperature);

        Ok(Self {
            config,
            store,
            sessions,
            knowledge,
            citations: CitationExtractor::new()?,
            state,
            system_instruction: system_instruction.into(),
        })
    }

    /// Snapshot of the project collection.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Look up one project.
    #[must_use]
    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.store.get(id)
    }

    /// The knowledge base.
    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// The citation extractor.
    #[must_use]
    pub fn citations(&self) -> &CitationExtractor {
        &self.citations
    }

    /// Parse the first citation marker out of free-form message text.
    #[must_use]
    pub fn parse_citation(&self, text: &str) -> Option<Citation> {
        self.citations.parse_first(text)
    }

    /// Create a project and make it current.
    ///
    /// # Errors
    /// Propagates the capacity error when the cap is reached.
    pub async fn create_project(&self, name: Option<&str>) -> AssistantResult<Project> {
        let project = self.store.create(name)?;
        self.persist().await;
        Ok(project)
    }

    /// Delete a project and tear down its backend session.
    ///
    /// # Errors
    /// Propagates the floor error when only one project remains.
    pub async fn delete_project(&self, id: ProjectId) -> AssistantResult<()> {
        self.store.delete(id)?;
        self.sessions.reset(id);
        self.persist().await;
        Ok(())
    }

    /// Rename a project.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn rename_project(&self, id: ProjectId, name: &str) -> AssistantResult<()> {
        self.store.rename(id, name)?;
        self.persist().await;
        Ok(())
    }

    /// Flip a project's cross-memory flag.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn toggle_cross_memory(&self, id: ProjectId) -> AssistantResult<bool> {
        let flag = self.store.toggle_cross_memory(id)?;
        self.persist().await;
        Ok(flag)
    }

    /// Switch the current project. Sessions are untouched.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn switch_project(&self, id: ProjectId) -> AssistantResult<()> {
        self.store.switch_current(id)?;
        self.persist().await;
        Ok(())
    }

    /// Drop every backend session and forget the remembered credential.
    /// Conversations are untouched.
    pub fn reset_sessions(&self) {
        self.sessions.reset_all();
    }

    /// Clear a project's conversation and drop its backend session.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn clear_conversation(&self, id: ProjectId) -> AssistantResult<()> {
        self.store.clear_messages(id)?;
        self.sessions.reset(id);
        self.persist().await;
        Ok(())
    }

    /// Edit a past user message, dropping every later message and the
    /// project's session so the next turn rebuilds from the edited history.
    ///
    /// # Errors
    /// Propagates unknown-project and unknown-message errors.
    pub async fn edit_message(
        &self,
        id: ProjectId,
        message_id: MessageId,
        text: &str,
    ) -> AssistantResult<()> {
        self.store.edit_message(id, message_id, text)?;
        self.sessions.reset(id);
        self.persist().await;
        Ok(())
    }

    /// Ingest picked files into a project.
    ///
    /// # Errors
    /// Propagates unknown-project errors. Per-file read failures are
    /// skipped inside the pipeline, never surfaced here.
    pub async fn attach_files(
        &self,
        id: ProjectId,
        files: Vec<RawFile>,
    ) -> AssistantResult<Vec<Document>> {
        let docs = ingest::ingest_files(files, self.config.max_batch_files).await;
        self.store.add_documents(id, docs.clone())?;
        self.persist().await;
        Ok(docs)
    }

    /// Expand a drag-and-drop payload and ingest the resulting files.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn attach_dropped(
        &self,
        id: ProjectId,
        entries: Vec<DropEntry>,
    ) -> AssistantResult<Vec<Document>> {
        let files = ingest::expand_dropped(entries).await;
        self.attach_files(id, files).await
    }

    /// Attach a pasted URL as a link document.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn attach_link(&self, id: ProjectId, raw_url: &str) -> AssistantResult<Document> {
        let doc = ingest::make_link(raw_url);
        self.store.add_documents(id, vec![doc.clone()])?;
        self.persist().await;
        Ok(doc)
    }

    /// Remove a document from a project. A missing document id is a no-op.
    ///
    /// # Errors
    /// Propagates unknown-project errors.
    pub async fn remove_document(&self, id: ProjectId, doc_id: DocumentId) -> AssistantResult<()> {
        self.store.remove_document(id, doc_id)?;
        self.persist().await;
        Ok(())
    }

    /// Send a user turn through the full pipeline.
    ///
    /// Appends the user message, invokes the backend session, and appends
    /// either the model's answer or a failed model message flagged
    /// `is_error`. Credential and backend failures are therefore returned
    /// in-band as messages, never as transport errors.
    ///
    /// # Errors
    /// Returns [`AssistantError::Store`] for an unknown project and
    /// [`AssistantError::StaleTurn`] when the project was deleted or reset
    /// while the call was in flight.
    pub async fn send_message(
        &self,
        id: ProjectId,
        text: &str,
        credential: &str,
    ) -> AssistantResult<ChatMessage> {
        let project = self.store.get(id).ok_or(StoreError::UnknownProject(id))?;

        if !credential.trim().is_empty() {
            self.remember_credential(credential.trim()).await;
        }

        self.store.append_message(id, ChatMessage::user(text))?;
        self.persist().await;

        let system_instruction = self.compose_system_instruction().await;
        let epoch = self.sessions.epoch(id);
        let turn = TurnArgs {
            credential,
            text,
            documents: &project.documents,
            prior_messages: &project.messages,
            system_instruction: &system_instruction,
        };
        let outcome = self.sessions.send_turn(id, turn).await;

        // Guard against appending a stale response to a project that was
        // reset or deleted while the call was in flight.
        if !self.store.contains(id) || self.sessions.epoch(id) != epoch {
            warn!("Discarding stale backend response for project {id}");
            return Err(AssistantError::StaleTurn);
        }

        let message = match outcome {
            Ok(response) => ChatMessage::model(response.text, response.grounding),
            Err(err @ SessionError::CredentialMissing | err @ SessionError::CredentialRejected(_)) => {
                ChatMessage::model_error(err.to_string())
            }
            Err(SessionError::Backend(message)) => ChatMessage::model_error(message),
        };
        self.store.append_message(id, message.clone())?;
        self.persist().await;
        Ok(message)
    }

    /// The system instruction with the knowledge-base briefing appended
    /// when a catalog is loaded.
    async fn compose_system_instruction(&self) -> String {
        if self.knowledge.load().await.is_some() {
            format!("{}\n\n{}", self.system_instruction, self.knowledge.summary().await)
        } else {
            self.system_instruction.clone()
        }
    }

    async fn remember_credential(&self, credential: &str) {
        if let Some(state) = &self.state {
            if let Err(err) = state.save_credential(credential).await {
                warn!("Could not persist credential: {err}");
            }
        }
    }

    async fn persist(&self) {
        if let Some(state) = &self.state {
            if let Err(err) = state.save_projects(&self.store.snapshot()).await {
                warn!("Could not persist projects: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::backend::testing::ScriptedBackend;

    async fn assistant_with(backend: Arc<ScriptedBackend>) -> Assistant {
        let config = AssistantConfig {
            index_url: "http://127.0.0.1:1/none.json".to_string(),
            ..AssistantConfig::default()
        };
        Assistant::new(config, backend, None, "You are a research assistant.")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_appends_user_and_model_messages() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_text("the answer");
        let assistant = assistant_with(backend).await;
        let id = assistant.snapshot().current;

        let reply = assistant.send_message(id, "the question", "key").await.unwrap();
        assert!(!reply.is_error);
        assert_eq!(reply.text, "the answer");

        let project = assistant.project(id).unwrap();
        assert_eq!(project.messages.len(), 2);
        assert_eq!(project.messages[0].text, "the question");
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_error_message() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_error(BackendError::Api {
            status: 500,
            message: "model overloaded".to_string(),
        });
        let assistant = assistant_with(backend).await;
        let id = assistant.snapshot().current;

        let reply = assistant.send_message(id, "q", "key").await.unwrap();
        assert!(reply.is_error);
        assert!(reply.text.contains("model overloaded"));
        assert_eq!(assistant.project(id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_becomes_error_message() {
        let backend = Arc::new(ScriptedBackend::default());
        let assistant = assistant_with(backend).await;
        let id = assistant.snapshot().current;

        let reply = assistant.send_message(id, "q", "  ").await.unwrap();
        assert!(reply.is_error);
        assert!(reply.text.contains("credential"));
    }

    #[tokio::test]
    async fn test_delete_tears_down_session() {
        let backend = Arc::new(ScriptedBackend::default());
        let assistant = assistant_with(backend).await;
        let first = assistant.snapshot().current;
        let second = assistant.create_project(Some("other")).await.unwrap();

        assistant.send_message(second.id, "hello", "key").await.unwrap();
        assistant.delete_project(second.id).await.unwrap();

        assert!(assistant.project(second.id).is_none());
        assert_eq!(assistant.snapshot().current, first);
    }

    #[tokio::test]
    async fn test_clear_conversation_resets_session_epoch() {
        let backend = Arc::new(ScriptedBackend::default());
        let assistant = assistant_with(backend).await;
        let id = assistant.snapshot().current;

        assistant.send_message(id, "one", "key").await.unwrap();
        assistant.clear_conversation(id).await.unwrap();
        assert!(assistant.project(id).unwrap().messages.is_empty());

        // Next turn rebuilds the session with no carried history.
        assistant.send_message(id, "two", "key").await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity_error_propagates() {
        let backend = Arc::new(ScriptedBackend::default());
        let assistant = assistant_with(backend).await;
        for i in 0..9 {
            let name = format!("p{i}");
            assistant.create_project(Some(name.as_str())).await.unwrap();
        }
        assert!(matches!(
            assistant.create_project(None).await,
            Err(AssistantError::Store(StoreError::ProjectCapReached(10)))
        ));
    }

    #[tokio::test]
    async fn test_attach_link_normalizes_scheme() {
        let backend = Arc::new(ScriptedBackend::default());
        let assistant = assistant_with(backend).await;
        let id = assistant.snapshot().current;

        let doc = assistant.attach_link(id, "example.com/x").await.unwrap();
        assert_eq!(doc.data, "https://example.com/x");
        assert_eq!(assistant.project(id).unwrap().documents.len(), 1);
    }
}
