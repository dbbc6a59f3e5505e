//! In-memory project collection with snapshot semantics.
//!
//! The store is the single source of truth for the project collection and
//! the current project pointer. Every mutation is a whole-collection
//! copy-and-replace behind one lock, so concurrent readers always observe a
//! consistent snapshot.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use thiserror::Error;

use crate::ids::{DocumentId, MessageId, ProjectId};

use super::model::{ChatMessage, Document, Project};

/// Error type for project store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The project cap was reached; no project was created.
    #[error("project limit reached ({0} max)")]
    ProjectCapReached(usize),
    /// The last remaining project cannot be deleted.
    #[error("cannot delete the last remaining project")]
    LastProject,
    /// No project with the given id exists.
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),
    /// No message with the given id exists in the project.
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),
}

/// Result type for project store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Immutable view of the collection at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Projects in display order.
    pub projects: Vec<Project>,
    /// Id of the current project. Always present in `projects`.
    pub current: ProjectId,
}

/// Project collection with a current-project pointer.
pub struct ProjectStore {
    state: RwLock<Arc<Snapshot>>,
    max_projects: usize,
}

impl ProjectStore {
    /// Create a store seeded with a single default project.
    #[must_use]
    pub fn new(max_projects: usize) -> Self {
        let seed = Project::new(None);
        let current = seed.id;
        Self {
            state: RwLock::new(Arc::new(Snapshot {
                projects: vec![seed],
                current,
            })),
            max_projects,
        }
    }

    /// Restore a store from previously persisted projects.
    ///
    /// An empty collection or a dangling current pointer falls back to a
    /// single fresh default project.
    #[must_use]
    pub fn from_parts(projects: Vec<Project>, current: Option<ProjectId>, max_projects: usize) -> Self {
        let mut projects = projects;
        projects.truncate(max_projects);
        if projects.is_empty() {
            return Self::new(max_projects);
        }
        let current = current
            .filter(|id| projects.iter().any(|p| p.id == *id))
            .unwrap_or(projects[0].id);
        Self {
            state: RwLock::new(Arc::new(Snapshot { projects, current })),
            max_projects,
        }
    }

    /// Current snapshot of the whole collection.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Look up one project by id.
    #[must_use]
    pub fn get(&self, id: ProjectId) -> Option<Project> {
        self.snapshot().projects.iter().find(|p| p.id == id).cloned()
    }

    /// The current project.
    #[must_use]
    pub fn current(&self) -> Project {
        let snapshot = self.snapshot();
        snapshot
            .projects
            .iter()
            .find(|p| p.id == snapshot.current)
            .cloned()
            // The invariants guarantee the pointer targets a live project.
            .unwrap_or_else(|| snapshot.projects[0].clone())
    }

    /// Whether a project with this id exists.
    #[must_use]
    pub fn contains(&self, id: ProjectId) -> bool {
        self.snapshot().projects.iter().any(|p| p.id == id)
    }

    /// Number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().projects.len()
    }

    /// Whether the store holds no projects. Always false by invariant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new project and make it current.
    ///
    /// # Errors
    /// Returns [`StoreError::ProjectCapReached`] when the cap is hit; the
    /// collection is left unchanged.
    pub fn create(&self, name: Option<&str>) -> StoreResult<Project> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if guard.projects.len() >= self.max_projects {
            return Err(StoreError::ProjectCapReached(self.max_projects));
        }
        let project = Project::new(name);
        let mut projects = guard.projects.clone();
        projects.insert(0, project.clone());
        *guard = Arc::new(Snapshot {
            projects,
            current: project.id,
        });
        Ok(project)
    }

    /// Delete a project. The current pointer moves to the first remaining
    /// project when the deleted one was current.
    ///
    /// # Errors
    /// Returns [`StoreError::LastProject`] when only one project remains, or
    /// [`StoreError::UnknownProject`] for a missing id.
    pub fn delete(&self, id: ProjectId) -> StoreResult<()> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if guard.projects.len() <= 1 {
            return Err(StoreError::LastProject);
        }
        if !guard.projects.iter().any(|p| p.id == id) {
            return Err(StoreError::UnknownProject(id));
        }
        let projects: Vec<Project> = guard
            .projects
            .iter()
            .filter(|p| p.id != id)
            .cloned()
            .collect();
        let current = if guard.current == id {
            projects[0].id
        } else {
            guard.current
        };
        *guard = Arc::new(Snapshot { projects, current });
        Ok(())
    }

    /// Make another project current. Does not touch any session.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn switch_current(&self, id: ProjectId) -> StoreResult<()> {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !guard.projects.iter().any(|p| p.id == id) {
            return Err(StoreError::UnknownProject(id));
        }
        let projects = guard.projects.clone();
        *guard = Arc::new(Snapshot {
            projects,
            current: id,
        });
        Ok(())
    }

    /// Rename a project.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn rename(&self, id: ProjectId, name: &str) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.name = name.trim().to_string();
            Ok(())
        })
    }

    /// Flip the cross-memory flag.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn toggle_cross_memory(&self, id: ProjectId) -> StoreResult<bool> {
        let mut flag = false;
        self.mutate(id, |project| {
            project.cross_memory = !project.cross_memory;
            flag = project.cross_memory;
            Ok(())
        })?;
        Ok(flag)
    }

    /// Append a message to a project's conversation.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn append_message(&self, id: ProjectId, message: ChatMessage) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.messages.push(message);
            Ok(())
        })
    }

    /// Replace a project's document list.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn replace_documents(&self, id: ProjectId, docs: Vec<Document>) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.documents = docs;
            Ok(())
        })
    }

    /// Append documents to a project's document list. Never deduplicates.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn add_documents(&self, id: ProjectId, docs: Vec<Document>) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.documents.extend(docs);
            Ok(())
        })
    }

    /// Remove one document by id. A missing document id is a no-op.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing project id.
    pub fn remove_document(&self, id: ProjectId, doc_id: DocumentId) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.documents.retain(|d| d.id != doc_id);
            Ok(())
        })
    }

    /// Clear a project's conversation history.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] for a missing id.
    pub fn clear_messages(&self, id: ProjectId) -> StoreResult<()> {
        self.mutate(id, |project| {
            project.messages.clear();
            Ok(())
        })
    }

    /// Replace the text of a past user message and drop every later message.
    ///
    /// Callers are expected to also reset the project's session so the next
    /// turn rebuilds from the edited history.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownProject`] or [`StoreError::UnknownMessage`].
    pub fn edit_message(
        &self,
        id: ProjectId,
        message_id: MessageId,
        text: &str,
    ) -> StoreResult<()> {
        self.mutate(id, |project| {
            let index = project
                .messages
                .iter()
                .position(|m| m.id == message_id)
                .ok_or(StoreError::UnknownMessage(message_id))?;
            project.messages.truncate(index + 1);
            if let Some(message) = project.messages.last_mut() {
                message.text = text.to_string();
            }
            Ok(())
        })
    }

    /// Apply one mutation to one project under the write lock, refreshing
    /// `updated_at` and swapping in a fresh snapshot.
    fn mutate<F>(&self, id: ProjectId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Project) -> StoreResult<()>,
    {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut projects = guard.projects.clone();
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::UnknownProject(id))?;
        f(project)?;
        project.updated_at = Utc::now();
        let current = guard.current;
        *guard = Arc::new(Snapshot { projects, current });
        Ok(())
    }
}
