//! SQLite-backed key-value persistence for application state.
//!
//! Two keys are persisted: the full project collection (with the current
//! project pointer) and the last-used credential. Malformed stored state
//! falls back to a fresh default rather than failing startup.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::ids::ProjectId;
use crate::project::model::Project;
use crate::project::store::Snapshot;

/// Key under which the project collection is stored.
const PROJECTS_KEY: &str = "projects";

/// Key under which the last-used credential is stored.
const CREDENTIAL_KEY: &str = "api_key";

/// Error type for persisted-state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// `SQLite` storage error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for persisted-state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Project collection as persisted on disk.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedProjects {
    /// Projects in display order.
    pub projects: Vec<Project>,
    /// Current project pointer.
    pub current: Option<ProjectId>,
}

/// SQLite key-value store holding the persisted application state.
pub struct StateStore {
    conn: Arc<Connection>,
}

impl StateStore {
    /// Table name for the key-value pairs.
    pub const TABLE: &'static str = "app_state";

    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &str) -> StateResult<Self> {
        let conn = Connection::open(path.to_string()).await?;
        Self::init(Arc::new(conn)).await
    }

    /// Open an in-memory store. Used by tests.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> StateResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(Arc::new(conn)).await
    }

    async fn init(conn: Arc<Connection>) -> StateResult<Self> {
        conn.call(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );",
                Self::TABLE
            ))?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Persist the whole project collection.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub async fn save_projects(&self, snapshot: &Snapshot) -> StateResult<()> {
        let persisted = PersistedProjects {
            projects: snapshot.projects.clone(),
            current: Some(snapshot.current),
        };
        let json = serde_json::to_string(&persisted)?;
        self.put(PROJECTS_KEY, json).await
    }

    /// Load the persisted project collection.
    ///
    /// Returns `None` when nothing was stored or the stored JSON is
    /// malformed; the caller falls back to a fresh default project.
    pub async fn load_projects(&self) -> Option<PersistedProjects> {
        let raw = match self.get(PROJECTS_KEY).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!("Could not read persisted projects: {err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(persisted) => Some(persisted),
            Err(err) => {
                warn!("Persisted projects are malformed, starting fresh: {err}");
                None
            }
        }
    }

    /// Persist the last-used credential.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn save_credential(&self, credential: &str) -> StateResult<()> {
        self.put(CREDENTIAL_KEY, credential.to_string()).await
    }

    /// Load the last-used credential, if any.
    pub async fn load_credential(&self) -> Option<String> {
        match self.get(CREDENTIAL_KEY).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(err) => {
                warn!("Could not read persisted credential: {err}");
                None
            }
        }
    }

    async fn put(&self, key: &'static str, value: String) -> StateResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        Self::TABLE
                    ),
                    rusqlite::params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &'static str) -> StateResult<Option<String>> {
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        &format!("SELECT value FROM {} WHERE key = ?1", Self::TABLE),
                        rusqlite::params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }
}
