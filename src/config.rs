//! Configuration for the assistant coordination core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding the fallback backend credential.
pub const CREDENTIAL_ENV_VAR: &str = "GEMINI_API_KEY";

/// Configuration for the assistant service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Backend model identifier.
    pub model: String,
    /// Base URL of the generative backend API.
    pub api_base: String,
    /// Generation temperature. Kept low to favor citation accuracy over
    /// prose variety.
    pub temperature: f32,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Maximum number of projects a user may hold.
    pub max_projects: usize,
    /// Maximum number of files accepted in a single ingestion batch.
    pub max_batch_files: usize,
    /// URL of the knowledge-base catalog JSON.
    pub index_url: String,
    /// Path of the SQLite database holding persisted state.
    pub state_db_path: String,
    /// Fallback credential used when the caller supplies none.
    pub default_credential: Option<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.2,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            max_projects: 10,
            max_batch_files: 50,
            index_url: "https://lexcitator.app/law_resource_index.json".to_string(),
            state_db_path: "lexcitator.db".to_string(),
            default_credential: None,
        }
    }
}

impl AssistantConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with environment overrides applied.
    ///
    /// Reads `LEXCITATOR_MODEL`, `LEXCITATOR_API_BASE`, `LEXCITATOR_INDEX_URL`,
    /// `LEXCITATOR_DB` and the fallback credential from [`CREDENTIAL_ENV_VAR`].
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("LEXCITATOR_MODEL") {
            config.model = model;
        }
        if let Ok(base) = std::env::var("LEXCITATOR_API_BASE") {
            config.api_base = base;
        }
        if let Ok(url) = std::env::var("LEXCITATOR_INDEX_URL") {
            config.index_url = url;
        }
        if let Ok(path) = std::env::var("LEXCITATOR_DB") {
            config.state_db_path = path;
        }
        config.default_credential = std::env::var(CREDENTIAL_ENV_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty());
        config
    }

    /// Set the backend model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the backend API base URL.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the fallback credential.
    #[must_use]
    pub fn with_default_credential(mut self, key: impl Into<String>) -> Self {
        self.default_credential = Some(key.into());
        self
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
