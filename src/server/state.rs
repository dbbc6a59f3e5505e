//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::assistant::Assistant;
use crate::backend::GeminiBackend;
use crate::config::AssistantConfig;
use crate::storage::StateStore;

/// Fallback system instruction when the deployment provides none.
const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a meticulous legal research assistant. Ground every answer in \
     verifiable sources and embed citations in the required inline format.";

/// Shared application state.
pub struct AppState {
    /// The assembled coordination core.
    pub assistant: Assistant,
}

impl AppState {
    /// Create the application state: build the backend client, open the
    /// persisted store, and restore projects.
    ///
    /// # Errors
    /// Returns an error if storage or the backend client cannot be created.
    pub async fn new(
        config: AssistantConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let backend = GeminiBackend::new(&config)
            .map_err(|e| format!("Failed to create backend client: {e}"))?;
        let state_store = StateStore::open(&config.state_db_path)
            .await
            .map_err(|e| format!("Failed to open state store: {e}"))?;

        let system_instruction = std::env::var("LEXCITATOR_SYSTEM_PROMPT")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let assistant = Assistant::new(
            config,
            Arc::new(backend),
            Some(state_store),
            system_instruction,
        )
        .await
        .map_err(|e| format!("Failed to assemble assistant: {e}"))?;

        Ok(Arc::new(Self { assistant }))
    }
}
