//! Generative backend boundary.
//!
//! The backend is a black-box capability: send a turn with attached
//! binary/text parts plus a system instruction, receive text plus optional
//! grounding references. The HTTP implementation lives in [`gemini`].

pub mod gemini;

pub use gemini::GeminiBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::project::model::GroundingReference;

/// Errors from the generative backend boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level HTTP failure.
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("backend error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// The API answered successfully but carried no text.
    #[error("backend returned no text in the response candidates")]
    EmptyResponse,
}

impl BackendError {
    /// Whether this error signals an authorization or credential problem.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                matches!(status, 401 | 403)
                    || message.contains("API key")
                    || message.contains("API_KEY_INVALID")
                    || message.contains("PERMISSION_DENIED")
                    || message.contains("UNAUTHENTICATED")
            }
            _ => false,
        }
    }
}

/// One part of an outbound turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestPart {
    /// Plain text.
    Text(String),
    /// Inline binary content, base64-encoded.
    InlineData {
        /// Declared MIME type.
        mime_type: String,
        /// Base64 payload.
        data: String,
    },
}

/// One turn of conversation content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnContent {
    /// `"user"` or `"model"`.
    pub role: String,
    /// Ordered parts.
    pub parts: Vec<RequestPart>,
}

impl TurnContent {
    /// Build a user turn.
    #[must_use]
    pub fn user(parts: Vec<RequestPart>) -> Self {
        Self {
            role: "user".to_string(),
            parts,
        }
    }

    /// Build a model turn with one text part.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![RequestPart::Text(text.into())],
        }
    }
}

/// A fully composed backend request.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    /// System instruction text.
    pub system_instruction: String,
    /// Conversation history plus the current turn, in order.
    pub contents: Vec<TurnContent>,
    /// Generation temperature.
    pub temperature: f32,
    /// Whether backend web-search grounding is enabled.
    pub web_search: bool,
}

/// The backend's answer to one turn.
#[derive(Clone, Debug)]
pub struct TurnResponse {
    /// Response text, verbatim.
    pub text: String,
    /// Web sources the backend consulted.
    pub grounding: Vec<GroundingReference>,
}

/// A conversational generative backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Send one turn and await the full response.
    ///
    /// # Errors
    /// Returns a [`BackendError`] on transport failure, API rejection, or an
    /// empty response.
    async fn generate(
        &self,
        credential: &str,
        request: TurnRequest,
    ) -> Result<TurnResponse, BackendError>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted backend for exercising session logic without the network.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{BackendError, GenerativeBackend, TurnRequest, TurnResponse};

    /// One recorded call to the scripted backend.
    #[derive(Clone, Debug)]
    pub struct RecordedCall {
        /// Credential the call was made with.
        pub credential: String,
        /// The composed request.
        pub request: TurnRequest,
    }

    /// Backend that replays queued responses and records every call.
    #[derive(Default)]
    pub struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<TurnResponse, BackendError>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedBackend {
        /// Queue a successful response.
        pub fn push_text(&self, text: &str) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(TurnResponse {
                    text: text.to_string(),
                    grounding: Vec::new(),
                }));
        }

        /// Queue a failure.
        pub fn push_error(&self, error: BackendError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        /// Calls recorded so far.
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate(
            &self,
            credential: &str,
            request: TurnRequest,
        ) -> Result<TurnResponse, BackendError> {
            self.calls.lock().unwrap().push(RecordedCall {
                credential: credential.to_string(),
                request,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(TurnResponse {
                        text: "ok".to_string(),
                        grounding: Vec::new(),
                    })
                })
        }
    }
}
