//! Gemini REST API implementation of the generative backend.
//!
//! Calls `models/{model}:generateContent` directly over HTTP. Response
//! shapes are modeled as optional-field structs with defaults; nothing is
//! shape-sniffed at runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AssistantConfig;
use crate::project::model::GroundingReference;

use super::{BackendError, GenerativeBackend, RequestPart, TurnRequest, TurnResponse};

/// Title used when a grounding chunk carries no title of its own.
pub const GENERIC_SOURCE_TITLE: &str = "Web Source";

/// HTTP client for the Gemini `generateContent` endpoint.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl GeminiBackend {
    /// Create a backend from the assistant configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &AssistantConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(
        &self,
        credential: &str,
        request: TurnRequest,
    ) -> Result<TurnResponse, BackendError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base, self.model
        );
        let body = GenerateContentRequest::from_turn(&request);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status,
                message: extract_error_message(&body_text),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_turn_response(parsed)
    }
}

/// Pull the human-readable message out of an API error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| {
            let status = wrapper.error.status.unwrap_or_default();
            let message = wrapper.error.message?;
            Some(if status.is_empty() {
                message
            } else {
                format!("{status}: {message}")
            })
        })
        .unwrap_or_else(|| body.to_string())
}

/// Flatten a parsed response into text plus grounding references.
fn extract_turn_response(response: GenerateContentResponse) -> Result<TurnResponse, BackendError> {
    let candidate = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or(BackendError::EmptyResponse)?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty())
        .ok_or(BackendError::EmptyResponse)?;

    let grounding = candidate
        .grounding_metadata
        .map(|metadata| {
            metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| {
                    let web = chunk.web?;
                    Some(GroundingReference {
                        title: web
                            .title
                            .filter(|t| !t.is_empty())
                            .unwrap_or_else(|| GENERIC_SOURCE_TITLE.to_string()),
                        uri: web.uri?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(TurnResponse { text, grounding })
}

// Wire structures for the generateContent endpoint.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn from_turn(request: &TurnRequest) -> Self {
        let contents = request
            .contents
            .iter()
            .map(|turn| Content {
                role: turn.role.clone(),
                parts: turn.parts.iter().map(Part::from_request).collect(),
            })
            .collect();

        let system_instruction = (!request.system_instruction.is_empty()).then(|| Content {
            role: "system".to_string(),
            parts: vec![Part::Text {
                text: request.system_instruction.clone(),
            }],
        });

        let tools = if request.web_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };

        Self {
            contents,
            system_instruction,
            tools,
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

impl Part {
    fn from_request(part: &RequestPart) -> Self {
        match part {
            RequestPart::Text(text) => Self::Text { text: text.clone() },
            RequestPart::InlineData { mime_type, data } => Self::InlineData {
                inline_data: InlineDataPayload {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Deserialize)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_and_grounding_extracted() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Answer "}, {"text": "body."}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://example.com/a", "title": "Example"}},
                        {"web": {"uri": "https://example.com/b"}},
                        {"web": {}}
                    ]
                }
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let turn = extract_turn_response(parsed).unwrap();
        assert_eq!(turn.text, "Answer body.");
        assert_eq!(turn.grounding.len(), 2);
        assert_eq!(turn.grounding[0].title, "Example");
        assert_eq!(turn.grounding[1].title, GENERIC_SOURCE_TITLE);
    }

    #[test]
    fn test_empty_candidates_is_empty_response() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            extract_turn_response(parsed),
            Err(BackendError::EmptyResponse)
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(
            extract_error_message(body),
            "INVALID_ARGUMENT: API key not valid."
        );
        assert_eq!(extract_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = TurnRequest {
            system_instruction: "Be precise.".to_string(),
            contents: vec![crate::backend::TurnContent::user(vec![
                RequestPart::InlineData {
                    mime_type: "application/pdf".to_string(),
                    data: "QUJD".to_string(),
                },
                RequestPart::Text("What does the attached deed say?".to_string()),
            ])],
            temperature: 0.2,
            web_search: true,
        };
        let body = GenerateContentRequest::from_turn(&request);
        let json = serde_json::to_value(&body).unwrap();
        let temperature = json["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.2).abs() < 1e-6);
        assert!(json["tools"][0]["google_search"].is_object());
        assert_eq!(
            json["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "application/pdf"
        );
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be precise.");
    }
}
