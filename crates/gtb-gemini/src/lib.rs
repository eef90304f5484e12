//! Google Gemini adapter for the core `ModelClient` port.
//!
//! Talks to the `generateContent` REST endpoint
//! (`{base}/models/{id}:generateContent`, API key as query parameter) and
//! translates the wire response into the core outcome model: answered text,
//! safety block, or empty. HTTP and transport failures are classified into
//! `InvocationErrorKind` by status code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gtb_core::model::{
    client::ModelClient,
    types::{GenerateOutcome, GenerateRequest, InvocationError, InvocationErrorKind},
};

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> gtb_core::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| gtb_core::Error::External(format!("http client init: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> std::result::Result<GenerateOutcome, InvocationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, req.model_api_id
        );

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: req.prompt }],
            }],
            system_instruction: req.system_instruction.map(|text| Instruction {
                parts: vec![Part { text }],
            }),
        };

        tracing::debug!(model = %req.model_api_id, "calling generateContent");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &detail));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| InvocationError::new(InvocationErrorKind::Unknown, e.to_string()))?;

        Ok(translate(parsed))
    }
}

fn classify_transport(e: reqwest::Error) -> InvocationError {
    let kind = if e.is_timeout() || e.is_connect() {
        InvocationErrorKind::Transient
    } else {
        InvocationErrorKind::Unknown
    };
    InvocationError::new(kind, e.to_string())
}

fn classify_status(status: u16, detail: &str) -> InvocationError {
    let kind = match status {
        401 | 403 => InvocationErrorKind::Credentials,
        429 => InvocationErrorKind::Quota,
        500..=599 => InvocationErrorKind::Transient,
        _ => InvocationErrorKind::Unknown,
    };
    InvocationError::new(kind, format!("Gemini API error {status}: {detail}"))
}

/// Map one wire response to one outcome. All string-sniffing of safety
/// signals happens here and nowhere else.
fn translate(resp: GenerateContentResponse) -> GenerateOutcome {
    if let Some(feedback) = resp.prompt_feedback {
        if feedback.block_reason.is_some() {
            return GenerateOutcome::Blocked {
                reason: feedback.block_reason,
            };
        }
    }

    let Some(candidate) = resp.candidates.and_then(|mut c| {
        if c.is_empty() {
            None
        } else {
            Some(c.remove(0))
        }
    }) else {
        return GenerateOutcome::Empty;
    };

    if let Some(reason) = &candidate.finish_reason {
        if matches!(reason.as_str(), "SAFETY" | "PROHIBITED_CONTENT" | "RECITATION") {
            return GenerateOutcome::Blocked {
                reason: Some(reason.clone()),
            };
        }
    }

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        GenerateOutcome::Empty
    } else {
        GenerateOutcome::Answered { text }
    }
}

// Wire types for `generateContent`.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn answered_response_joins_parts() {
        let resp = parse(
            r#"{
                "candidates": [{
                    "content": {"parts": [{"text": "Hello, "}, {"text": "world."}], "role": "model"},
                    "finishReason": "STOP"
                }]
            }"#,
        );
        assert_eq!(
            translate(resp),
            GenerateOutcome::Answered {
                text: "Hello, world.".to_string()
            }
        );
    }

    #[test]
    fn prompt_feedback_block_wins_over_candidates() {
        let resp = parse(
            r#"{
                "candidates": [{
                    "content": {"parts": [{"text": "partial"}], "role": "model"},
                    "finishReason": "STOP"
                }],
                "promptFeedback": {"blockReason": "SAFETY"}
            }"#,
        );
        assert_eq!(
            translate(resp),
            GenerateOutcome::Blocked {
                reason: Some("SAFETY".to_string())
            }
        );
    }

    #[test]
    fn safety_finish_reason_is_blocked() {
        let resp = parse(
            r#"{"candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]}"#,
        );
        assert_eq!(
            translate(resp),
            GenerateOutcome::Blocked {
                reason: Some("SAFETY".to_string())
            }
        );
    }

    #[test]
    fn missing_candidates_is_empty() {
        assert_eq!(translate(parse("{}")), GenerateOutcome::Empty);
        assert_eq!(translate(parse(r#"{"candidates": []}"#)), GenerateOutcome::Empty);
    }

    #[test]
    fn candidate_without_text_is_empty() {
        let resp = parse(r#"{"candidates": [{"finishReason": "STOP"}]}"#);
        assert_eq!(translate(resp), GenerateOutcome::Empty);
    }

    #[test]
    fn status_codes_classify_as_expected() {
        assert_eq!(classify_status(401, "").kind, InvocationErrorKind::Credentials);
        assert_eq!(classify_status(403, "").kind, InvocationErrorKind::Credentials);
        assert_eq!(classify_status(429, "").kind, InvocationErrorKind::Quota);
        assert_eq!(classify_status(500, "").kind, InvocationErrorKind::Transient);
        assert_eq!(classify_status(503, "").kind, InvocationErrorKind::Transient);
        assert_eq!(classify_status(400, "").kind, InvocationErrorKind::Unknown);
    }

    #[test]
    fn request_serializes_camel_case_and_omits_empty_instruction() {
        let with = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: "hi".to_string(),
                }],
            }],
            system_instruction: Some(Instruction {
                parts: vec![Part {
                    text: "be terse".to_string(),
                }],
            }),
        };
        let json = serde_json::to_value(&with).unwrap();
        assert!(json.get("systemInstruction").is_some());

        let without = GenerateContentRequest {
            contents: Vec::new(),
            system_instruction: None,
        };
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }
}
