//! Vision fusion: reconciling the OCR signal with an image of the document.
//!
//! A multimodal model receives the OCR queries/kvs/tables plus a downscaled
//! first-page preview and produces one schema-conformant record. It is a
//! refinement pass, not an independent source of truth: the prompt tells the
//! model to prefer the OCR query values and use the image only to
//! disambiguate layout.
//!
//! Every failure mode degrades to a deterministic fallback record built
//! from the OCR queries; fusion never aborts an analysis.

mod preview;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub use preview::first_page_jpeg;

use crate::models::{AiExtraction, ExtractionSignal};
use crate::privacy;

/// Bound on form pairs included in the prompt.
const MAX_PROMPT_KVS: usize = 40;
/// Bound on table rows included in the prompt.
const MAX_PROMPT_TABLE_ROWS: usize = 10;

const SYSTEM_PROMPT: &str = "\
You are a document analyst for a family records vault. You receive OCR output \
(query answers, form key/value pairs, table rows) and an image of the document. \
Produce a single JSON object with any of these optional fields: documentType, \
fullName, ssnMasked, idNumber, accountNumber, policyNumber, issuer, address, \
date, expiration, totalAmount, items (array of strings), confidenceNotes. \
Prefer the OCR query answers when present; use the image only to disambiguate \
layout. Omit any field you are not confident about rather than guessing. \
If you infer a Social Security Number, output it masked as XXX-XX-#### and \
never include the full number anywhere.";

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision connection error: {0}")]
    Connection(String),
    #[error("vision API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("vision response parse error: {0}")]
    Parse(String),
}

/// One part of the user message sent to the model.
pub enum ContentPart {
    Text(String),
    ImageJpeg(Vec<u8>),
}

/// A multimodal model that can answer with a JSON object.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete_json(
        &self,
        system: &str,
        parts: Vec<ContentPart>,
    ) -> Result<String, VisionError>;
}

/// Outcome of the fusion step. `model_ran` distinguishes a completed model
/// call (even one with unparseable output) from a skipped or failed call.
pub struct FusionOutcome {
    pub ai: AiExtraction,
    pub model_ran: bool,
}

/// Run vision fusion over the OCR signal, degrading on every failure.
pub async fn fuse(
    model: &dyn VisionModel,
    signal: &ExtractionSignal,
    preview_jpeg: Option<Vec<u8>>,
) -> FusionOutcome {
    let mut parts = vec![ContentPart::Text(build_user_prompt(signal))];
    match preview_jpeg {
        Some(jpeg) => parts.push(ContentPart::ImageJpeg(jpeg)),
        None => debug!("No preview image available, running text-only fusion"),
    }

    match model.complete_json(SYSTEM_PROMPT, parts).await {
        Ok(raw) => match parse_model_json(&raw) {
            Ok(mut ai) => {
                ai.ssn_masked = ai.ssn_masked.as_deref().and_then(privacy::ensure_masked);
                FusionOutcome {
                    ai,
                    model_ran: true,
                }
            }
            Err(e) => {
                warn!("Vision response was not valid JSON: {}", e);
                FusionOutcome {
                    ai: AiExtraction {
                        document_type: Some("unknown".to_string()),
                        confidence_notes: Some("model response was not valid JSON".to_string()),
                        ..Default::default()
                    },
                    model_ran: true,
                }
            }
        },
        Err(e) => {
            warn!("Vision fusion call failed: {}", e);
            let mut ai = fallback_extraction(signal);
            ai.confidence_notes = Some(format!("vision fusion failed: {}", e));
            FusionOutcome {
                ai,
                model_ran: false,
            }
        }
    }
}

/// Build the deterministic record used whenever fusion is skipped or fails:
/// a direct mapping of whichever OCR queries succeeded.
///
/// A found SSN forces the document type and issuer; the number itself only
/// ever appears masked.
pub fn fallback_extraction(signal: &ExtractionSignal) -> AiExtraction {
    let q = |alias: &str| signal.queries.get(alias).cloned();

    let mut ai = AiExtraction {
        document_type: q("document_type"),
        full_name: q("full_name"),
        issuer: q("issuer"),
        address: q("address"),
        date: q("date"),
        expiration: q("expiration"),
        total_amount: q("total"),
        id_number: q("id_or_account"),
        policy_number: q("policy_or_certificate"),
        ..Default::default()
    };

    if let Some(raw_ssn) = signal.queries.get("ssn") {
        ai.ssn_masked = privacy::mask_ssn(raw_ssn);
        ai.document_type = Some("Social Security Card".to_string());
        ai.issuer = Some("Social Security Administration".to_string());
    }

    if ai.document_type.is_none() {
        ai.document_type = Some("unknown".to_string());
    }
    ai
}

/// Render the OCR signal into the user prompt, truncated to bound cost.
fn build_user_prompt(signal: &ExtractionSignal) -> String {
    let queries: serde_json::Map<String, serde_json::Value> = signal
        .queries
        .iter()
        .filter(|(alias, _)| alias.as_str() != "ssn")
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    let kvs: Vec<_> = signal
        .kvs
        .iter()
        .take(MAX_PROMPT_KVS)
        .map(|kv| json!([kv.key, kv.value]))
        .collect();
    let rows: Vec<_> = signal
        .table_rows
        .iter()
        .take(MAX_PROMPT_TABLE_ROWS)
        .collect();

    format!(
        "OCR query answers:\n{}\n\nForm key/value pairs:\n{}\n\nTable rows:\n{}\n\n\
         Normalize this document into the JSON schema.",
        serde_json::Value::Object(queries),
        json!(kvs),
        json!(rows),
    )
}

fn parse_model_json(raw: &str) -> Result<AiExtraction, serde_json::Error> {
    // Some models wrap JSON in markdown fences despite the response format.
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(trimmed)
}

/// OpenAI-style chat-completions client with an image content part.
pub struct OpenAiVision {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

/// Chat-completions response envelope (only the fields we read).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiVision {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Override the API base URL (OpenAI-compatible gateways).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    async fn complete_json(
        &self,
        system: &str,
        parts: Vec<ContentPart>,
    ) -> Result<String, VisionError> {
        let content: Vec<serde_json::Value> = parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                ContentPart::ImageJpeg(bytes) => {
                    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
                    json!({
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{}", data) }
                    })
                }
            })
            .collect();

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": content }
            ],
        });

        let url = format!("{}/chat/completions", self.endpoint);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| VisionError::Parse("response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedVision {
        response: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl CannedVision {
        fn ok(raw: &str) -> Self {
            Self {
                response: Ok(raw.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VisionModel for CannedVision {
        async fn complete_json(
            &self,
            _system: &str,
            _parts: Vec<ContentPart>,
        ) -> Result<String, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .map_err(|_| VisionError::Connection("refused".to_string()))
        }
    }

    fn signal_with(entries: &[(&str, &str)]) -> ExtractionSignal {
        let mut signal = ExtractionSignal::default();
        for (k, v) in entries {
            signal.queries.insert(k.to_string(), v.to_string());
        }
        signal
    }

    #[tokio::test]
    async fn fusion_parses_model_output() {
        let model = CannedVision::ok(r#"{"documentType":"Passport","issuer":"US Department of State"}"#);
        let outcome = fuse(&model, &ExtractionSignal::default(), None).await;
        assert!(outcome.model_ran);
        assert_eq!(outcome.ai.document_type.as_deref(), Some("Passport"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fusion_strips_markdown_fences() {
        let model = CannedVision::ok("```json\n{\"documentType\":\"Invoice\"}\n```");
        let outcome = fuse(&model, &ExtractionSignal::default(), None).await;
        assert_eq!(outcome.ai.document_type.as_deref(), Some("Invoice"));
    }

    #[tokio::test]
    async fn fusion_remasks_model_ssn_output() {
        // The model is told to mask, but a raw SSN coming back must still
        // never survive.
        let model = CannedVision::ok(r#"{"documentType":"SSN Card","ssnMasked":"123-45-6789"}"#);
        let outcome = fuse(&model, &ExtractionSignal::default(), None).await;
        assert_eq!(outcome.ai.ssn_masked.as_deref(), Some("XXX-XX-6789"));
    }

    #[tokio::test]
    async fn invalid_json_degrades_to_unknown_stub() {
        let model = CannedVision::ok("definitely not json");
        let outcome = fuse(&model, &ExtractionSignal::default(), None).await;
        assert!(outcome.model_ran);
        assert_eq!(outcome.ai.document_type.as_deref(), Some("unknown"));
        assert!(outcome.ai.confidence_notes.is_some());
    }

    #[tokio::test]
    async fn call_failure_degrades_to_query_fallback() {
        let model = CannedVision::failing();
        let signal = signal_with(&[("document_type", "Deed"), ("issuer", "County Clerk")]);
        let outcome = fuse(&model, &signal, None).await;
        assert!(!outcome.model_ran);
        assert_eq!(outcome.ai.document_type.as_deref(), Some("Deed"));
        assert!(outcome
            .ai
            .confidence_notes
            .as_deref()
            .unwrap()
            .contains("vision fusion failed"));
    }

    #[test]
    fn fallback_maps_query_aliases() {
        let signal = signal_with(&[
            ("document_type", "Vehicle Title"),
            ("full_name", "Jane Q. Smith"),
            ("id_or_account", "TITLE-5521"),
            ("total", "$120.00"),
        ]);
        let ai = fallback_extraction(&signal);
        assert_eq!(ai.document_type.as_deref(), Some("Vehicle Title"));
        assert_eq!(ai.full_name.as_deref(), Some("Jane Q. Smith"));
        assert_eq!(ai.id_number.as_deref(), Some("TITLE-5521"));
        assert_eq!(ai.total_amount.as_deref(), Some("$120.00"));
    }

    #[test]
    fn fallback_forces_ssn_card_identity() {
        let signal = signal_with(&[("document_type", "Letter"), ("ssn", "123456789")]);
        let ai = fallback_extraction(&signal);
        assert_eq!(ai.document_type.as_deref(), Some("Social Security Card"));
        assert_eq!(ai.issuer.as_deref(), Some("Social Security Administration"));
        assert_eq!(ai.ssn_masked.as_deref(), Some("XXX-XX-6789"));
    }

    #[test]
    fn fallback_defaults_document_type_to_unknown() {
        let ai = fallback_extraction(&ExtractionSignal::default());
        assert_eq!(ai.document_type.as_deref(), Some("unknown"));
        assert!(ai.ssn_masked.is_none());
    }

    #[test]
    fn prompt_truncates_and_omits_raw_ssn() {
        let mut signal = signal_with(&[("ssn", "123456789"), ("issuer", "SSA")]);
        for i in 0..60 {
            signal
                .kvs
                .push(KeyValue::new(format!("k{}", i), format!("v{}", i)));
        }
        for i in 0..20 {
            signal.table_rows.push(vec![format!("row{}", i)]);
        }

        let prompt = build_user_prompt(&signal);
        assert!(!prompt.contains("123456789"));
        assert!(prompt.contains("issuer"));
        assert!(prompt.contains("k39"));
        assert!(!prompt.contains("k40"));
        assert!(prompt.contains("row9"));
        assert!(!prompt.contains("row10"));
    }
}
