//! Textract `AnalyzeDocument` client.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use super::{BlockGraph, OcrEngine, OcrError, QUERY_BATTERY};
use crate::sigv4::{self, Credentials};

const AMZ_TARGET: &str = "Textract.AnalyzeDocument";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Synchronous Textract client over the JSON-1.1 REST protocol.
///
/// Every call enables FORMS + TABLES + QUERIES with the fixed
/// [`QUERY_BATTERY`]; page limiting happens before bytes reach this client.
pub struct TextractEngine {
    client: reqwest::Client,
    region: String,
    /// Endpoint host override for local Textract emulators.
    endpoint: Option<String>,
    credentials: Credentials,
}

impl TextractEngine {
    pub fn new(client: reqwest::Client, region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            region: region.into(),
            endpoint: None,
            credentials,
        }
    }

    pub fn with_endpoint(mut self, host: impl Into<String>) -> Self {
        self.endpoint = Some(host.into());
        self
    }

    fn host(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("textract.{}.amazonaws.com", self.region))
    }

    fn request_body(bytes: &[u8]) -> Vec<u8> {
        let queries: Vec<_> = QUERY_BATTERY
            .iter()
            .map(|(alias, text)| json!({ "Text": text, "Alias": alias }))
            .collect();
        let body = json!({
            "Document": { "Bytes": base64::engine::general_purpose::STANDARD.encode(bytes) },
            "FeatureTypes": ["FORMS", "TABLES", "QUERIES"],
            "QueriesConfig": { "Queries": queries },
        });
        body.to_string().into_bytes()
    }
}

#[async_trait]
impl OcrEngine for TextractEngine {
    async fn analyze(&self, bytes: &[u8], mime: &str) -> Result<BlockGraph, OcrError> {
        let host = self.host();
        let body = Self::request_body(bytes);
        let sig = sigv4::sign_request(
            "POST",
            &host,
            "/",
            "",
            &[
                ("content-type".to_string(), CONTENT_TYPE.to_string()),
                ("x-amz-target".to_string(), AMZ_TARGET.to_string()),
            ],
            &body,
            &self.region,
            "textract",
            &self.credentials,
            chrono::Utc::now(),
        );

        tracing::debug!(
            "Submitting {} bytes ({}) to Textract in {}",
            bytes.len(),
            mime,
            self.region
        );

        let resp = self
            .client
            .post(format!("https://{}/", host))
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", AMZ_TARGET)
            .header("authorization", &sig.authorization)
            .header("x-amz-date", &sig.amz_date)
            .body(body)
            .send()
            .await
            .map_err(|e| OcrError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OcrError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<BlockGraph>()
            .await
            .map_err(|e| OcrError::Parse(e.to_string()))
    }
}
