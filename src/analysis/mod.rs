//! The analysis orchestrator.
//!
//! Sequences byte load, page limiting, OCR, and vision fusion into one
//! linear flow with no retries. Every stage after the byte load degrades
//! rather than fails: the caller always receives a well-formed result, and
//! only an unrecoverable storage error propagates.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{AnalysisMetadata, AnalysisResult, ExtractionSignal};
use crate::ocr::{self, OcrEngine, TextractEngine};
use crate::pdf;
use crate::privacy;
use crate::storage::{ObjectStore, S3Store, StorageError, StoredObject};
use crate::vision::{self, OpenAiVision, VisionModel};

/// Pages submitted to OCR in preview mode.
pub const PREVIEW_PAGE_CAP: usize = 1;
/// Pages submitted to OCR in full mode.
pub const FULL_PAGE_CAP: usize = 10;

/// Per-request options.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Limit OCR to page 1 and skip vision fusion entirely.
    pub preview_only: bool,
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Document analyzer with explicitly injected collaborators.
///
/// Clients are constructed once and shared across requests; the analyzer
/// itself holds no per-request state.
pub struct Analyzer {
    store: Option<Arc<dyn ObjectStore>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    vision: Option<Arc<dyn VisionModel>>,
    region: String,
}

impl Analyzer {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            store: None,
            ocr: None,
            vision: None,
            region: region.into(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_vision(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.vision = Some(model);
        self
    }

    /// Build production clients from settings, enabling each stage only
    /// when its capability resolved at startup.
    pub fn from_settings(settings: &Settings) -> Self {
        let caps = settings.capabilities();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout))
            .build()
            .expect("Failed to create HTTP client");

        let mut analyzer = Self::new(settings.region.clone());

        if caps.storage {
            // Capability implies both are present.
            if let (Some(bucket), Some(creds)) = (&settings.bucket, settings.credentials()) {
                let mut store = S3Store::new(client.clone(), bucket, &settings.region, creds);
                if let Some(endpoint) = &settings.s3_endpoint {
                    store = store.with_endpoint(endpoint);
                }
                analyzer = analyzer.with_store(Arc::new(store));
            }
        }
        if caps.ocr {
            if let Some(creds) = settings.credentials() {
                let mut engine = TextractEngine::new(client.clone(), &settings.region, creds);
                if let Some(endpoint) = &settings.textract_endpoint {
                    engine = engine.with_endpoint(endpoint);
                }
                analyzer = analyzer.with_ocr(Arc::new(engine));
            }
        }
        if caps.vision {
            if let Some(key) = &settings.vision_api_key {
                let mut model = OpenAiVision::new(client, key, &settings.vision_model);
                if let Some(endpoint) = &settings.vision_endpoint {
                    model = model.with_endpoint(endpoint);
                }
                analyzer = analyzer.with_vision(Arc::new(model));
            }
        }
        analyzer
    }

    /// Analyze one document.
    ///
    /// Returns `Err` only when the bytes cannot be fetched at all; every
    /// other failure is folded into the returned result's metadata.
    pub async fn analyze(
        &self,
        key: &str,
        options: &AnalyzeOptions,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let Some(store) = &self.store else {
            warn!("Analysis requested but object storage is not configured");
            return Ok(self.failure_result(key, "", "object storage is not configured", options));
        };

        let object = store.get(key).await?;
        info!(
            "Analyzing {} ({}, {} bytes, preview={})",
            key,
            object.mime,
            object.bytes.len(),
            options.preview_only
        );

        Ok(self.run_pipeline(key, object, options).await)
    }

    async fn run_pipeline(
        &self,
        key: &str,
        object: StoredObject,
        options: &AnalyzeOptions,
    ) -> AnalysisResult {
        let page_cap = if options.preview_only {
            PREVIEW_PAGE_CAP
        } else {
            FULL_PAGE_CAP
        };
        let bytes = if object.mime == "application/pdf" {
            pdf::limit_pages(&object.bytes, page_cap)
        } else {
            object.bytes
        };

        let (signal, textract_success) = match &self.ocr {
            Some(engine) => match engine.analyze(&bytes, &object.mime).await {
                Ok(graph) => (ocr::signal_with_ssn_fallback(&graph), true),
                Err(e) => {
                    warn!("OCR failed, continuing with empty signal: {}", e);
                    (ExtractionSignal::default(), false)
                }
            },
            None => {
                debug!("OCR disabled, continuing with empty signal");
                (ExtractionSignal::default(), false)
            }
        };

        // The masked SSN is computed here, independently of which branch
        // below produces the `ai` record.
        let ssn_masked = signal
            .queries
            .get("ssn")
            .and_then(|raw| privacy::mask_ssn(raw));

        let (mut ai, fusion_ran) = match (&self.vision, options.preview_only) {
            (Some(model), false) => {
                let preview = vision::first_page_jpeg(&bytes, &object.mime);
                let outcome = vision::fuse(model.as_ref(), &signal, preview).await;
                (outcome.ai, outcome.model_ran)
            }
            _ => (vision::fallback_extraction(&signal), false),
        };

        // Masking is guaranteed regardless of branch taken: overwrite with
        // the independently computed value, or sanitize whatever the model
        // produced.
        ai.ssn_masked = match &ssn_masked {
            Some(masked) => Some(masked.clone()),
            None => ai.ssn_masked.as_deref().and_then(privacy::ensure_masked),
        };

        let mut queries = signal.queries;
        queries.remove("ssn");
        if let Some(masked) = &ssn_masked {
            queries.insert("ssnMasked".to_string(), masked.clone());
        }

        AnalysisResult {
            document_key: key.to_string(),
            mime: object.mime,
            queries,
            kvs: signal.kvs,
            table_rows: signal.table_rows,
            ai,
            metadata: AnalysisMetadata {
                analysis_id: Uuid::new_v4().to_string(),
                textract_success,
                vision_fusion_used: fusion_ran,
                preview_mode: options.preview_only,
                region: self.region.clone(),
                analyzed_at: Utc::now(),
                error: None,
            },
        }
    }

    /// Structured failure shape: empty extraction fields, error recorded in
    /// metadata, never an exception to the caller.
    fn failure_result(
        &self,
        key: &str,
        mime: &str,
        error: &str,
        options: &AnalyzeOptions,
    ) -> AnalysisResult {
        AnalysisResult {
            document_key: key.to_string(),
            mime: mime.to_string(),
            queries: Default::default(),
            kvs: Vec::new(),
            table_rows: Vec::new(),
            ai: vision::fallback_extraction(&ExtractionSignal::default()),
            metadata: AnalysisMetadata {
                analysis_id: Uuid::new_v4().to_string(),
                textract_success: false,
                vision_fusion_used: false,
                preview_mode: options.preview_only,
                region: self.region.clone(),
                analyzed_at: Utc::now(),
                error: Some(error.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn unconfigured_storage_yields_failure_shape() {
        let analyzer = Analyzer::new("us-east-1");
        let result = analyzer
            .analyze("any-key", &AnalyzeOptions::default())
            .await
            .unwrap();

        assert!(result.metadata.error.is_some());
        assert!(!result.metadata.textract_success);
        assert!(result.queries.is_empty());
        assert_eq!(result.ai.document_type.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn missing_object_propagates_storage_error() {
        let analyzer =
            Analyzer::new("us-east-1").with_store(Arc::new(MemoryStore::new()));
        let err = analyzer
            .analyze("missing", &AnalyzeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalyzeError::Storage(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ocr_disabled_still_returns_typed_record() {
        let mut store = MemoryStore::new();
        store.insert("doc", "text/plain", b"hello".to_vec());
        let analyzer = Analyzer::new("us-east-1").with_store(Arc::new(store));

        let result = analyzer
            .analyze("doc", &AnalyzeOptions::default())
            .await
            .unwrap();
        assert!(!result.metadata.textract_success);
        assert!(result.metadata.error.is_none());
        assert_eq!(result.ai.document_type.as_deref(), Some("unknown"));
        assert_eq!(result.mime, "text/plain");
    }
}
