//! Result records for a single document analysis.
//!
//! Everything here is transient: records are built fresh per request and
//! discarded after the response is sent. Persistence, if any, is the
//! caller's responsibility.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single key/value pair recovered from a form-like layout.
///
/// Duplicates are allowed; order follows detection order and carries no
/// semantic meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Raw signal derived from one OCR response: query answers keyed by alias,
/// form key/value pairs, and table rows.
///
/// This is the internal, pre-masking shape. The `queries` map may still
/// contain the raw `ssn` alias; it never leaves the orchestrator that way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSignal {
    /// Query answers keyed by the alias submitted with the query.
    pub queries: BTreeMap<String, String>,
    /// Form key/value pairs in detection order.
    pub kvs: Vec<KeyValue>,
    /// Table rows (first 10 rows per table, tables concatenated).
    pub table_rows: Vec<Vec<String>>,
}

impl ExtractionSignal {
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.kvs.is_empty() && self.table_rows.is_empty()
    }
}

/// Normalized record produced by the vision fusion pass (or its
/// deterministic fallback). Fields are omitted rather than fabricated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiExtraction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn_masked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_notes: Option<String>,
}

/// Provenance flags for one analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// Unique id for this analysis invocation.
    pub analysis_id: String,
    /// Whether the OCR call succeeded.
    pub textract_success: bool,
    /// Whether the vision fusion pass actually ran.
    pub vision_fusion_used: bool,
    /// Whether the reduced-cost preview path was taken.
    pub preview_mode: bool,
    /// Region the OCR/storage clients were configured for.
    pub region: String,
    pub analyzed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete analysis response for one document.
///
/// Invariant: a raw nine-digit SSN never appears anywhere in this structure.
/// The `queries` map carries an `ssnMasked` entry (format `XXX-XX-1234`),
/// never an `ssn` entry, on every path including error fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Opaque storage identifier, supplied by the caller.
    pub document_key: String,
    /// Detected content type of the source bytes.
    pub mime: String,
    pub queries: BTreeMap<String, String>,
    pub kvs: Vec<KeyValue>,
    pub table_rows: Vec<Vec<String>>,
    pub ai: AiExtraction,
    pub metadata: AnalysisMetadata,
}
