//! OCR and structured-field extraction.
//!
//! Submits document bytes to a Textract-style `AnalyzeDocument` endpoint
//! with a fixed battery of natural-language queries plus form and table
//! detection, then walks the returned block graph into a flat
//! [`ExtractionSignal`](crate::models::ExtractionSignal).
//!
//! The engine is a trait so the orchestrator can take a test double; the
//! production implementation is [`TextractEngine`].

mod blocks;
mod textract;

use async_trait::async_trait;
use thiserror::Error;

pub use blocks::{extract_signal, full_text, Block, BlockGraph, MAX_TABLE_ROWS};
pub use textract::TextractEngine;

use crate::models::ExtractionSignal;
use crate::privacy;

/// The fixed query battery submitted with every document: `(alias, question)`.
///
/// Aliases double as the keys of the result's `queries` map (with `ssn`
/// replaced by `ssnMasked` before anything leaves the orchestrator).
pub const QUERY_BATTERY: &[(&str, &str)] = &[
    ("document_type", "What type of document is this?"),
    ("issuer", "What organization issued this document?"),
    ("ssn", "What is the Social Security Number?"),
    ("full_name", "What is the full name of the person on this document?"),
    ("date", "What is the date on this document?"),
    ("address", "What is the address on this document?"),
    ("id_or_account", "What is the ID number or account number?"),
    ("expiration", "What is the expiration date?"),
    ("policy_or_certificate", "What is the policy or certificate number?"),
    ("total", "What is the total amount?"),
];

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR connection error: {0}")]
    Connection(String),
    #[error("OCR service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("OCR response parse error: {0}")]
    Parse(String),
}

/// A document-analysis OCR service.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Analyze document bytes, returning the raw block graph.
    async fn analyze(&self, bytes: &[u8], mime: &str) -> Result<BlockGraph, OcrError>;
}

/// Derive the extraction signal from a block graph, recovering an SSN from
/// unstructured text when the dedicated query came back empty.
///
/// The fallback concatenates recognized words and applies the SSN pattern
/// with area-code validity filtering. Adjacent numeric fields can false-
/// positive; candidates are not distinguished from true SSNs.
pub fn signal_with_ssn_fallback(graph: &BlockGraph) -> ExtractionSignal {
    let mut signal = extract_signal(graph);
    if !signal.queries.contains_key("ssn") {
        if let Some(digits) = privacy::extract_ssn(&full_text(graph)) {
            signal.queries.insert("ssn".to_string(), digits);
        }
    }
    signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_battery_is_the_fixed_ten() {
        assert_eq!(QUERY_BATTERY.len(), 10);
        let aliases: Vec<&str> = QUERY_BATTERY.iter().map(|(a, _)| *a).collect();
        assert!(aliases.contains(&"ssn"));
        assert!(aliases.contains(&"document_type"));
        assert!(aliases.contains(&"total"));
    }

    #[test]
    fn ssn_fallback_fills_missing_query() {
        let graph: BlockGraph = serde_json::from_value(serde_json::json!({
            "Blocks": [
                {"BlockType": "WORD", "Id": "w1", "Text": "SSN:"},
                {"BlockType": "WORD", "Id": "w2", "Text": "123-45-6789,"},
                {"BlockType": "WORD", "Id": "w3", "Text": "John"}
            ]
        }))
        .unwrap();

        let signal = signal_with_ssn_fallback(&graph);
        assert_eq!(signal.queries.get("ssn").map(String::as_str), Some("123456789"));
    }

    #[test]
    fn ssn_fallback_respects_query_answer() {
        let graph: BlockGraph = serde_json::from_value(serde_json::json!({
            "Blocks": [
                {"BlockType": "QUERY", "Id": "q1",
                 "Query": {"Text": "What is the Social Security Number?", "Alias": "ssn"},
                 "Relationships": [{"Type": "ANSWER", "Ids": ["a1"]}]},
                {"BlockType": "QUERY_RESULT", "Id": "a1", "Text": "987-65-4321"},
                {"BlockType": "WORD", "Id": "w1", "Text": "123-45-6789"}
            ]
        }))
        .unwrap();

        let signal = signal_with_ssn_fallback(&graph);
        // The dedicated query wins over the free-text candidate.
        assert_eq!(
            signal.queries.get("ssn").map(String::as_str),
            Some("987-65-4321")
        );
    }
}
