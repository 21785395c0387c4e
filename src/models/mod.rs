//! Typed records produced by document analysis.

mod extraction;

pub use extraction::{AiExtraction, AnalysisMetadata, AnalysisResult, ExtractionSignal, KeyValue};
