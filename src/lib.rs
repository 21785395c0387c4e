//! VaultScan - document analysis service for family record vaults.
//!
//! Given the storage key of an uploaded document, VaultScan extracts
//! structured fields by combining a cloud OCR pass (queries, forms, tables)
//! with a vision-language fusion pass, masks any Social Security Numbers,
//! and returns a single well-formed JSON record per request.

pub mod analysis;
pub mod config;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod privacy;
pub mod server;
pub mod sigv4;
pub mod storage;
pub mod vision;
