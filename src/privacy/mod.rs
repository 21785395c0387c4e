//! PII safety transforms for analysis results.
//!
//! The one hard invariant of the analysis pipeline lives here: a raw
//! nine-digit Social Security Number must never leave the orchestrator.
//! Only the masked form (`XXX-XX-1234`, last four digits retained) may
//! appear in a result, on every path including error fallbacks.

use std::sync::LazyLock;

use regex::Regex;

/// Candidate SSN pattern: three/two/four digit groups separated by an
/// optional dash or space. Runs over concatenated OCR words, so adjacent
/// numeric fields can produce false positives; candidates are filtered by
/// area-code validity below but otherwise accepted as-is.
static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{3}[-\s]?\d{2}[-\s]?\d{4}").expect("ssn regex"));

/// Shape of an already-masked SSN, e.g. `XXX-XX-6789`.
static MASKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^XXX-XX-\d{4}$").expect("masked ssn regex"));

/// Check whether an SSN area code (first three digits) can be valid.
///
/// The SSA never issues area 000 or 666, and 900-999 is reserved for ITINs.
pub fn is_valid_area(area: u32) -> bool {
    area != 0 && area != 666 && area < 900
}

/// Extract the digits of the first valid SSN candidate found in free text.
///
/// Returns exactly nine digits with separators stripped, so
/// `"123 45 6789"` and `"123-45-6789"` yield the same value.
pub fn extract_ssn(text: &str) -> Option<String> {
    for m in SSN_RE.find_iter(text) {
        let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() != 9 {
            continue;
        }
        let area: u32 = digits[..3].parse().ok()?;
        if is_valid_area(area) {
            return Some(digits);
        }
    }
    None
}

/// Mask an SSN for display, keeping only the last four digits.
///
/// Accepts any separator style; returns `None` when the input does not
/// contain exactly nine digits or the area code is invalid.
pub fn mask_ssn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 9 {
        return None;
    }
    let area: u32 = digits[..3].parse().ok()?;
    if !is_valid_area(area) {
        return None;
    }
    Some(format!("XXX-XX-{}", &digits[5..]))
}

/// Normalize a possibly-raw SSN value to the masked form.
///
/// Values already in `XXX-XX-####` shape pass through unchanged; anything
/// else is re-masked, and values that cannot be masked are dropped. Used to
/// sanitize model output, which is instructed to mask but not trusted to.
pub fn ensure_masked(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if MASKED_RE.is_match(trimmed) {
        return Some(trimmed.to_string());
    }
    mask_ssn(trimmed)
}
