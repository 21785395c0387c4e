//! PDF page counting and cost-control trimming.
//!
//! OCR is billed per page, so full analysis submits at most the first ten
//! pages and preview mode submits only the first. Trimming is best-effort:
//! a corrupt PDF or a library failure falls back to submitting the original
//! bytes rather than aborting the analysis.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parse error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Count the pages of a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    Ok(doc.get_pages().len())
}

/// Return a PDF containing at most the first `max_pages` pages.
///
/// Documents at or under the cap are returned byte-identical. Trimming
/// failures fall back to the original bytes; cost control never takes
/// priority over completing the analysis.
pub fn limit_pages(bytes: &[u8], max_pages: usize) -> Vec<u8> {
    match limit_pages_strict(bytes, max_pages) {
        Ok(trimmed) => trimmed,
        Err(e) => {
            tracing::warn!("PDF page limiting failed, submitting original bytes: {}", e);
            bytes.to_vec()
        }
    }
}

fn limit_pages_strict(bytes: &[u8], max_pages: usize) -> Result<Vec<u8>, PdfError> {
    let mut doc = lopdf::Document::load_mem(bytes)?;
    let total = doc.get_pages().len();
    if total <= max_pages || max_pages == 0 {
        return Ok(bytes.to_vec());
    }

    let to_delete: Vec<u32> = ((max_pages as u32 + 1)..=(total as u32)).collect();
    doc.delete_pages(&to_delete);
    doc.prune_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal blank PDF with `n` pages.
    pub fn blank_pdf(n: usize) -> Vec<u8> {
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..n {
            let content_id = doc.add_object(Stream::new(dictionary! {}, b"BT ET".to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => n as i64,
                "Kids" => kids,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn counts_pages() {
        assert_eq!(page_count(&blank_pdf(1)).unwrap(), 1);
        assert_eq!(page_count(&blank_pdf(7)).unwrap(), 7);
    }

    #[test]
    fn trims_to_cap() {
        let original = blank_pdf(15);
        let trimmed = limit_pages(&original, 10);
        assert_eq!(page_count(&trimmed).unwrap(), 10);
    }

    #[test]
    fn preview_cap_keeps_one_page() {
        let trimmed = limit_pages(&blank_pdf(3), 1);
        assert_eq!(page_count(&trimmed).unwrap(), 1);
    }

    #[test]
    fn under_cap_is_byte_identical() {
        let original = blank_pdf(4);
        assert_eq!(limit_pages(&original, 10), original);
        assert_eq!(limit_pages(&original, 4), original);
    }

    #[test]
    fn corrupt_input_falls_back_to_original() {
        let garbage = b"not a pdf at all".to_vec();
        assert_eq!(limit_pages(&garbage, 1), garbage);
    }

    #[test]
    fn page_count_rejects_garbage() {
        assert!(page_count(b"garbage").is_err());
    }
}
