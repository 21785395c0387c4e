//! First-page preview rendering for the fusion prompt.
//!
//! Images are downscaled in-process; PDFs are rasterized through the
//! poppler `pdftoppm` binary when it is installed. Rendering is optional:
//! any failure yields `None` and fusion proceeds text-only.

use std::path::Path;
use std::process::Command;

use image::DynamicImage;
use tracing::debug;

/// Longest edge of the preview sent to the model.
const MAX_PREVIEW_EDGE: u32 = 1280;
const JPEG_QUALITY: u8 = 70;
/// Render resolution for PDF rasterization.
const PDF_RENDER_DPI: &str = "120";

/// Render a downscaled JPEG of the document's first page, if possible.
pub fn first_page_jpeg(bytes: &[u8], mime: &str) -> Option<Vec<u8>> {
    if mime == "application/pdf" {
        return pdf_preview(bytes);
    }
    if mime.starts_with("image/") {
        return image_preview(bytes);
    }
    debug!("No preview renderer for {}", mime);
    None
}

fn image_preview(bytes: &[u8]) -> Option<Vec<u8>> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            debug!("Preview image decode failed: {}", e);
            return None;
        }
    };
    encode_jpeg(&img)
}

fn encode_jpeg(img: &DynamicImage) -> Option<Vec<u8>> {
    let scaled = img.thumbnail(MAX_PREVIEW_EDGE, MAX_PREVIEW_EDGE);
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(scaled.to_rgb8());

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    match rgb.write_with_encoder(encoder) {
        Ok(()) => Some(out),
        Err(e) => {
            debug!("Preview JPEG encode failed: {}", e);
            None
        }
    }
}

fn pdf_preview(bytes: &[u8]) -> Option<Vec<u8>> {
    if which::which("pdftoppm").is_err() {
        debug!("pdftoppm not installed, skipping PDF preview");
        return None;
    }

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            debug!("Preview temp dir creation failed: {}", e);
            return None;
        }
    };
    let pdf_path = dir.path().join("input.pdf");
    if std::fs::write(&pdf_path, bytes).is_err() {
        return None;
    }

    let status = Command::new("pdftoppm")
        .arg("-jpeg")
        .args(["-f", "1", "-l", "1"])
        .args(["-r", PDF_RENDER_DPI])
        .arg(&pdf_path)
        .arg(dir.path().join("page"))
        .status();
    match status {
        Ok(s) if s.success() => {}
        Ok(_) | Err(_) => {
            debug!("pdftoppm rasterization failed");
            return None;
        }
    }

    let rendered = first_jpeg_in(dir.path())?;
    image_preview(&rendered)
}

/// Find the rasterizer's output; the page-number suffix width varies.
fn first_jpeg_in(dir: &Path) -> Option<Vec<u8>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jpg"))
        .collect();
    entries.sort();
    std::fs::read(entries.first()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(64, 32, image::Rgba([200, 10, 10, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn renders_image_preview_as_jpeg() {
        let jpeg = first_page_jpeg(&small_png(), "image/png").unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 32);
        // JPEG magic.
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn downscales_oversized_images() {
        let img = image::RgbImage::from_pixel(3000, 1500, image::Rgb([1, 2, 3]));
        let jpeg = encode_jpeg(&image::DynamicImage::ImageRgb8(img)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert!(decoded.width() <= 1280);
        assert!(decoded.height() <= 1280);
    }

    #[test]
    fn garbage_input_yields_none() {
        assert!(first_page_jpeg(b"not an image", "image/png").is_none());
        assert!(first_page_jpeg(b"not a pdf", "application/pdf").is_none());
        assert!(first_page_jpeg(b"text", "text/plain").is_none());
    }
}
