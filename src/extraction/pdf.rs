//! PDF readers: native text layer first, page-image extraction for OCR.
//!
//! The renderer walks each page's XObject resources and pulls out the
//! largest embedded image. For scanned notices every page is one full-page
//! scan, so this recovers the original raster without a native PDF
//! rasterizer. DCT (JPEG) streams pass through the decoder; raw pixel
//! streams are rebuilt from /Width and /Height.

use std::io::Cursor;

use lopdf::{Document, Object, ObjectId};

use super::types::{PdfPageRenderer, PdfTextReader};
use super::ExtractionError;

/// Native per-page text reader over the pdf-extract crate.
pub struct PdfExtractReader;

impl PdfTextReader for PdfExtractReader {
    fn read_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))
    }
}

/// Extracts embedded page images via lopdf and re-encodes them to PNG.
pub struct LopdfPageRenderer;

impl PdfPageRenderer for LopdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;
        Ok(doc.page_iter().count())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids.get(page_index).ok_or_else(|| {
            ExtractionError::PdfParsing(format!(
                "page {} not found (PDF has {} pages)",
                page_index,
                page_ids.len()
            ))
        })?;

        let stream = largest_image_stream(&doc, page_id)?;
        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        // DCT/embedded file streams decode directly; everything else is
        // treated as raw pixel data.
        let dynamic = match image::load_from_memory(&content) {
            Ok(img) => img,
            Err(_) => reconstruct_raw_image(&stream.dict, &content)?,
        };

        let mut png = Cursor::new(Vec::new());
        dynamic
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        tracing::debug!(
            page = page_index,
            raw_size = content.len(),
            png_size = png.get_ref().len(),
            "rendered PDF page image"
        );

        Ok(png.into_inner())
    }
}

/// Largest /Subtype /Image XObject on the page, i.e. the main scan.
fn largest_image_stream<'a>(
    doc: &'a Document,
    page_id: ObjectId,
) -> Result<&'a lopdf::Stream, ExtractionError> {
    let page = doc
        .get_object(page_id)
        .map_err(|e| ExtractionError::PdfParsing(format!("page object error: {e}")))?
        .as_dict()
        .map_err(|_| ExtractionError::PdfParsing("page is not a dictionary".into()))?;

    let resources = resolve_dict(doc, page, b"Resources")?;
    let xobjects = resolve_dict(doc, resources, b"XObject")?;

    let mut best: Option<&lopdf::Stream> = None;
    for (_name, obj) in xobjects.iter() {
        let obj = match obj {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(resolved) => resolved,
                Err(_) => continue,
            },
            other => other,
        };
        let stream = match obj {
            Object::Stream(s) => s,
            _ => continue,
        };
        if !is_image_subtype(&stream.dict) {
            continue;
        }
        if best.map_or(true, |b| stream.content.len() > b.content.len()) {
            best = Some(stream);
        }
    }

    best.ok_or_else(|| ExtractionError::PdfParsing("no image XObject on this page".into()))
}

fn resolve_dict<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    key: &[u8],
) -> Result<&'a lopdf::Dictionary, ExtractionError> {
    let entry = dict.get(key).map_err(|_| {
        ExtractionError::PdfParsing(format!("missing /{}", String::from_utf8_lossy(key)))
    })?;
    let entry = match entry {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?,
        other => other,
    };
    entry.as_dict().map_err(|_| {
        ExtractionError::PdfParsing(format!("/{} is not a dictionary", String::from_utf8_lossy(key)))
    })
}

fn is_image_subtype(dict: &lopdf::Dictionary) -> bool {
    dict.get(b"Subtype")
        .map(|obj| matches!(obj, Object::Name(n) if n == b"Image"))
        .unwrap_or(false)
}

/// Rebuild an image from raw pixel data using /Width and /Height.
/// RGB is assumed when the buffer is large enough, grayscale otherwise.
fn reconstruct_raw_image(
    dict: &lopdf::Dictionary,
    raw: &[u8],
) -> Result<image::DynamicImage, ExtractionError> {
    let width = dict_u32(dict, b"Width")?;
    let height = dict_u32(dict, b"Height")?;
    let pixels = (width as usize) * (height as usize);

    if raw.len() >= pixels * 3 {
        let rgb = image::RgbImage::from_raw(width, height, raw[..pixels * 3].to_vec())
            .ok_or_else(|| ExtractionError::ImageProcessing("RGB buffer rejected".into()))?;
        Ok(image::DynamicImage::ImageRgb8(rgb))
    } else if raw.len() >= pixels {
        let gray = image::GrayImage::from_raw(width, height, raw[..pixels].to_vec())
            .ok_or_else(|| ExtractionError::ImageProcessing("grayscale buffer rejected".into()))?;
        Ok(image::DynamicImage::ImageLuma8(gray))
    } else {
        Err(ExtractionError::ImageProcessing(format!(
            "raw pixel buffer too small: {} bytes for {}x{}",
            raw.len(),
            width,
            height
        )))
    }
}

fn dict_u32(dict: &lopdf::Dictionary, key: &[u8]) -> Result<u32, ExtractionError> {
    dict.get(key)
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .map(|v| v as u32)
        .ok_or_else(|| {
            ExtractionError::ImageProcessing(format!(
                "image stream missing /{}",
                String::from_utf8_lossy(key)
            ))
        })
}
