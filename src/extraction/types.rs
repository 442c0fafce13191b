use serde::{Deserialize, Serialize};

use crate::input::UploadedFile;

use super::ExtractionError;

/// Which extraction path produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextProvenance {
    /// The PDF text layer was usable as-is.
    NativeReader,
    /// Text came entirely from OCR.
    Ocr,
    /// The PDF had a text layer, but it was too thin and OCR filled in.
    Hybrid,
}

impl TextProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeReader => "native-reader",
            Self::Ocr => "ocr",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Result of text extraction from one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    pub provenance: TextProvenance,
    pub page_count: usize,
}

/// OCR capability. Implementations declare which MIME types they handle;
/// a facade picks the first match in priority order.
pub trait OcrEngine: Send + Sync {
    fn supports(&self, mime_type: &str) -> bool;

    fn extract_text(&self, image_bytes: &[u8], mime_type: &str)
        -> Result<String, ExtractionError>;
}

/// Per-page text layer reader for digital PDFs.
pub trait PdfTextReader: Send + Sync {
    fn read_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// Renders a single PDF page to an encoded PNG for OCR.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;
}

/// Main extraction seam, dispatching on the declared file kind.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file: &UploadedFile) -> Result<ExtractedText, ExtractionError>;
}
