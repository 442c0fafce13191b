pub mod extractor;
pub mod ocr;
pub mod pdf;
pub mod types;

pub use extractor::*;
pub use ocr::*;
pub use pdf::*;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("unsupported file type for extraction: {0}")]
    UnsupportedFileType(String),

    #[error("no usable text could be extracted: {0}")]
    TextExtractionFailed(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),
}
