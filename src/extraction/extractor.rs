//! Text extraction dispatch.
//!
//! Images go straight to OCR. PDFs try the native text layer first and fall
//! back to rendering every page for OCR when the layer is missing or too
//! thin, tagging the result with its provenance. There is no page-count cap
//! on the fallback path; a pathological PDF renders and OCRs every page.

use std::sync::Arc;

use crate::config;
use crate::genai::GenerationClient;
use crate::input::{FileKind, UploadedFile};

use super::ocr::{OcrRouter, VisionModelOcr};
use super::pdf::{LopdfPageRenderer, PdfExtractReader};
use super::types::{
    ExtractedText, OcrEngine, PdfPageRenderer, PdfTextReader, TextExtractor, TextProvenance,
};
use super::ExtractionError;

pub struct DocumentTextExtractor {
    ocr: OcrRouter,
    pdf_reader: Box<dyn PdfTextReader>,
    pdf_renderer: Box<dyn PdfPageRenderer>,
}

impl DocumentTextExtractor {
    pub fn new(
        ocr: OcrRouter,
        pdf_reader: Box<dyn PdfTextReader>,
        pdf_renderer: Box<dyn PdfPageRenderer>,
    ) -> Self {
        Self {
            ocr,
            pdf_reader,
            pdf_renderer,
        }
    }

    /// Production wiring: vision-model OCR, pdf-extract text layer, lopdf
    /// page renderer.
    pub fn with_defaults(client: Arc<GenerationClient>) -> Self {
        Self::new(
            OcrRouter::single(Box::new(VisionModelOcr::new(client))),
            Box::new(PdfExtractReader),
            Box::new(LopdfPageRenderer),
        )
    }

    fn extract_image(&self, file: &UploadedFile) -> Result<ExtractedText, ExtractionError> {
        if !config::SUPPORTED_IMAGE_MIMES.contains(&file.mime_type.as_str()) {
            return Err(ExtractionError::UnsupportedFileType(file.mime_type.clone()));
        }

        let text = self.ocr.extract_text(&file.bytes, &file.mime_type)?;
        if text.trim().is_empty() {
            return Err(ExtractionError::TextExtractionFailed(
                "OCR returned no text for the image".into(),
            ));
        }

        Ok(ExtractedText {
            text,
            provenance: TextProvenance::Ocr,
            page_count: 1,
        })
    }

    fn extract_pdf(&self, file: &UploadedFile) -> Result<ExtractedText, ExtractionError> {
        // Scanned PDFs routinely break text-layer readers; treat a reader
        // error the same as an empty layer and let OCR decide.
        let native_pages = match self.pdf_reader.read_pages(&file.bytes) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(error = %e, "native PDF reader failed, falling back to OCR");
                Vec::new()
            }
        };

        let native_text = native_pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if native_text.chars().count() >= config::MIN_NATIVE_TEXT_LEN {
            tracing::info!(
                pages = native_pages.len(),
                text_len = native_text.len(),
                "PDF text layer is usable"
            );
            return Ok(ExtractedText {
                text: native_text,
                provenance: TextProvenance::NativeReader,
                page_count: native_pages.len(),
            });
        }

        let had_native_text = !native_text.is_empty();
        self.ocr_pdf_pages(&file.bytes, had_native_text)
    }

    /// Render every page and OCR it. A page that fails to render or read
    /// contributes nothing; the run fails only when no page yields text.
    fn ocr_pdf_pages(
        &self,
        pdf_bytes: &[u8],
        had_native_text: bool,
    ) -> Result<ExtractedText, ExtractionError> {
        let page_count = self.pdf_renderer.page_count(pdf_bytes)?;
        tracing::info!(pages = page_count, "PDF text layer insufficient, running OCR fallback");

        let mut page_texts: Vec<String> = Vec::with_capacity(page_count);
        for page_index in 0..page_count {
            let rendered =
                match self
                    .pdf_renderer
                    .render_page(pdf_bytes, page_index, config::PDF_RENDER_DPI)
                {
                    Ok(png) => png,
                    Err(e) => {
                        tracing::warn!(page = page_index, error = %e, "page render failed");
                        continue;
                    }
                };

            match self.ocr.extract_text(&rendered, "image/png") {
                Ok(text) if !text.trim().is_empty() => page_texts.push(text),
                Ok(_) => tracing::warn!(page = page_index, "OCR returned empty page"),
                Err(e) => tracing::warn!(page = page_index, error = %e, "page OCR failed"),
            }
        }

        if page_texts.is_empty() {
            return Err(ExtractionError::TextExtractionFailed(format!(
                "OCR produced no text across {page_count} PDF pages"
            )));
        }

        let provenance = if had_native_text {
            TextProvenance::Hybrid
        } else {
            TextProvenance::Ocr
        };

        Ok(ExtractedText {
            text: page_texts.join("\n\n"),
            provenance,
            page_count,
        })
    }
}

impl TextExtractor for DocumentTextExtractor {
    fn extract(&self, file: &UploadedFile) -> Result<ExtractedText, ExtractionError> {
        let _span = tracing::info_span!(
            "extract_text",
            kind = file.kind.as_str(),
            mime_type = %file.mime_type,
            size = file.bytes.len(),
        )
        .entered();

        let result = match file.kind {
            FileKind::Image => self.extract_image(file),
            FileKind::Pdf => self.extract_pdf(file),
        };

        if let Ok(extracted) = &result {
            tracing::info!(
                provenance = extracted.provenance.as_str(),
                pages = extracted.page_count,
                text_len = extracted.text.len(),
                "text extraction complete"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ocr::MockOcrEngine;
    use std::sync::atomic::Ordering;

    struct StubReader {
        pages: Vec<String>,
    }

    impl StubReader {
        fn with_pages(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|p| p.to_string()).collect(),
            }
        }
    }

    impl PdfTextReader for StubReader {
        fn read_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
            Ok(self.pages.clone())
        }
    }

    struct FailingReader;

    impl PdfTextReader for FailingReader {
        fn read_pages(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
            Err(ExtractionError::PdfParsing("corrupt xref".into()))
        }
    }

    struct StubRenderer {
        pages: usize,
    }

    impl PdfPageRenderer for StubRenderer {
        fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
            Ok(self.pages)
        }

        fn render_page(
            &self,
            _pdf_bytes: &[u8],
            _page_index: usize,
            _dpi: u32,
        ) -> Result<Vec<u8>, ExtractionError> {
            Ok(vec![0x89, 0x50, 0x4E, 0x47])
        }
    }

    fn image_file(mime: &str) -> UploadedFile {
        UploadedFile {
            filename: "notice.png".into(),
            mime_type: mime.into(),
            kind: FileKind::Image,
            bytes: vec![1, 2, 3],
        }
    }

    fn pdf_file() -> UploadedFile {
        UploadedFile {
            filename: "notice.pdf".into(),
            mime_type: "application/pdf".into(),
            kind: FileKind::Pdf,
            bytes: b"%PDF-1.4".to_vec(),
        }
    }

    fn extractor_with(
        ocr: MockOcrEngine,
        reader: Box<dyn PdfTextReader>,
        pages: usize,
    ) -> DocumentTextExtractor {
        DocumentTextExtractor::new(
            OcrRouter::single(Box::new(ocr)),
            reader,
            Box::new(StubRenderer { pages }),
        )
    }

    #[test]
    fn image_goes_straight_to_ocr() {
        let ocr = MockOcrEngine::new("여름방학 안내 7/23~8/17");
        let calls = ocr.counter();
        let extractor = extractor_with(ocr, Box::new(StubReader::with_pages(&[])), 0);

        let result = extractor.extract(&image_file("image/png")).unwrap();
        assert_eq!(result.text, "여름방학 안내 7/23~8/17");
        assert_eq!(result.provenance, TextProvenance::Ocr);
        assert_eq!(result.page_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsupported_image_mime_rejected() {
        let extractor = extractor_with(
            MockOcrEngine::new("unused"),
            Box::new(StubReader::with_pages(&[])),
            0,
        );
        let err = extractor.extract(&image_file("image/svg+xml")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFileType(_)));
    }

    #[test]
    fn blank_image_ocr_is_extraction_failure() {
        let extractor = extractor_with(
            MockOcrEngine::new("   \n "),
            Box::new(StubReader::with_pages(&[])),
            0,
        );
        let err = extractor.extract(&image_file("image/jpeg")).unwrap_err();
        assert!(matches!(err, ExtractionError::TextExtractionFailed(_)));
    }

    #[test]
    fn pdf_with_usable_text_layer_skips_ocr() {
        let long_page = "현장학습 안내문입니다. ".repeat(10); // well over 50 chars
        let ocr = MockOcrEngine::new("should not run");
        let calls = ocr.counter();
        let extractor = extractor_with(ocr, Box::new(StubReader::with_pages(&[&long_page])), 1);

        let result = extractor.extract(&pdf_file()).unwrap();
        assert_eq!(result.provenance, TextProvenance::NativeReader);
        assert_eq!(result.page_count, 1);
        assert!(result.text.contains("현장학습"));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "OCR must not be invoked");
    }

    #[test]
    fn thin_text_layer_triggers_ocr_fallback_as_hybrid() {
        // 10 characters of native text: below the usability threshold.
        let ocr = MockOcrEngine::new("급식 안내 전체 내용");
        let calls = ocr.counter();
        let extractor = extractor_with(ocr, Box::new(StubReader::with_pages(&["급식 안내"])), 2);

        let result = extractor.extract(&pdf_file()).unwrap();
        assert_eq!(result.provenance, TextProvenance::Hybrid);
        assert_eq!(result.page_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one OCR call per page");
        assert_eq!(result.text, "급식 안내 전체 내용\n\n급식 안내 전체 내용");
    }

    #[test]
    fn empty_text_layer_is_plain_ocr_provenance() {
        let extractor = extractor_with(
            MockOcrEngine::new("스캔본 내용"),
            Box::new(StubReader::with_pages(&["", "  "])),
            2,
        );
        let result = extractor.extract(&pdf_file()).unwrap();
        assert_eq!(result.provenance, TextProvenance::Ocr);
    }

    #[test]
    fn reader_failure_still_falls_back_to_ocr() {
        let extractor = extractor_with(
            MockOcrEngine::new("스캔본 내용"),
            Box::new(FailingReader),
            1,
        );
        let result = extractor.extract(&pdf_file()).unwrap();
        assert_eq!(result.provenance, TextProvenance::Ocr);
        assert_eq!(result.text, "스캔본 내용");
    }

    #[test]
    fn all_pages_blank_after_ocr_fails() {
        let extractor = extractor_with(
            MockOcrEngine::new(""),
            Box::new(StubReader::with_pages(&[""])),
            3,
        );
        let err = extractor.extract(&pdf_file()).unwrap_err();
        assert!(matches!(err, ExtractionError::TextExtractionFailed(_)));
    }
}
