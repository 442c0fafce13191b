//! Upload validation. Fails fast, before any pipeline context exists.
//!
//! Declared metadata is not trusted on its own: where the format has a
//! reliable signature (PDF, JPEG, PNG) the magic bytes must agree with the
//! declared MIME type. Magic bytes don't lie; declared types can.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;

/// Declared kind of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    Image,
    Pdf,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Pdf => "PDF",
        }
    }
}

/// An uploaded document: bytes plus declared metadata.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("uploaded file is empty")]
    EmptyFile,

    #[error("uploaded file has no filename")]
    MissingFilename,

    #[error("uploaded file is {size} bytes, exceeding the {max} byte limit")]
    FileTooLarge { size: usize, max: usize },

    #[error("MIME type {mime} does not match declared kind {kind}")]
    MimeKindMismatch { mime: String, kind: &'static str },

    #[error("file content does not look like {expected}")]
    ContentMismatch { expected: &'static str },
}

/// Validate an upload. Errors here are pre-pipeline and fatal.
pub fn validate(file: &UploadedFile) -> Result<(), InputError> {
    if file.bytes.is_empty() {
        return Err(InputError::EmptyFile);
    }
    if file.filename.trim().is_empty() {
        return Err(InputError::MissingFilename);
    }
    if file.bytes.len() > config::MAX_UPLOAD_BYTES {
        return Err(InputError::FileTooLarge {
            size: file.bytes.len(),
            max: config::MAX_UPLOAD_BYTES,
        });
    }

    match file.kind {
        FileKind::Image => {
            if !config::SUPPORTED_IMAGE_MIMES.contains(&file.mime_type.as_str()) {
                return Err(InputError::MimeKindMismatch {
                    mime: file.mime_type.clone(),
                    kind: FileKind::Image.as_str(),
                });
            }
            check_image_magic(file)?;
        }
        FileKind::Pdf => {
            if file.mime_type != config::PDF_MIME {
                return Err(InputError::MimeKindMismatch {
                    mime: file.mime_type.clone(),
                    kind: FileKind::Pdf.as_str(),
                });
            }
            if !file.bytes.starts_with(b"%PDF") {
                return Err(InputError::ContentMismatch {
                    expected: "a PDF document",
                });
            }
        }
    }

    Ok(())
}

/// Cross-check magic bytes for formats with a stable signature.
fn check_image_magic(file: &UploadedFile) -> Result<(), InputError> {
    match file.mime_type.as_str() {
        "image/jpeg" if !file.bytes.starts_with(&[0xFF, 0xD8, 0xFF]) => {
            Err(InputError::ContentMismatch {
                expected: "a JPEG image",
            })
        }
        "image/png" if !file.bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) => {
            Err(InputError::ContentMismatch {
                expected: "a PNG image",
            })
        }
        // webp/gif/heic signatures vary with container details; the declared
        // type is accepted and the decoder is the final arbiter.
        _ => Ok(()),
    }
}
