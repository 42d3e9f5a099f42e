pub mod fonts;
pub mod format;
pub mod pdf;
pub mod sanitize;
pub mod text_only;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use format::*;
pub use pdf::PdfTextSource;
pub use sanitize::*;
pub use text_only::PlainTextSource;
pub use types::*;

use thiserror::Error;

/// A document that cannot be opened or decoded. Fatal for that document only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnreadableDocumentError {
    #[error("Document is corrupt or not a valid PDF: {0}")]
    Corrupt(String),

    #[error("Document is encrypted")]
    Encrypted,

    #[error("Document has no pages")]
    NoPages,

    #[error("Document contains no extractable text (scanned image?)")]
    NoExtractableText,

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Text encoding error: {0}")]
    Encoding(String),
}

/// Open an upload as a positioned text source according to its detected format.
pub fn open_document(
    bytes: &[u8],
    detection: &FormatDetection,
) -> Result<Box<dyn TextSource>, UnreadableDocumentError> {
    match detection.format {
        DocumentFormat::Pdf => Ok(Box::new(PdfTextSource::open(bytes)?)),
        DocumentFormat::PlainText => Ok(Box::new(PlainTextSource::open(bytes)?)),
        DocumentFormat::Unsupported => Err(UnreadableDocumentError::UnsupportedFormat(
            detection.mime_type.clone(),
        )),
    }
}
