use serde::{Deserialize, Serialize};

/// Document kinds the extractor can open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    PlainText,
    Unsupported,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "plain_text",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Result of format detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub format: DocumentFormat,
}

/// Bytes inspected for the plain-text heuristic.
const TEXT_PROBE_LEN: usize = 8 * 1024;

/// Detect the format of an upload.
///
/// Magic bytes win over everything else. Without a recognized signature the
/// declared content type (or the type guessed from the filename) decides, so
/// a damaged file named `*.pdf` is still routed to the PDF reader and fails
/// there as a single unreadable document.
pub fn detect_format(bytes: &[u8], filename: &str, declared: Option<&str>) -> FormatDetection {
    let header = &bytes[..bytes.len().min(8)];

    let signature = match header {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(("application/pdf", DocumentFormat::Pdf)),
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", DocumentFormat::Unsupported)),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(("image/png", DocumentFormat::Unsupported)),
        [0x47, 0x49, 0x46, 0x38, ..] => Some(("image/gif", DocumentFormat::Unsupported)),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => {
            Some(("image/tiff", DocumentFormat::Unsupported))
        }
        // ZIP containers (docx, xlsx, odt)
        [0x50, 0x4B, 0x03, 0x04, ..] => Some(("application/zip", DocumentFormat::Unsupported)),
        // OLE compound files (doc, xls)
        [0xD0, 0xCF, 0x11, 0xE0, ..] => {
            Some(("application/x-ole-storage", DocumentFormat::Unsupported))
        }
        _ => None,
    };

    if let Some((mime, format)) = signature {
        return FormatDetection {
            mime_type: mime.to_string(),
            format,
        };
    }

    let claimed = declared_mime(declared).or_else(|| {
        mime_guess::from_path(filename)
            .first()
            .map(|m| m.essence_str().to_string())
    });

    match claimed.as_deref() {
        Some("application/pdf") => FormatDetection {
            mime_type: "application/pdf".into(),
            format: DocumentFormat::Pdf,
        },
        Some(mime) if mime.starts_with("text/") => FormatDetection {
            mime_type: mime.to_string(),
            format: DocumentFormat::PlainText,
        },
        Some(mime) => FormatDetection {
            mime_type: mime.to_string(),
            format: DocumentFormat::Unsupported,
        },
        None if is_likely_text(bytes) => FormatDetection {
            mime_type: "text/plain".into(),
            format: DocumentFormat::PlainText,
        },
        None => FormatDetection {
            mime_type: "application/octet-stream".into(),
            format: DocumentFormat::Unsupported,
        },
    }
}

/// A declared content type that actually says something about the payload.
fn declared_mime(declared: Option<&str>) -> Option<String> {
    let essence = declared?.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "" | "application/octet-stream" => None,
        _ => Some(essence),
    }
}

/// UTF-8 without NUL bytes in the first chunk.
fn is_likely_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let probe = &bytes[..bytes.len().min(TEXT_PROBE_LEN)];
    if probe.contains(&0) {
        return false;
    }
    match std::str::from_utf8(probe) {
        Ok(_) => true,
        // A multi-byte character cut by the probe boundary is still text.
        Err(e) => e.error_len().is_none() && probe.len() == TEXT_PROBE_LEN,
    }
}
