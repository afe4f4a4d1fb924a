//! services/api/src/extract/mod.rs
//!
//! Turns uploaded bytes into content the generation models can consume:
//! plain text where we can extract it ourselves (.txt, .docx, .pptx),
//! base64 inline payloads where the model reads the format natively
//! (images, PDF). Pure functions over the input slice; no IO.

pub mod docx;
pub mod pptx;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use studyforge_core::domain::{SourceContent, SourceKind};

/// Errors produced while turning an upload into [`SourceContent`].
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The upload is a format we do not handle. Checked again at extraction
    /// time even though uploads are validated, since stored resources may
    /// predate a format change.
    #[error("Unsupported format: {file_name} ({mime_type})")]
    UnsupportedFormat { file_name: String, mime_type: String },
    /// The upload claims a supported format but its contents do not parse.
    #[error("Failed to parse upload: {0}")]
    Parse(String),
}

/// Container formats handled under [`SourceKind::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerFormat {
    Pdf,
    Docx,
    Pptx,
}

/// Extracts generation-ready content from raw upload bytes.
pub fn extract(
    file_name: &str,
    mime_type: &str,
    kind: SourceKind,
    bytes: &[u8],
) -> Result<SourceContent, ExtractError> {
    match kind {
        SourceKind::Text => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                ExtractError::Parse(format!("{file_name} is not valid UTF-8 text: {e}"))
            })?;
            Ok(SourceContent::Text(text.to_string()))
        }
        SourceKind::Image => {
            if !mime_type.starts_with("image/") {
                return Err(unsupported(file_name, mime_type));
            }
            Ok(SourceContent::Inline {
                data: STANDARD.encode(bytes),
                mime_type: mime_type.to_string(),
            })
        }
        SourceKind::File => match container_format(file_name, mime_type) {
            // The generation model reads PDFs natively, so they pass
            // through base64-encoded instead of being parsed here.
            Some(ContainerFormat::Pdf) => Ok(SourceContent::Inline {
                data: STANDARD.encode(bytes),
                mime_type: "application/pdf".to_string(),
            }),
            Some(ContainerFormat::Docx) => docx::extract_text(bytes).map(SourceContent::Text),
            Some(ContainerFormat::Pptx) => pptx::extract_text(bytes).map(SourceContent::Text),
            None => Err(unsupported(file_name, mime_type)),
        },
    }
}

/// Cheap upfront check so upload handlers can reject junk before storing
/// anything. Text uploads always pass here; their UTF-8 validity is only
/// known once the bytes are inspected.
pub fn is_supported(file_name: &str, mime_type: &str, kind: SourceKind) -> bool {
    match kind {
        SourceKind::Text => true,
        SourceKind::Image => mime_type.starts_with("image/"),
        SourceKind::File => container_format(file_name, mime_type).is_some(),
    }
}

fn container_format(file_name: &str, mime_type: &str) -> Option<ContainerFormat> {
    let lower_name = file_name.to_ascii_lowercase();
    match mime_type {
        "application/pdf" => return Some(ContainerFormat::Pdf),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            return Some(ContainerFormat::Docx)
        }
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            return Some(ContainerFormat::Pptx)
        }
        _ => {}
    }
    // Browsers sometimes send a generic MIME type; fall back to the
    // file extension.
    if lower_name.ends_with(".pdf") {
        Some(ContainerFormat::Pdf)
    } else if lower_name.ends_with(".docx") {
        Some(ContainerFormat::Docx)
    } else if lower_name.ends_with(".pptx") {
        Some(ContainerFormat::Pptx)
    } else {
        None
    }
}

fn unsupported(file_name: &str, mime_type: &str) -> ExtractError {
    ExtractError::UnsupportedFormat {
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let content = extract("notes.txt", "text/plain", SourceKind::Text, b"photosynthesis").unwrap();
        assert_eq!(content, SourceContent::Text("photosynthesis".to_string()));
    }

    #[test]
    fn invalid_utf8_text_is_a_parse_error() {
        let err = extract("notes.txt", "text/plain", SourceKind::Text, &[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn images_become_inline_base64_with_their_mime() {
        let bytes = [0x89, b'P', b'N', b'G'];
        let content = extract("diagram.png", "image/png", SourceKind::Image, &bytes).unwrap();
        match content {
            SourceContent::Inline { data, mime_type } => {
                assert_eq!(mime_type, "image/png");
                assert_eq!(data, STANDARD.encode(bytes));
            }
            other => panic!("expected inline content, got {other:?}"),
        }
    }

    #[test]
    fn pdf_passes_through_as_inline_pdf() {
        let content = extract(
            "slides.pdf",
            "application/octet-stream",
            SourceKind::File,
            b"%PDF-1.7",
        )
        .unwrap();
        match content {
            SourceContent::Inline { mime_type, .. } => assert_eq!(mime_type, "application/pdf"),
            other => panic!("expected inline content, got {other:?}"),
        }
    }

    #[test]
    fn unknown_file_formats_are_rejected() {
        let err = extract("x.xyz", "application/octet-stream", SourceKind::File, b"??").unwrap_err();
        match err {
            ExtractError::UnsupportedFormat { file_name, mime_type } => {
                assert_eq!(file_name, "x.xyz");
                assert_eq!(mime_type, "application/octet-stream");
            }
            other => panic!("expected unsupported format, got {other:?}"),
        }
    }

    #[test]
    fn office_formats_are_recognized_by_extension_or_mime() {
        assert!(is_supported("a.docx", "application/octet-stream", SourceKind::File));
        assert!(is_supported("A.PPTX", "application/octet-stream", SourceKind::File));
        assert!(is_supported(
            "b",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            SourceKind::File
        ));
        assert!(is_supported("c.pdf", "application/pdf", SourceKind::File));
        assert!(!is_supported("d.exe", "application/octet-stream", SourceKind::File));
        assert!(!is_supported("e.txt", "text/plain", SourceKind::Image));
    }
}
