//! services/api/src/extract/docx.rs
//!
//! Text extraction from Microsoft Word documents.
//!
//! DOCX files are ZIP archives containing XML files in Open XML format.
//! The main content is in `word/document.xml`: paragraphs are `w:p`
//! elements and the actual text lives in `w:t` runs.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::ExtractError;

/// Extracts the body text, one line per paragraph.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let cursor = Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| ExtractError::Parse(format!("failed to open .docx archive: {e}")))?;

    let xml_content = {
        let mut file = archive
            .by_name("word/document.xml")
            .map_err(|e| ExtractError::Parse(format!("word/document.xml missing: {e}")))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| ExtractError::Parse(format!("failed to read document.xml: {e}")))?;
        content
    };

    // Whitespace inside `w:t` runs is significant; only text seen while a
    // run is open is collected, so indentation between elements is ignored
    // without trimming.
    let mut reader = Reader::from_str(&xml_content);

    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(current.trim().to_string());
                    }
                    current.clear();
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"br" => current.push('\n'),
                b"tab" => current.push('\t'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Parse(format!(
                    "XML parse error in document.xml: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraphs_become_lines_and_runs_concatenate() {
        let xml = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Photosynthesis converts </w:t></w:r><w:r><w:t>light into energy.</w:t></w:r></w:p>
                <w:p><w:r><w:t>Chlorophyll absorbs sunlight.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let text = extract_text(&docx_bytes(xml)).unwrap();
        assert_eq!(
            text,
            "Photosynthesis converts light into energy.\nChlorophyll absorbs sunlight."
        );
    }

    #[test]
    fn empty_paragraphs_are_skipped_and_entities_decode() {
        let xml = r#"<w:document xmlns:w="http://example.com/w">
              <w:body>
                <w:p></w:p>
                <w:p><w:r><w:t>Salt &amp; water</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let text = extract_text(&docx_bytes(xml)).unwrap();
        assert_eq!(text, "Salt & water");
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = extract_text(b"not a zip archive").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn archive_without_document_xml_is_a_parse_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("word/other.xml", options).unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract_text(&bytes).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }
}
