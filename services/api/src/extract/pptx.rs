//! services/api/src/extract/pptx.rs
//!
//! Text extraction from Microsoft PowerPoint presentations.
//!
//! PPTX files are ZIP archives containing XML files in Open XML format.
//! Slides are in `ppt/slides/slideN.xml`. ZIP entries come back in archive
//! order, which for edited decks is not slide order, so slides are sorted
//! by their numeric suffix before their text is emitted. Each slide becomes
//! a `[Slide N]` block; blocks are separated by blank lines.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::ExtractError;

/// Extracts slide text in ascending slide order.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let cursor = Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| ExtractError::Parse(format!("failed to open .pptx archive: {e}")))?;

    let slide_name = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("slide name pattern");
    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let caps = slide_name.captures(name)?;
            let number = caps[1].parse::<usize>().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut blocks: Vec<String> = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml_content = {
            let mut file = archive
                .by_name(&name)
                .map_err(|e| ExtractError::Parse(format!("failed to open {name}: {e}")))?;
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|e| ExtractError::Parse(format!("failed to read {name}: {e}")))?;
            content
        };
        let text = slide_text(&xml_content)?;
        if text.is_empty() {
            blocks.push(format!("[Slide {number}]"));
        } else {
            blocks.push(format!("[Slide {number}]\n{text}"));
        }
    }

    Ok(blocks.join("\n\n"))
}

/// Collects the `a:t` text runs of one slide, one line per `a:p` paragraph.
fn slide_text(xml_content: &str) -> Result<String, ExtractError> {
    // Whitespace inside `a:t` runs is significant; only text seen while a
    // run is open is collected.
    let mut reader = Reader::from_str(xml_content);

    let mut buf = Vec::new();
    let mut lines: Vec<String> = Vec::new();
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
                        lines.push(current.trim().to_string());
                    }
                    current.clear();
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Parse(format!("XML parse error in slide: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn slide_xml(text: &str) -> String {
        format!(
            r#"<p:sld xmlns:a="http://example.com/a" xmlns:p="http://example.com/p">
                 <p:cSld><p:spTree><p:sp><p:txBody>
                   <a:p><a:r><a:t>{text}</a:t></a:r></a:p>
                 </p:txBody></p:sp></p:spTree></p:cSld>
               </p:sld>"#
        )
    }

    /// Builds a deck whose archive lists entries in the given order.
    fn pptx_bytes(entries: &[(&str, String)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn slides_come_out_in_numeric_order_whatever_the_archive_order() {
        let bytes = pptx_bytes(&[
            ("ppt/slides/slide10.xml", slide_xml("tenth")),
            ("ppt/slides/slide2.xml", slide_xml("second")),
            ("ppt/presentation.xml", "<p:presentation/>".to_string()),
            ("ppt/slides/slide1.xml", slide_xml("first")),
            ("ppt/slides/_rels/slide1.xml.rels", "<r/>".to_string()),
        ]);

        let text = extract_text(&bytes).unwrap();
        assert_eq!(
            text,
            "[Slide 1]\nfirst\n\n[Slide 2]\nsecond\n\n[Slide 10]\ntenth"
        );
    }

    #[test]
    fn paragraphs_within_a_slide_become_lines() {
        let xml = r#"<p:sld xmlns:a="http://example.com/a" xmlns:p="http://example.com/p">
              <p:cSld><p:spTree><p:sp><p:txBody>
                <a:p><a:r><a:t>Title line</a:t></a:r></a:p>
                <a:p><a:r><a:t>Bullet </a:t></a:r><a:r><a:t>one</a:t></a:r></a:p>
              </p:txBody></p:sp></p:spTree></p:cSld>
            </p:sld>"#;
        let bytes = pptx_bytes(&[("ppt/slides/slide1.xml", xml.to_string())]);

        let text = extract_text(&bytes).unwrap();
        assert_eq!(text, "[Slide 1]\nTitle line\nBullet one");
    }

    #[test]
    fn empty_slides_still_get_their_label() {
        let empty = r#"<p:sld xmlns:p="http://example.com/p"><p:cSld/></p:sld>"#;
        let bytes = pptx_bytes(&[
            ("ppt/slides/slide1.xml", slide_xml("content")),
            ("ppt/slides/slide2.xml", empty.to_string()),
        ]);

        let text = extract_text(&bytes).unwrap();
        assert_eq!(text, "[Slide 1]\ncontent\n\n[Slide 2]");
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = extract_text(b"definitely not a deck").unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }
}
