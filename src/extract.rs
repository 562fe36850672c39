//! Multi-format text extraction for uploaded documents.
//!
//! The batch supplies bytes plus a resolved [`ContentKind`]; this module
//! returns plain UTF-8 text. Malformed input is an [`ExtractError`], never a
//! panic.

use std::io::Read;
use thiserror::Error;

use crate::models::ContentKind;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type")]
    UnsupportedContentType,
    #[error("text is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Extracts plain text from document bytes.
pub fn extract_text(bytes: &[u8], kind: ContentKind) -> Result<String, ExtractError> {
    match kind {
        ContentKind::PlainText => extract_plain(bytes),
        ContentKind::WordDoc => extract_docx(bytes),
        ContentKind::SlideDeck => extract_pptx(bytes),
        ContentKind::Pdf => extract_pdf(bytes),
        ContentKind::Unsupported => Err(ExtractError::UnsupportedContentType),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ExtractError::Encoding(e.to_string()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Word documents: paragraph texts joined by a single space.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    Ok(paragraph_texts(&doc_xml)?.join(" "))
}

/// Slide decks: slides in numeric order, separated by a single space.
fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    if slide_names.is_empty() {
        return Err(ExtractError::Ooxml("no slides found".to_string()));
    }
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = paragraph_texts(&xml)?
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Collects the text of `<*:t>` runs grouped by their enclosing `<*:p>`.
///
/// Works for both WordprocessingML (`w:p`/`w:t`) and DrawingML (`a:p`/`a:t`).
/// Whitespace inside runs is kept, since run boundaries often fall between words.
fn paragraph_texts(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                // <w:p/> is an empty paragraph
                if e.local_name().as_ref() == b"p" {
                    paragraphs.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.get_or_insert_with(String::new).push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    // Runs outside any paragraph (malformed but seen in the wild)
    if let Some(p) = current.take() {
        paragraphs.push(p);
    }
    Ok(paragraphs)
}
