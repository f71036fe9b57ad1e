//! Attachment text extraction
//!
//! Only three formats are read: PDF, DOCX and PPTX. The reconciler routes
//! attachments here by file extension; anything else is skipped before it
//! gets this far.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;
use std::io::{Cursor, Read};

/// Maximum decompressed bytes read from a single ZIP entry
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Attachment formats with text extraction support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentFormat {
    Pdf,
    Docx,
    Pptx,
}

impl AttachmentFormat {
    /// Match a lowercase extension without the dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
        }
    }
}

impl fmt::Display for AttachmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Trait for attachment text extractors
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], format: AttachmentFormat) -> Result<String>;
}

/// Extractor backed by pdf-extract and an OOXML reader
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], format: AttachmentFormat) -> Result<String> {
        let text = match format {
            AttachmentFormat::Pdf => extract_pdf(bytes)?,
            AttachmentFormat::Docx => extract_docx(bytes)?,
            AttachmentFormat::Pptx => extract_pptx(bytes)?,
        };
        Ok(text.trim().to_string())
    }
}

#[cfg(feature = "pdf")]
fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Extraction(format!("PDF extraction failed: {}", e)))
}

#[cfg(not(feature = "pdf"))]
fn extract_pdf(_bytes: &[u8]) -> Result<String> {
    Err(Error::UnsupportedFormat(
        "pdf (built without the `pdf` feature)".to_string(),
    ))
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Extraction(format!("Invalid OOXML archive: {}", e)))
}

fn read_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .map_err(|e| Error::Extraction(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::Extraction(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry_bounded(&mut archive, "word/document.xml")?;
    collect_text_runs(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    slides.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut parts = Vec::with_capacity(slides.len());
    for name in slides {
        let xml = read_entry_bounded(&mut archive, &name)?;
        let text = collect_text_runs(&xml)?;
        if !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    Ok(parts.join("\n\n"))
}

/// Concatenate `<*:t>` runs, one line per `<*:p>` paragraph.
///
/// Works for both WordprocessingML (`w:t`, `w:p`) and DrawingML (`a:t`, `a:p`).
fn collect_text_runs(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| Error::Extraction(format!("Bad XML text: {}", e)))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Extraction(format!("Malformed XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
