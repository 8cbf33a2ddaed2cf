//! Document loading.
//!
//! [`load_document`] turns one file into [`Document`]s according to its
//! [`DocumentFormat`], which is chosen by file extension:
//!
//! | Format   | Extensions     | Documents produced            |
//! |----------|----------------|-------------------------------|
//! | PDF      | `.pdf`         | one per non-empty page        |
//! | Word     | `.docx`        | one for the whole file        |
//! | Excel    | `.xlsx`        | one per non-empty sheet       |
//! | Markdown | `.md`, `.mdx`  | one for the whole file        |
//!
//! Parsing runs on a blocking thread. Any failure, including a panic inside a
//! parser, comes back as [`RagError::Load`].

use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use quick_xml::events::Event as XmlEvent;
use tracing::{debug, error};

use crate::document::{Document, SOURCE_KEY};
use crate::error::{LoadErrorKind, RagError, Result};

/// A supported input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Markdown,
}

impl DocumentFormat {
    /// Every supported format, in display order.
    pub const ALL: [DocumentFormat; 4] = [Self::Pdf, Self::Docx, Self::Xlsx, Self::Markdown];

    /// Lower-case extensions (without the dot) handled by this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Pdf => &["pdf"],
            Self::Docx => &["docx"],
            Self::Xlsx => &["xlsx"],
            Self::Markdown => &["md", "mdx"],
        }
    }

    /// Human-readable label, as shown in file pickers.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF files",
            Self::Docx => "Word files",
            Self::Xlsx => "Excel files",
            Self::Markdown => "Markdown files",
        }
    }

    /// Look up a format by extension, ignoring case and a leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL.into_iter().find(|format| format.extensions().contains(&ext.as_str()))
    }

    /// Look up a format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }

    fn extract(self, bytes: &[u8]) -> std::result::Result<Vec<Document>, String> {
        match self {
            Self::Pdf => extract_pdf(bytes),
            Self::Docx => extract_docx(bytes).map(|text| vec![Document::new(text)]),
            Self::Xlsx => extract_xlsx(bytes),
            Self::Markdown => extract_markdown(bytes).map(|text| vec![Document::new(text)]),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
            Self::Markdown => "markdown",
        };
        f.write_str(name)
    }
}

/// All supported extensions with a leading dot, e.g. `[".pdf", ".docx", ...]`.
pub fn supported_extensions() -> Vec<String> {
    DocumentFormat::ALL
        .iter()
        .flat_map(|format| format.extensions())
        .map(|ext| format!(".{ext}"))
        .collect()
}

/// Load `path` into one or more [`Document`]s.
///
/// Every document carries `source` (the full path), `file_name` and `format`
/// metadata, plus `page` for PDFs or `sheet` for spreadsheets.
///
/// # Errors
///
/// Returns [`RagError::Load`] with:
/// - [`LoadErrorKind::UnsupportedType`] for an unknown extension
/// - [`LoadErrorKind::Unreadable`] if the file cannot be read
/// - [`LoadErrorKind::Corrupt`] if parsing fails or the parser panics
/// - [`LoadErrorKind::Empty`] if no text could be extracted
pub async fn load_document(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let file_name = file_name_of(path);

    let Some(format) = DocumentFormat::from_path(path) else {
        let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        return Err(RagError::load(
            path,
            LoadErrorKind::UnsupportedType,
            format!("Unsupported file type: {}", if ext.is_empty() { &file_name } else { &ext }),
        ));
    };

    debug!(file = %file_name, %format, "loading document");

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        error!(file = %file_name, error = %e, "failed to read file");
        RagError::load(path, LoadErrorKind::Unreadable, format!("Could not read {file_name}: {e}"))
    })?;

    let extracted = tokio::task::spawn_blocking(move || format.extract(&bytes))
        .await
        .map_err(|e| {
            error!(file = %file_name, error = %e, "extraction task failed");
            RagError::load(
                path,
                LoadErrorKind::Corrupt,
                format!("Failed to parse {file_name}: parser crashed"),
            )
        })?
        .map_err(|e| {
            error!(file = %file_name, error = %e, "extraction failed");
            RagError::load(
                path,
                LoadErrorKind::Corrupt,
                format!("Failed to parse {file_name}: {e}"),
            )
        })?;

    let source = path.to_string_lossy().into_owned();
    let documents: Vec<Document> = extracted
        .into_iter()
        .filter(|document| !document.text.trim().is_empty())
        .map(|document| {
            document
                .with_metadata(SOURCE_KEY, source.as_str())
                .with_metadata("file_name", file_name.as_str())
                .with_metadata("format", format.to_string())
        })
        .collect();

    if documents.is_empty() {
        return Err(RagError::load(
            path,
            LoadErrorKind::Empty,
            format!("No text could be extracted from {file_name}"),
        ));
    }

    debug!(file = %file_name, documents = documents.len(), "loaded document");
    Ok(documents)
}

/// The final path component as a display string.
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

// ── Format extractors ──────────────────────────────────────────────

/// One document per non-empty page, numbered from 1.
fn extract_pdf(bytes: &[u8]) -> std::result::Result<Vec<Document>, String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())?;
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(index, page)| Document::new(page).with_metadata("page", index + 1))
        .collect())
}

/// Text runs of `word/document.xml`, one line per paragraph.
fn extract_docx(bytes: &[u8]) -> std::result::Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing word/document.xml: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            XmlEvent::Start(tag) => match tag.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" => in_text = true,
                _ => {}
            },
            XmlEvent::Empty(tag) => match tag.local_name().as_ref() {
                // `w:tab` also appears in paragraph properties as a tab stop.
                b"tab" if in_run => text.push('\t'),
                b"br" | b"cr" if in_run => text.push('\n'),
                _ => {}
            },
            XmlEvent::End(tag) => match tag.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            XmlEvent::Text(content) if in_text => {
                text.push_str(&content.unescape().map_err(|e| e.to_string())?);
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

/// One document per non-empty sheet, rows as tab-separated lines.
fn extract_xlsx(bytes: &[u8]) -> std::result::Result<Vec<Document>, String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let mut documents = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet).map_err(|e| format!("sheet '{sheet}': {e}"))?;
        let rows: Vec<String> = range
            .rows()
            .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
            .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>().join("\t"))
            .collect();
        if !rows.is_empty() {
            documents.push(Document::new(rows.join("\n")).with_metadata("sheet", sheet));
        }
    }
    Ok(documents)
}

/// Markdown reduced to plain text, blocks separated by blank lines.
fn extract_markdown(bytes: &[u8]) -> std::result::Result<String, String> {
    let source = std::str::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {e}"))?;

    let mut text = String::new();
    for event in Parser::new(source) {
        match event {
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) if !text.is_empty() && !text.ends_with('\n') => text.push('\n'),
            Event::End(
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock | TagEnd::List(_),
            ) => {
                text.truncate(text.trim_end().len());
                text.push_str("\n\n");
            }
            Event::End(TagEnd::Item) if !text.ends_with('\n') => text.push('\n'),
            _ => {}
        }
    }

    Ok(text.trim().to_string())
}
