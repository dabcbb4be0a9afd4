//! Document parsing: the upload-time text extractor.
//!
//! [`Parser`] turns an uploaded file into plain text plus metadata.
//! [`OfficeParser`] handles every accepted [`FileType`]: PDF through
//! `pdf-extract`, and the OOXML formats (DOCX, PPTX, XLSX) by reading the
//! relevant XML parts out of the ZIP container with `quick-xml`.
//!
//! Text layout per format:
//! - DOCX: one line per paragraph.
//! - PPTX: slides in numeric order, separated by a blank line.
//! - XLSX: sheets in numeric order, one line per row, cells separated by tabs.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use docrag_core::models::FileType;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Extracted text and format-specific metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub text: String,
    pub metadata: serde_json::Value,
}

/// Upload-time text extractor.
pub trait Parser: Send + Sync {
    fn parse(&self, path: &Path, file_type: FileType) -> Result<ParsedDocument, ExtractError>;
}

/// [`Parser`] for PDF and Office Open XML files.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfficeParser;

impl Parser for OfficeParser {
    fn parse(&self, path: &Path, file_type: FileType) -> Result<ParsedDocument, ExtractError> {
        let bytes = std::fs::read(path).map_err(|source| ExtractError::Read {
            path: path.display().to_string(),
            source,
        })?;
        parse_bytes(&bytes, file_type)
    }
}

/// Extract text from in-memory file content.
pub fn parse_bytes(bytes: &[u8], file_type: FileType) -> Result<ParsedDocument, ExtractError> {
    let (text, mut metadata) = match file_type {
        FileType::Pdf => (extract_pdf(bytes)?, serde_json::json!({})),
        FileType::Docx => {
            let (text, paragraphs) = extract_docx(bytes)?;
            (text, serde_json::json!({ "paragraph_count": paragraphs }))
        }
        FileType::Pptx => {
            let (text, slides) = extract_pptx(bytes)?;
            (text, serde_json::json!({ "slide_count": slides }))
        }
        FileType::Xlsx => {
            let (text, sheets) = extract_xlsx(bytes)?;
            (text, serde_json::json!({ "sheet_count": sheets }))
        }
    };

    metadata["file_type"] = serde_json::json!(file_type.as_str());
    metadata["mime_type"] = serde_json::json!(file_type.mime());
    metadata["char_count"] = serde_json::json!(text.chars().count());
    Ok(ParsedDocument { text, metadata })
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let text =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(text.trim().to_string())
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Numbered parts like `ppt/slides/slide12.xml`, in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn xml_err(e: quick_xml::Error) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

/// Text of every `<t>` element, one line per `<p>` paragraph. Used for
/// both WordprocessingML (`w:`) and DrawingML (`a:`) bodies.
fn paragraphs_text(xml: &[u8]) -> Result<(String, usize), ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
            Event::Text(te) if in_t => {
                current.push_str(&te.unescape().map_err(xml_err)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        lines.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    let count = lines.len();
    Ok((lines.join("\n"), count))
}

fn extract_docx(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    paragraphs_text(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    let mut archive = open_archive(bytes)?;
    let slide_names = numbered_parts(&archive, "ppt/slides/slide");
    let mut slides = Vec::with_capacity(slide_names.len());
    for name in &slide_names {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        let (text, _) = paragraphs_text(&xml)?;
        if !text.is_empty() {
            slides.push(text);
        }
    }
    Ok((slides.join("\n\n"), slide_names.len()))
}

fn extract_xlsx(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    let mut archive = open_archive(bytes)?;
    // A workbook with only numbers has no shared strings part.
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let sheet_names = numbered_parts(&archive, "xl/worksheets/sheet");
    let mut sheets = Vec::new();
    for name in sheet_names.iter().take(XLSX_MAX_SHEETS) {
        let xml = read_zip_entry_bounded(&mut archive, name)?;
        let text = sheet_rows(&xml, &shared_strings)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok((sheets.join("\n\n"), sheet_names.len().min(XLSX_MAX_SHEETS)))
}

fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Text(te) if in_t => current.push_str(&te.unescape().map_err(xml_err)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

fn sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut capture = false;
    let mut cells = 0usize;

    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => capture = kind != CellKind::Inline,
                b"t" => capture = kind == CellKind::Inline,
                _ => {}
            },
            Event::Text(te) if capture => {
                let raw = te.unescape().map_err(xml_err)?;
                let value = raw.trim();
                let text = match kind {
                    CellKind::Shared => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i))
                        .cloned(),
                    _ => Some(value.to_string()),
                };
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    row.push(text);
                    cells += 1;
                }
                capture = false;
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                    }
                    row.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = parse_bytes(b"not a pdf", FileType::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = parse_bytes(b"not a zip", FileType::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
<w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
</w:body></w:document>"#;
        let bytes = zip_with(&[("word/document.xml", xml)]);
        let parsed = parse_bytes(&bytes, FileType::Docx).unwrap();
        assert_eq!(parsed.text, "Hello world\nSecond & last");
        assert_eq!(parsed.metadata["paragraph_count"], 2);
        assert_eq!(parsed.metadata["file_type"], "docx");
        assert_eq!(parsed.metadata["char_count"], 25);
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
                text
            )
        };
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let bytes = zip_with(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        let parsed = parse_bytes(&bytes, FileType::Pptx).unwrap();
        assert_eq!(parsed.text, "first\n\nsecond\n\ntenth");
        assert_eq!(parsed.metadata["slide_count"], 3);
    }

    #[test]
    fn xlsx_rows_and_cell_kinds() {
        let shared = r#"<sst xmlns="x"><si><t>Name</t></si><si><t>Score</t></si><si><t>Ada</t></si></sst>"#;
        let sheet = r#"<worksheet xmlns="x"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>42</v></c><c r="C2" t="inlineStr"><is><t>inline</t></is></c></row>
</sheetData></worksheet>"#;
        let bytes = zip_with(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let parsed = parse_bytes(&bytes, FileType::Xlsx).unwrap();
        assert_eq!(parsed.text, "Name\tScore\nAda\t42\tinline");
        assert_eq!(parsed.metadata["sheet_count"], 1);
    }

    #[test]
    fn parser_reports_missing_file() {
        let err = OfficeParser
            .parse(Path::new("/definitely/not/here.pdf"), FileType::Pdf)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
