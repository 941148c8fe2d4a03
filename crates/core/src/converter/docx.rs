//! Minimal WordprocessingML writer: one plain-text paragraph per entry.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::ConverterError;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const DOCUMENT_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;

const DOCUMENT_TAIL: &str = "<w:sectPr/></w:body></w:document>";

fn zip_err(e: zip::result::ZipError) -> ConverterError {
    ConverterError::codec(format!("failed to write docx: {}", e))
}

/// Escapes text for use in XML character data.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab are not allowed in XML 1.0.
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

/// Renders `word/document.xml`.
pub fn document_xml<S: AsRef<str>>(paragraphs: &[S]) -> String {
    let mut xml = String::from(DOCUMENT_HEAD);
    for paragraph in paragraphs {
        xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
        xml.push_str(&escape_xml(paragraph.as_ref()));
        xml.push_str("</w:t></w:r></w:p>");
    }
    xml.push_str(DOCUMENT_TAIL);
    xml
}

/// Writes a `.docx` package at `path` containing `paragraphs`.
pub fn write_paragraphs<S: AsRef<str>>(path: &Path, paragraphs: &[S]) -> Result<(), ConverterError> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/document.xml", document_xml(paragraphs)),
    ];
    for (name, body) in parts {
        zip.start_file(name, options).map_err(zip_err)?;
        zip.write_all(body.as_bytes())?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_xml("tab\there\u{0007}"), "tab\there");
    }

    #[test]
    fn test_document_xml_one_paragraph_per_entry() {
        let xml = document_xml(&["First", "Second <draft>"]);
        assert_eq!(xml.matches("<w:p>").count(), 2);
        assert!(xml.contains(">Second &lt;draft&gt;</w:t>"));
    }

    #[test]
    fn test_write_paragraphs_produces_docx_package() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        write_paragraphs(&path, &["Hello", "World"]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(infer::doc::is_docx(&bytes));

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut document = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut document)
            .unwrap();
        assert!(document.contains(">Hello</w:t>"));
        assert!(document.contains(">World</w:t>"));
    }
}
