//! Text-layer extraction with lopdf

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Text read straight from the PDF's text layer
#[derive(Debug, Clone)]
pub struct DirectText {
    /// Per-page text, in page order
    pub pages: Vec<String>,
}

impl DirectText {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All pages joined with newlines
    pub fn joined(&self) -> String {
        self.pages.join("\n")
    }
}

/// Check the `%PDF-` signature, tolerating leading whitespace
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF-")
}

/// Load a PDF and extract each page's text layer.
///
/// A page whose text cannot be decoded contributes an empty string rather than
/// failing the document; the scanned heuristic decides what to do next.
pub fn extract_pages(bytes: &[u8]) -> Result<DirectText> {
    if !looks_like_pdf(bytes) {
        return Err(Error::Extraction("file is not a PDF".into()));
    }

    let doc = Document::load_mem(bytes)
        .map_err(|e| Error::Extraction(format!("failed to parse PDF: {}", e)))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(page = number, error = %e, "Could not read page text layer");
                pages.push(String::new());
            }
        }
    }

    debug!(pages = pages.len(), "Direct text extraction finished");
    Ok(DirectText { pages })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    /// Build a PDF with one page per entry, each line in its own text object
    pub(crate) fn make_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
                operations.push(Operation::new(
                    "Td",
                    vec![40.into(), (800 - (i as i64) * 14).into()],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(looks_like_pdf(b"\n  %PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04 zip file"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn test_not_a_pdf_is_extraction_error() {
        let result = extract_pages(b"hello, I am a text file");
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_truncated_pdf_is_extraction_error() {
        let result = extract_pages(b"%PDF-1.4\n%garbage with no objects");
        assert!(matches!(result, Err(Error::Extraction(_))));
    }

    #[test]
    fn test_extracts_each_page() {
        let pdf = make_pdf(&[&["Statement Date 18/04/2024"], &["Reward Points Summary"]]);
        let text = extract_pages(&pdf).unwrap();
        assert_eq!(text.page_count(), 2);
        assert!(text.pages[0].contains("Statement Date"));
        assert!(text.pages[1].contains("Reward Points"));
        assert!(text.joined().contains('\n'));
    }
}
