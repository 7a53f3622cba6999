//! OCR engine backed by poppler's `pdftoppm` and the `tesseract` CLI
//!
//! Pages are rasterized to PNG, then each page image is recognized with
//! tesseract's TSV output so a confidence can be computed per page.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{Error, Result};

/// Recognized text of one page image
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPage {
    pub text: String,
    /// Mean word confidence, 0-100
    pub confidence: f64,
}

/// Rasterizes PDFs and recognizes page images.
///
/// Calls block; run them off the async runtime.
pub trait OcrEngine: Send + Sync {
    /// Render every page of `pdf_path` into `out_dir`, returning image paths in page order
    fn rasterize(&self, pdf_path: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>>;

    /// Recognize one page image with the given page segmentation mode
    fn recognize(&self, image_path: &Path, psm: u8, language: &str) -> Result<OcrPage>;

    /// Engine name (for logging)
    fn name(&self) -> &str;
}

/// `pdftoppm` + `tesseract` subprocess engine
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new() -> Self {
        TesseractEngine
    }

    /// Check if both tools are on PATH
    pub fn is_available() -> bool {
        let runs = |tool: &str, arg: &str| {
            Command::new(tool)
                .arg(arg)
                .output()
                .map(|o| o.status.success() || !o.stderr.is_empty())
                .unwrap_or(false)
        };
        runs("pdftoppm", "-v") && runs("tesseract", "--version")
    }
}

impl OcrEngine for TesseractEngine {
    fn rasterize(&self, pdf_path: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>> {
        let prefix = out_dir.join("page");
        let output = run_tool(
            "pdftoppm",
            Command::new("pdftoppm")
                .arg("-r")
                .arg(dpi.to_string())
                .arg("-png")
                .arg(pdf_path)
                .arg(&prefix),
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "pdftoppm exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let pages = list_page_images(out_dir)?;
        if pages.is_empty() {
            return Err(Error::Ocr("pdftoppm produced no page images".into()));
        }
        debug!(pages = pages.len(), dpi, "Rasterized PDF");
        Ok(pages)
    }

    fn recognize(&self, image_path: &Path, psm: u8, language: &str) -> Result<OcrPage> {
        let output = run_tool(
            "tesseract",
            Command::new("tesseract")
                .arg(image_path)
                .arg("stdout")
                .arg("-l")
                .arg(language)
                .arg("--psm")
                .arg(psm.to_string())
                .arg("tsv"),
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

/// Spawn a tool, mapping a missing binary to `ToolNotFound`
fn run_tool(tool: &str, command: &mut Command) -> Result<std::process::Output> {
    command.output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound {
                tool: tool.to_string(),
            }
        } else {
            Error::Ocr(format!("failed to run {}: {}", tool, e))
        }
    })
}

/// Collect `page-N.png` files in numeric page order.
///
/// pdftoppm zero-pads the number based on the page count (`page-01.png`),
/// so sort on the parsed number rather than the file name.
fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(number) = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        pages.push((number, path));
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

/// Rebuild text and a mean word confidence from tesseract TSV output.
///
/// Columns: level page_num block_num par_num line_num word_num left top width
/// height conf text. Word rows are level 5; rows with conf < 0 carry no word.
pub fn parse_tsv(tsv: &str) -> OcrPage {
    // (block, paragraph, line) -> words, kept in reading order
    let mut lines: BTreeMap<(u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut confidences: Vec<f64> = Vec::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let Ok(conf) = cols[10].trim().parse::<f64>() else {
            continue;
        };
        if word.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        lines.entry(key).or_default().push(word.to_string());
        confidences.push(conf);
    }

    let mut text = String::new();
    let mut previous: Option<(u32, u32)> = None;
    for ((block, par, _), words) in &lines {
        if let Some(prev) = previous {
            // Blank line between paragraphs
            if prev != (*block, *par) {
                text.push('\n');
            }
            text.push('\n');
        }
        text.push_str(&words.join(" "));
        previous = Some((*block, *par));
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    OcrPage { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, par: u32, line: u32, n: u32, conf: f64, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t{n}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_lines_and_confidence() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            word(1, 1, 1, 1, 90.0, "Reward"),
            word(1, 1, 1, 2, 80.0, "Points"),
            word(1, 1, 2, 1, 70.0, "Closing"),
            word(2, 1, 1, 1, 60.0, "1,234"),
        ]
        .join("\n");

        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "Reward Points\nClosing\n\n1,234");
        assert!((page.confidence - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_skips_negative_confidence_and_blank_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 1, -1.0, "ghost"),
            word(1, 1, 1, 2, 88.0, " "),
            word(1, 1, 1, 3, 50.0, "real"),
        ]
        .join("\n");

        let page = parse_tsv(&tsv);
        assert_eq!(page.text, "real");
        assert!((page.confidence - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_empty_output() {
        let page = parse_tsv(HEADER);
        assert!(page.text.is_empty());
        assert_eq!(page.confidence, 0.0);
    }

    #[test]
    fn test_list_page_images_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-10.png", "page-02.png", "page-1.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let pages = list_page_images(dir.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-02.png", "page-10.png"]);
    }

    #[test]
    fn test_missing_tool_maps_to_tool_not_found() {
        let result = run_tool(
            "perks-no-such-binary",
            &mut Command::new("perks-no-such-binary"),
        );
        assert!(matches!(result, Err(Error::ToolNotFound { tool }) if tool == "perks-no-such-binary"));
    }
}
