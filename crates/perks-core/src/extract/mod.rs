//! PDF text extraction with an OCR fallback
//!
//! 1. Read the text layer of every page directly.
//! 2. If the result looks like a scanned document, rasterize each page and OCR it,
//!    retrying low-confidence pages with another segmentation mode and finally
//!    without image preprocessing.
//!
//! All intermediate files live in a per-document temporary directory that is
//! removed when extraction returns, whatever the outcome.

pub mod direct;
pub mod ocr;
pub mod preprocess;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{ExtractedText, ExtractionMethod};

pub use direct::{extract_pages, looks_like_pdf, DirectText};
pub use ocr::{OcrEngine, OcrPage, TesseractEngine};

/// Below this many characters a document is treated as scanned
pub const MIN_TEXT_CHARS: usize = 100;

/// Below this many characters per page on average a document is treated as scanned
pub const MIN_CHARS_PER_PAGE: usize = 200;

/// Above this share of non-printable or non-ASCII characters the text layer is garbage
pub const MAX_GARBAGE_RATIO: f64 = 0.3;

/// OCR settings
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Rasterization resolution
    pub dpi: u32,
    /// Tesseract language code(s), e.g. "eng" or "eng+hin"
    pub language: String,
    /// Page segmentation mode for the first attempt (3 = fully automatic)
    pub primary_psm: u8,
    /// Page segmentation mode for the retry (6 = single uniform block)
    pub alternate_psm: u8,
    /// Retry with `alternate_psm` below this confidence
    pub retry_threshold: f64,
    /// Retry without preprocessing below this confidence
    pub raw_retry_threshold: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: "eng".to_string(),
            primary_psm: 3,
            alternate_psm: 6,
            retry_threshold: 70.0,
            raw_retry_threshold: 60.0,
        }
    }
}

impl OcrConfig {
    /// Defaults overridden by `PERKS_OCR_LANG` and `PERKS_OCR_DPI`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(lang) = std::env::var("PERKS_OCR_LANG") {
            if !lang.trim().is_empty() {
                config.language = lang.trim().to_string();
            }
        }
        if let Ok(dpi) = std::env::var("PERKS_OCR_DPI") {
            match dpi.trim().parse::<u32>() {
                Ok(value) if value >= 72 => config.dpi = value,
                _ => warn!(value = %dpi, "Ignoring invalid PERKS_OCR_DPI"),
            }
        }
        config
    }
}

/// Decide whether directly extracted text means the PDF is really a scan
pub fn is_scanned(text: &str, page_count: usize) -> bool {
    let total = text.trim().chars().count();
    if total < MIN_TEXT_CHARS || page_count == 0 {
        return true;
    }
    if total / page_count < MIN_CHARS_PER_PAGE {
        return true;
    }
    garbage_ratio(text) > MAX_GARBAGE_RATIO
}

/// Share of characters that are non-ASCII or non-printable control characters
fn garbage_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut garbage = 0usize;
    for c in text.chars() {
        total += 1;
        if !c.is_ascii() || (c.is_control() && !c.is_whitespace()) {
            garbage += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        garbage as f64 / total as f64
    }
}

/// PDF to text, direct first and OCR when needed
#[derive(Clone)]
pub struct TextExtractor {
    config: OcrConfig,
    engine: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    /// Tesseract-backed extractor configured from the environment
    pub fn new() -> Self {
        Self::with_engine(OcrConfig::from_env(), Arc::new(TesseractEngine::new()))
    }

    /// Extractor with an explicit OCR engine
    pub fn with_engine(config: OcrConfig, engine: Arc<dyn OcrEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Extract text from PDF bytes. Blocks on parsing and OCR subprocesses.
    pub fn extract(&self, bytes: &[u8]) -> Result<ExtractedText> {
        let direct = extract_pages(bytes)?;
        let text = direct.joined();
        let page_count = direct.page_count();

        let scanned = is_scanned(&text, page_count);
        if !scanned && text.trim().chars().count() > MIN_TEXT_CHARS {
            debug!(pages = page_count, chars = text.len(), "Using direct text layer");
            return Ok(ExtractedText {
                text,
                page_count,
                scanned: false,
                method: ExtractionMethod::Direct,
                ocr_confidence: None,
            });
        }

        info!(pages = page_count, "Text layer unusable, falling back to OCR");
        self.extract_with_ocr(bytes)
    }

    /// Extract text from a PDF on disk
    pub fn extract_file(&self, path: &Path) -> Result<ExtractedText> {
        let bytes = std::fs::read(path)?;
        self.extract(&bytes)
    }

    /// Run `extract` on the blocking thread pool
    pub async fn extract_async(&self, bytes: Vec<u8>) -> Result<ExtractedText> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .map_err(|e| Error::Extraction(format!("extraction task failed: {}", e)))?
    }

    /// Run `extract_file` on the blocking thread pool
    pub async fn extract_file_async(&self, path: PathBuf) -> Result<ExtractedText> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract_file(&path))
            .await
            .map_err(|e| Error::Extraction(format!("extraction task failed: {}", e)))?
    }

    fn extract_with_ocr(&self, bytes: &[u8]) -> Result<ExtractedText> {
        // Dropped on every return path, taking the PDF copy and page images with it
        let workdir = tempfile::Builder::new().prefix("perks-ocr-").tempdir()?;
        let pdf_path = workdir.path().join("document.pdf");
        std::fs::write(&pdf_path, bytes)?;

        let images = self
            .engine
            .rasterize(&pdf_path, workdir.path(), self.config.dpi)?;

        let mut sections = Vec::with_capacity(images.len());
        let mut confidences = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let page_number = index + 1;
            let page = self.recognize_page(image, page_number)?;
            sections.push(format!("--- Page {} ---\n{}", page_number, page.text.trim()));
            confidences.push(page.confidence);
        }

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        info!(
            pages = images.len(),
            confidence = format!("{confidence:.1}"),
            engine = self.engine.name(),
            "OCR finished"
        );

        Ok(ExtractedText {
            text: sections.join("\n\n"),
            page_count: images.len(),
            scanned: true,
            method: ExtractionMethod::Ocr,
            ocr_confidence: Some(confidence),
        })
    }

    /// OCR one page, keeping the best of up to three attempts
    fn recognize_page(&self, image: &Path, page_number: usize) -> Result<OcrPage> {
        let cfg = &self.config;
        let language = cfg.language.as_str();

        let prepared = image.with_extension("prep.png");
        let input = match preprocess::preprocess_page(image, &prepared) {
            Ok(()) => prepared.as_path(),
            Err(e) => {
                warn!(page = page_number, error = %e, "Preprocessing failed, using raw page");
                image
            }
        };
        let preprocessed = input != image;

        let mut best = self.engine.recognize(input, cfg.primary_psm, language)?;
        debug!(
            page = page_number,
            psm = cfg.primary_psm,
            confidence = best.confidence,
            "OCR attempt"
        );

        if best.confidence < cfg.retry_threshold {
            let retry = self.engine.recognize(input, cfg.alternate_psm, language)?;
            debug!(
                page = page_number,
                psm = cfg.alternate_psm,
                confidence = retry.confidence,
                "OCR retry with alternate segmentation"
            );
            if retry.confidence > best.confidence {
                best = retry;
            }
        }

        if best.confidence < cfg.raw_retry_threshold && preprocessed {
            let raw = self.engine.recognize(image, cfg.primary_psm, language)?;
            debug!(
                page = page_number,
                confidence = raw.confidence,
                "OCR retry without preprocessing"
            );
            if raw.confidence > best.confidence {
                best = raw;
            }
        }

        Ok(best)
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}
