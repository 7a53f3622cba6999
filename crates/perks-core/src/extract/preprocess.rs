//! Page image cleanup before OCR
//!
//! grayscale -> contrast stretch -> unsharp mask -> Otsu binarization

use std::path::Path;

use image::{imageops, GrayImage};

use crate::error::{Error, Result};

/// Preprocess the page image at `input` and write the result to `output` (PNG)
pub fn preprocess_page(input: &Path, output: &Path) -> Result<()> {
    let img = image::open(input)
        .map_err(|e| Error::Ocr(format!("failed to decode page image: {}", e)))?;

    let gray = img.to_luma8();
    let normalized = normalize_contrast(gray);
    let sharpened = imageops::unsharpen(&normalized, 1.0, 2);
    let binary = binarize(sharpened);

    binary
        .save(output)
        .map_err(|e| Error::Ocr(format!("failed to write preprocessed page: {}", e)))
}

/// Stretch intensities so the darkest pixel becomes 0 and the lightest 255
pub fn normalize_contrast(mut img: GrayImage) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));

    if max <= min {
        return img;
    }

    let range = (max - min) as f32;
    for p in img.pixels_mut() {
        let v = (p.0[0] - min) as f32 / range * 255.0;
        p.0[0] = v.round() as u8;
    }
    img
}

/// Threshold at the Otsu level: text black, background white
pub fn binarize(mut img: GrayImage) -> GrayImage {
    let level = otsu_level(&img);
    for p in img.pixels_mut() {
        p.0[0] = if p.0[0] > level { 255 } else { 0 };
    }
    img
}

/// Threshold that maximizes between-class variance of the histogram
pub fn otsu_level(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 127;
    }

    let weighted_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut background_weight = 0u64;
    let mut background_sum = 0f64;
    let mut best_variance = 0f64;
    let mut best_level = 0u8;

    for (level, &count) in histogram.iter().enumerate() {
        background_weight += count;
        if background_weight == 0 {
            continue;
        }
        let foreground_weight = total - background_weight;
        if foreground_weight == 0 {
            break;
        }

        background_sum += level as f64 * count as f64;
        let background_mean = background_sum / background_weight as f64;
        let foreground_mean = (weighted_sum - background_sum) / foreground_weight as f64;
        let diff = background_mean - foreground_mean;
        let variance = background_weight as f64 * foreground_weight as f64 * diff * diff;

        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}
