//! Status command implementation

use std::path::Path;

use anyhow::Result;
use perks_core::db::DB_KEY_ENV;
use perks_core::extract::{OcrConfig, TesseractEngine};
use perks_core::AIBackend;

use super::{ai_from_env, open_db};

pub fn cmd_status(db_path: &Path, user: &str, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Perks Status");
    println!("   ─────────────────────────────────────────────────────────────");

    // Database path
    println!("   Database: {}", db_path.display());

    // Check if database file exists and get size
    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    // Check encryption status
    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Model backend
    match ai_from_env() {
        Ok(ai) => println!(
            "   🤖 Model: {} via {} ({})",
            ai.model(),
            ai.backend_name(),
            ai.host()
        ),
        Err(_) => println!("   🤖 Model: not configured (set OLLAMA_HOST)"),
    }

    // OCR tools
    let ocr = OcrConfig::from_env();
    if TesseractEngine::is_available() {
        println!("   🔍 OCR: tesseract ({}, {} dpi)", ocr.language, ocr.dpi);
    } else {
        println!("   🔍 OCR: unavailable (install poppler-utils and tesseract)");
    }

    // Try to open the database and show counts
    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(counts) = db.statement_counts(user) {
                    println!();
                    println!("   Statements for '{}': {}", user, counts.total());
                    println!("     ✅ Completed: {}", counts.completed);
                    println!("     ⏳ Processing: {}", counts.processing);
                    println!("     ❌ Failed: {}", counts.failed);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}
