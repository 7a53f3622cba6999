//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_pipeline` - Database plus model backend, ready to ingest
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use perks_core::{AIBackend, AIClient, Database, GmailMailbox, Pipeline};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Model backend configured from the environment
pub fn ai_from_env() -> Result<AIClient> {
    AIClient::from_env().ok_or_else(|| {
        anyhow::anyhow!(
            "No model backend configured.\n\
             Set OLLAMA_HOST (and optionally OLLAMA_MODEL), or AI_BACKEND=openai_compatible \
             with OPENAI_COMPATIBLE_HOST."
        )
    })
}

/// Database and model backend wired into an ingestion pipeline
pub fn open_pipeline(db_path: &Path, no_encrypt: bool) -> Result<Pipeline> {
    let db = open_db(db_path, no_encrypt)?;
    let ai = ai_from_env()?;
    println!("   🤖 Model: {} ({})", ai.model(), ai.backend_name());
    Ok(Pipeline::new(db, ai))
}

/// Gmail mailbox configured from the environment
pub fn gmail_from_env() -> Result<GmailMailbox> {
    GmailMailbox::from_env().ok_or_else(|| {
        anyhow::anyhow!("GMAIL_ACCESS_TOKEN is not set. Obtain an OAuth token with gmail.readonly scope.")
    })
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Process a statement: perks upload --file statement.pdf");
    println!("  2. Or fetch from Gmail: perks fetch --days 90");
    println!("  3. See your balances:   perks latest");

    Ok(())
}
