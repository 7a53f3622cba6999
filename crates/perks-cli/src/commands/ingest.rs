//! Ingestion command implementations (upload, fetch)

use std::path::Path;

use anyhow::{Context, Result};
use perks_core::mailbox::{InboxQuery, Mailbox};
use perks_core::models::RawDocument;
use perks_core::{IngestOutcome, Pipeline, UploadOptions};

use super::statements::print_statement_summary;

pub async fn cmd_upload(pipeline: &Pipeline, user: &str, file: &Path, force: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "statement.pdf".to_string());

    println!("📥 Processing {}...", file_name);

    let outcome = pipeline
        .ingest_upload(user, RawDocument::manual(file_name, bytes), UploadOptions { force })
        .await
        .context("Failed to store statement")?;

    match outcome {
        IngestOutcome::Completed(statement) => {
            println!("✅ Statement processed");
            print_statement_summary(&statement);
            Ok(())
        }
        IngestOutcome::Duplicate(statement) => {
            println!(
                "⏭️  Already processed as statement #{} ({})",
                statement.id, statement.status
            );
            Ok(())
        }
        IngestOutcome::Failed { statement, error } => {
            println!("❌ Statement #{} failed: {}", statement.id, error);
            if error.is_retryable() {
                println!("   This may succeed if you upload the file again later.");
            } else if matches!(
                error,
                perks_core::Error::NotAStatement(_) | perks_core::Error::InsufficientText { .. }
            ) {
                println!("   Use --force to process it anyway.");
            }
            Err(anyhow::anyhow!("statement processing failed ({})", error.kind()))
        }
    }
}

pub async fn cmd_fetch(
    pipeline: &Pipeline,
    user: &str,
    mailbox: &dyn Mailbox,
    days: i64,
    max: usize,
) -> Result<()> {
    let query = InboxQuery::last_days(days).with_max_results(max);
    println!("📬 Searching {} ({})...", mailbox.name(), query.to_query_string());

    let summary = pipeline
        .fetch_inbox(user, mailbox, &query)
        .await
        .context("Mailbox search failed")?;

    println!();
    println!("📊 Fetch Results");
    println!("   ─────────────────────────────");
    println!("   Messages examined: {}", summary.messages);
    println!("   ✅ Processed: {}", summary.processed);
    println!("   ⏭️  Already known: {}", summary.duplicate);
    println!("   🚫 Not statements: {}", summary.rejected);
    println!("   ❌ Failed: {}", summary.failed);

    if !summary.failures.is_empty() {
        println!();
        for failure in &summary.failures {
            let what = failure.file_name.as_deref().unwrap_or("(message)");
            let hint = if failure.retryable { " [retryable]" } else { "" };
            println!(
                "   {} {}: {}{}",
                failure.message_id, what, failure.error, hint
            );
        }
    }

    if summary.processed > 0 {
        println!();
        println!("Run 'perks latest' to see your current balances.");
    }

    Ok(())
}
