//! Statement command implementations (list, show, delete, latest)

use anyhow::{Context, Result};
use perks_core::dedup::FilterReason;
use perks_core::models::{StatementRecord, StatementStatus};
use perks_core::{Database, StatementDeduplicator};

use super::{points, truncate};

/// Bank, card, period and balances of one statement
pub fn print_statement_summary(statement: &StatementRecord) {
    let rewards = &statement.reward_points;
    println!("   Bank: {}", statement.bank_name);
    println!("   Card: {}", statement.card_variant);
    println!(
        "   Period: {}",
        statement.statement_period.as_deref().unwrap_or("(not found)")
    );
    println!(
        "   Points: opening {} | earned {} | redeemed {} | adjusted/lapsed {} | closing {}",
        points(rewards.opening),
        points(rewards.earned),
        points(rewards.redeemed),
        points(rewards.adjusted_lapsed),
        points(rewards.closing)
    );
}

pub fn cmd_statements_list(db: &Database, user: &str, status: Option<&str>) -> Result<()> {
    let status: Option<StatementStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .transpose()?;

    let statements = db.list_statements(user, status)?;

    if statements.is_empty() {
        println!("No statements found. Process one with:");
        println!("  perks upload --file statement.pdf");
        return Ok(());
    }

    println!();
    println!(
        "{:>5}  {:<10}  {:<18}  {:<16}  {:<24}  {:>10}",
        "ID", "STATUS", "BANK", "CARD", "PERIOD", "CLOSING"
    );
    println!("{}", "-".repeat(92));

    for s in &statements {
        println!(
            "{:>5}  {:<10}  {:<18}  {:<16}  {:<24}  {:>10}",
            s.id,
            s.status.as_str(),
            truncate(&s.bank_name, 18),
            truncate(&s.card_variant, 16),
            truncate(s.statement_period.as_deref().unwrap_or("-"), 24),
            points(s.reward_points.closing)
        );
    }

    println!();
    println!("{} statement(s)", statements.len());
    Ok(())
}

pub fn cmd_statements_show(db: &Database, user: &str, id: i64, show_text: bool) -> Result<()> {
    let statement = db
        .get_statement(id)?
        .filter(|s| s.user_id == user)
        .with_context(|| format!("Statement {} not found", id))?;

    println!();
    println!("📄 Statement #{} - {}", statement.id, statement.file_name);
    println!("   ─────────────────────────────");
    println!("   Status: {}", statement.status);
    if let Some(ref error) = statement.error_message {
        println!("   Error: {}", error);
    }
    println!("   Source: {}", statement.source);
    println!(
        "   Uploaded: {}",
        statement.uploaded_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(method) = statement.extraction_method {
        match statement.ocr_confidence {
            Some(conf) => println!("   Extraction: {} ({:.0}% confidence)", method, conf),
            None => println!("   Extraction: {}", method),
        }
    }
    if let Some(pages) = statement.page_count {
        println!("   Pages: {}", pages);
    }
    print_statement_summary(&statement);

    if let Some(breakdown) = &statement.reward_points.breakdown {
        for item in breakdown {
            println!("     - {}: {}", item.category, points(Some(item.points)));
        }
    }

    if let Some(ref inbox) = statement.inbox {
        println!();
        println!("   📧 From: {}", inbox.sender.as_deref().unwrap_or("-"));
        println!("      Subject: {}", inbox.subject.as_deref().unwrap_or("-"));
        if let Some(case) = inbox.triage_case {
            println!(
                "      Triage: {} ({})",
                case,
                inbox.triage_reason.as_deref().unwrap_or("-")
            );
        }
    }

    if show_text {
        println!();
        println!("--- Extracted text ---");
        println!("{}", statement.raw_text.as_deref().unwrap_or("(none)"));
    }

    Ok(())
}

pub fn cmd_statements_delete(db: &Database, user: &str, id: i64) -> Result<()> {
    if db.delete_statement(user, id)? {
        println!("🗑️  Deleted statement #{}", id);
        Ok(())
    } else {
        anyhow::bail!("Statement {} not found", id)
    }
}

pub fn cmd_latest(db: &Database, user: &str, json: bool) -> Result<()> {
    let statements = db.completed_statements(user)?;
    let outcome = StatementDeduplicator::with_global_tables().filter_latest(statements);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.latest.is_empty() {
        println!("No completed statements yet.");
        return Ok(());
    }

    println!();
    println!("💳 Latest Statements");
    println!("   ─────────────────────────────");
    for latest in &outcome.latest {
        let s = &latest.statement;
        println!();
        println!("   {} {} (#{})", s.bank_name, s.card_variant, s.id);
        println!(
            "      Period: {}",
            s.statement_period.as_deref().unwrap_or("(no valid date)")
        );
        println!("      Closing balance: {}", points(s.reward_points.closing));
    }

    let older = outcome
        .filtered
        .iter()
        .filter(|f| matches!(f.reason, FilterReason::Older { .. }))
        .count();

    let summary = &outcome.summary;
    println!();
    println!(
        "   {} statement(s), {} card(s): {} older, {} duplicate(s), {} without a valid date",
        summary.total, summary.groups, older, summary.duplicates, summary.no_valid_date
    );
    Ok(())
}
