//! Single-stage commands that run part of the pipeline without storing anything

use std::path::Path;

use anyhow::{Context, Result};
use perks_core::models::{ClassificationVerdict, ExtractedText};
use perks_core::{ContentClassifier, EmailEnvelope, EmailTriage, TextExtractor, TriageStage};

async fn extract_file(file: &Path) -> Result<ExtractedText> {
    TextExtractor::new()
        .extract_file_async(file.to_path_buf())
        .await
        .with_context(|| format!("Failed to extract text from {}", file.display()))
}

fn print_verdict(verdict: &ClassificationVerdict) {
    let label = if verdict.is_statement {
        "✅ Credit card statement"
    } else {
        "🚫 Not a statement"
    };
    println!("{} ({} confidence, score {})", label, verdict.confidence, verdict.score);
    if !verdict.matched.is_empty() {
        println!("   Matched: {}", verdict.matched.join(", "));
    }
    if let Some(ref reason) = verdict.reason {
        println!("   Reason: {}", reason);
    }
}

pub async fn cmd_analyze_text(file: &Path) -> Result<()> {
    let extracted = extract_file(file).await?;

    eprintln!(
        "method={} pages={} scanned={}{}",
        extracted.method,
        extracted.page_count,
        extracted.scanned,
        extracted
            .ocr_confidence
            .map(|c| format!(" confidence={:.1}", c))
            .unwrap_or_default()
    );
    println!("{}", extracted.text);
    Ok(())
}

pub async fn cmd_analyze_classify(file: &Path) -> Result<()> {
    let extracted = extract_file(file).await?;
    let verdict = ContentClassifier::with_global_tables().classify(&extracted.text);
    print_verdict(&verdict);
    Ok(())
}

pub async fn cmd_analyze_triage(
    from: &str,
    subject: &str,
    body: &str,
    pdf: Option<&Path>,
) -> Result<()> {
    let triage = EmailTriage::with_global_tables();
    let envelope = EmailEnvelope {
        sender: from,
        subject,
        body,
        has_pdf_attachment: pdf.is_some(),
    };

    let decision = match triage.evaluate(&envelope) {
        TriageStage::Decided(decision) => decision,
        TriageStage::NeedsContentAnalysis { sender_domain } => {
            let file = pdf.context("Content analysis needs the PDF attachment")?;
            let extracted = extract_file(file).await?;
            let verdict = ContentClassifier::with_global_tables().classify(&extracted.text);
            triage.conclude(&sender_domain, verdict)
        }
    };

    let icon = if decision.is_accepted() { "✅" } else { "🚫" };
    println!("{} {}", icon, decision.case);
    println!("   Reason: {}", decision.reason);
    println!("   Sender domain: {}", decision.sender_domain);
    if let Some(ref bank) = decision.bank {
        println!("   Bank: {}", bank);
    }
    if let Some(location) = decision.matched_in {
        println!("   Matched in: {}", location.as_str());
    }
    if let Some(ref verdict) = decision.verdict {
        print_verdict(verdict);
    }
    Ok(())
}
