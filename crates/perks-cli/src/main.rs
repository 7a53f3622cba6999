//! Perks CLI - Credit card statement and reward points tracker
//!
//! Usage:
//!   perks init                  Initialize database
//!   perks upload --file PDF     Process a statement PDF
//!   perks fetch --days 30       Fetch statements from Gmail
//!   perks latest                Latest statement per card

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Upload { file, force } => {
            let pipeline = commands::open_pipeline(&cli.db, cli.no_encrypt)?;
            commands::cmd_upload(&pipeline, &cli.user, &file, force).await
        }
        Commands::Fetch { days, max } => {
            let pipeline = commands::open_pipeline(&cli.db, cli.no_encrypt)?;
            let mailbox = commands::gmail_from_env()?;
            commands::cmd_fetch(&pipeline, &cli.user, &mailbox, days, max).await
        }
        Commands::Statements { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_statements_list(&db, &cli.user, None),
                Some(StatementsAction::List { status }) => {
                    commands::cmd_statements_list(&db, &cli.user, status.as_deref())
                }
                Some(StatementsAction::Show { id, text }) => {
                    commands::cmd_statements_show(&db, &cli.user, id, text)
                }
                Some(StatementsAction::Delete { id }) => {
                    commands::cmd_statements_delete(&db, &cli.user, id)
                }
            }
        }
        Commands::Latest { json } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_latest(&db, &cli.user, json)
        }
        Commands::Analyze { stage } => match stage {
            AnalyzeStage::Text { file } => commands::cmd_analyze_text(&file).await,
            AnalyzeStage::Classify { file } => commands::cmd_analyze_classify(&file).await,
            AnalyzeStage::Triage {
                from,
                subject,
                body,
                pdf,
            } => commands::cmd_analyze_triage(&from, &subject, &body, pdf.as_deref()).await,
        },
        Commands::Status => commands::cmd_status(&cli.db, &cli.user, cli.no_encrypt),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Banks) => commands::cmd_prompts_banks(),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
