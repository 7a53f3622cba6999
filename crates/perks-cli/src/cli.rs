//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Perks - Track credit card reward points from your statements
#[derive(Parser)]
#[command(name = "perks")]
#[command(about = "Credit card statement ingestion and reward points tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "perks.db", global = true)]
    pub db: PathBuf,

    /// User the statements belong to
    #[arg(long, default_value = "local", global = true)]
    pub user: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set PERKS_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Process a statement PDF
    Upload {
        /// PDF file to process
        #[arg(short, long)]
        file: PathBuf,

        /// Process even if the document does not look like a card statement
        #[arg(long)]
        force: bool,
    },

    /// Fetch statements from Gmail
    ///
    /// Requires GMAIL_ACCESS_TOKEN with read access to the mailbox.
    Fetch {
        /// Only look at messages from the last N days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Maximum number of messages to look at
        #[arg(long, default_value = "50")]
        max: usize,
    },

    /// Manage processed statements (list, show, delete)
    Statements {
        #[command(subcommand)]
        action: Option<StatementsAction>,
    },

    /// Show the latest statement per bank and card variant
    Latest {
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a single pipeline stage without storing anything
    Analyze {
        #[command(subcommand)]
        stage: AnalyzeStage,
    },

    /// Show database status (encryption, counts, model backend)
    Status,

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum StatementsAction {
    /// List statements, newest first
    List {
        /// Only show statements with this status (processing, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one statement in detail
    Show {
        /// Statement ID
        id: i64,

        /// Also print the extracted text
        #[arg(long)]
        text: bool,
    },

    /// Delete a statement
    Delete {
        /// Statement ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum AnalyzeStage {
    /// Extract text from a PDF (direct, OCR fallback)
    Text {
        /// PDF file
        file: PathBuf,
    },

    /// Classify a PDF as statement or not
    Classify {
        /// PDF file
        file: PathBuf,
    },

    /// Triage an email by its envelope
    Triage {
        /// Sender, e.g. "HDFC Bank <statements@hdfcbank.com>"
        #[arg(long)]
        from: String,

        /// Subject line
        #[arg(long, default_value = "")]
        subject: String,

        /// Plain-text body
        #[arg(long, default_value = "")]
        body: String,

        /// PDF attachment (classified when the envelope is inconclusive)
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List prompts with their version and optional blocks
    List,

    /// Show a prompt and the bank mappings it can receive
    Show {
        /// Prompt ID (e.g., extract_rewards)
        prompt_id: String,
    },

    /// Banks with a known reward layout and their sender domains
    Banks,

    /// Where prompt and lookup table overrides are read from
    Path,
}
