//! Lookup tables for classification, triage and deduplication
//!
//! Tables are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/perks/config/tables.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! The process-wide copy is loaded once and never changes afterwards.
//! Components also accept an explicit table set so tests can use their own.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Embedded default tables (compiled into binary)
const DEFAULT_TABLES: &str = include_str!("../../../config/tables.toml");

static GLOBAL: LazyLock<Arc<StatementTables>> = LazyLock::new(|| Arc::new(StatementTables::load()));

/// Keyword lists used by the content classifier
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierTables {
    pub required_keywords: Vec<String>,
    pub bank_names: Vec<String>,
    pub positive_indicators: Vec<String>,
    pub negative_indicators: Vec<String>,
}

/// Keyword lists used by email triage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriageTables {
    pub statement_keywords: Vec<String>,
}

/// All lookup tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementTables {
    pub classifier: ClassifierTables,
    pub triage: TriageTables,
    /// Sender domain fragment -> display bank name
    #[serde(default)]
    pub bank_domains: BTreeMap<String, String>,
    /// Lower-cased spelling -> normalized bank name
    #[serde(default)]
    pub bank_aliases: HashMap<String, String>,
    /// Normalized bank name -> variant names, most specific first
    #[serde(default)]
    pub card_variants: BTreeMap<String, Vec<String>>,
}

impl StatementTables {
    /// Process-wide tables, loaded on first use
    pub fn global() -> Arc<StatementTables> {
        Arc::clone(&GLOBAL)
    }

    /// Parse the embedded defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TABLES)
    }

    /// Parse tables from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let tables: StatementTables = toml::from_str(content)?;
        Ok(tables.normalized())
    }

    /// Load tables from a specific file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::InvalidData(format!("Failed to read tables: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Load the override file if present and valid, else the embedded defaults
    pub fn load() -> Self {
        if let Some(path) = default_tables_path() {
            if path.exists() {
                match Self::from_path(&path) {
                    Ok(tables) => {
                        debug!(path = %path.display(), "Loaded lookup table override");
                        return tables;
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Ignoring malformed lookup table override"
                        );
                    }
                }
            }
        }

        match Self::embedded() {
            Ok(tables) => tables,
            Err(e) => {
                error!(error = %e, "Embedded lookup tables failed to parse");
                Self::default()
            }
        }
    }

    /// Lower-case every keyword so matching never has to
    fn normalized(mut self) -> Self {
        fn lower(list: &mut [String]) {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
        }

        lower(&mut self.classifier.required_keywords);
        lower(&mut self.classifier.bank_names);
        lower(&mut self.classifier.positive_indicators);
        lower(&mut self.classifier.negative_indicators);
        lower(&mut self.triage.statement_keywords);

        self.bank_domains = self
            .bank_domains
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self.bank_aliases = self
            .bank_aliases
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_lowercase()))
            .collect();
        self.card_variants = self
            .card_variants
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self
    }

    /// Normalize a bank name for grouping: lower-case, trimmed, whitespace
    /// collapsed, then mapped through the alias table.
    pub fn normalize_bank(&self, name: &str) -> String {
        let cleaned = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match self.bank_aliases.get(&cleaned) {
            Some(canonical) => canonical.clone(),
            None => cleaned,
        }
    }

    /// Find the bank owning `domain`: the allow-listed domain itself or one
    /// of its subdomains. `misc.com` is not a subdomain of `sc.com`.
    pub fn bank_for_domain(&self, domain: &str) -> Option<&str> {
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        if domain.is_empty() {
            return None;
        }
        self.bank_domains
            .iter()
            .find(|(key, _)| {
                domain == key.as_str()
                    || domain
                        .strip_suffix(key.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(|(_, bank)| bank.as_str())
    }

    /// Card variants known for a normalized bank name
    pub fn variants_for(&self, normalized_bank: &str) -> Option<&[String]> {
        self.card_variants
            .get(normalized_bank)
            .map(|v| v.as_slice())
    }
}

/// Default tables override path
pub fn default_tables_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("perks").join("config").join("tables.toml"))
}
