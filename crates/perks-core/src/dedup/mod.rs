//! Latest-statement selection
//!
//! Completed statements are grouped by (normalized bank, card variant). Within
//! a group, duplicates of the same statement are set aside first, then the
//! statement with the latest period end date becomes the group's latest and
//! everything else is reported as filtered.
//!
//! Duplicates are detected on the raw period string while ordering uses the
//! parsed end date: two uploads of one statement print the same period text,
//! whereas two different statements can only be ordered by date.

pub mod dates;
pub mod variant;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::classify::card_marker;
use crate::models::{StatementRecord, UNKNOWN_VARIANT};
use crate::tables::StatementTables;

pub use dates::parse_period_end;
pub use variant::detect_card_variant;

/// Grouping key: normalized bank and card variant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GroupKey {
    pub bank: String,
    pub variant: String,
}

/// The statement chosen for a group
#[derive(Debug, Clone, Serialize)]
pub struct LatestStatement {
    pub group: GroupKey,
    pub statement: StatementRecord,
    /// `None` only when no statement in the group had a parseable period
    pub period_end: Option<NaiveDate>,
}

/// Why a statement was not chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FilterReason {
    /// A statement with a later period exists in the same group
    Older { superseded_by: i64 },
    /// The period could not be parsed into a date
    NoValidDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteredStatement {
    pub group: GroupKey,
    pub statement: StatementRecord,
    pub reason: FilterReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateStatement {
    pub group: GroupKey,
    pub statement: StatementRecord,
    /// Id of the kept copy
    pub duplicate_of: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupSummary {
    pub total: usize,
    pub groups: usize,
    pub latest: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub no_valid_date: usize,
}

/// Result of a deduplication pass. Every input statement appears in exactly
/// one of `latest`, `filtered` or `duplicates`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupOutcome {
    pub latest: Vec<LatestStatement>,
    pub filtered: Vec<FilteredStatement>,
    pub duplicates: Vec<DuplicateStatement>,
    pub summary: DedupSummary,
}

/// Candidate with its derived attributes
struct Candidate {
    statement: StatementRecord,
    period_end: Option<NaiveDate>,
    marker: Option<String>,
}

impl Candidate {
    fn raw_period(&self) -> Option<&str> {
        self.statement
            .statement_period
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Same raw period and either the same card marker (when both are known)
    /// or the same file name. Two known markers that differ are two cards,
    /// whatever the file names say. Only dated statements take part: an
    /// undated one is reported as having no valid date instead.
    fn is_duplicate_of(&self, kept: &Candidate) -> bool {
        if self.period_end.is_none() || kept.period_end.is_none() {
            return false;
        }
        let (Some(a), Some(b)) = (self.raw_period(), kept.raw_period()) else {
            return false;
        };
        if !a.eq_ignore_ascii_case(b) {
            return false;
        }
        match (&self.marker, &kept.marker) {
            (Some(x), Some(y)) => x == y,
            _ => self.statement.file_name == kept.statement.file_name,
        }
    }
}

/// Newest first: period end desc (unparseable last), upload time desc, id desc
fn newest_first(a: &Candidate, b: &Candidate) -> Ordering {
    match (a.period_end, b.period_end) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.statement.uploaded_at.cmp(&a.statement.uploaded_at))
    .then_with(|| b.statement.id.cmp(&a.statement.id))
}

/// Batch pass choosing one statement per (bank, variant)
#[derive(Clone)]
pub struct StatementDeduplicator {
    tables: Arc<StatementTables>,
}

impl StatementDeduplicator {
    pub fn new(tables: Arc<StatementTables>) -> Self {
        Self { tables }
    }

    pub fn with_global_tables() -> Self {
        Self::new(StatementTables::global())
    }

    /// Group key of one statement. A stored variant is trusted; an unknown one
    /// is detected again from the statement text.
    pub fn group_key(&self, statement: &StatementRecord) -> GroupKey {
        let bank = self.tables.normalize_bank(&statement.bank_name);
        let variant = if statement.card_variant != UNKNOWN_VARIANT {
            statement.card_variant.clone()
        } else {
            let text = format!(
                "{}\n{}",
                statement.file_name,
                statement.raw_text.as_deref().unwrap_or_default()
            );
            detect_card_variant(&self.tables, &bank, &text)
        };
        GroupKey { bank, variant }
    }

    /// Select the latest statement per group
    pub fn filter_latest(&self, statements: Vec<StatementRecord>) -> DedupOutcome {
        let total = statements.len();
        let mut groups: BTreeMap<GroupKey, Vec<Candidate>> = BTreeMap::new();

        for statement in statements {
            let key = self.group_key(&statement);
            let period_end = statement
                .statement_period
                .as_deref()
                .and_then(parse_period_end);
            let marker = statement.raw_text.as_deref().and_then(card_marker);
            groups.entry(key).or_default().push(Candidate {
                statement,
                period_end,
                marker,
            });
        }

        let mut outcome = DedupOutcome::default();
        let group_count = groups.len();

        for (key, mut candidates) in groups {
            candidates.sort_by(newest_first);

            // Keep the newest copy of each dated statement
            let mut kept: Vec<Candidate> = Vec::new();
            for candidate in candidates {
                match kept.iter().find(|k| candidate.is_duplicate_of(k)) {
                    Some(original) => outcome.duplicates.push(DuplicateStatement {
                        group: key.clone(),
                        duplicate_of: original.statement.id,
                        statement: candidate.statement,
                    }),
                    None => kept.push(candidate),
                }
            }

            // Sorted newest first, so the head is the latest. When nothing in
            // the group has a date this is the most recent upload.
            let mut kept = kept.into_iter();
            let Some(latest) = kept.next() else {
                continue;
            };
            let latest_id = latest.statement.id;

            for other in kept {
                let reason = if other.period_end.is_some() {
                    FilterReason::Older {
                        superseded_by: latest_id,
                    }
                } else {
                    FilterReason::NoValidDate
                };
                outcome.filtered.push(FilteredStatement {
                    group: key.clone(),
                    statement: other.statement,
                    reason,
                });
            }

            debug!(
                bank = %key.bank,
                variant = %key.variant,
                latest = latest_id,
                period_end = ?latest.period_end,
                "Selected latest statement"
            );
            outcome.latest.push(LatestStatement {
                group: key,
                statement: latest.statement,
                period_end: latest.period_end,
            });
        }

        outcome.summary = DedupSummary {
            total,
            groups: group_count,
            latest: outcome.latest.len(),
            filtered: outcome.filtered.len(),
            duplicates: outcome.duplicates.len(),
            no_valid_date: outcome
                .filtered
                .iter()
                .filter(|f| f.reason == FilterReason::NoValidDate)
                .count(),
        };
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RewardPoints, StatementSource, StatementStatus, UNKNOWN_BANK};
    use chrono::{TimeZone, Utc};

    fn dedup() -> StatementDeduplicator {
        StatementDeduplicator::new(Arc::new(StatementTables::embedded().unwrap()))
    }

    fn record(id: i64, bank: &str, variant: &str, period: Option<&str>, file: &str) -> StatementRecord {
        StatementRecord {
            id,
            user_id: "u1".into(),
            file_name: file.into(),
            bank_name: bank.into(),
            statement_period: period.map(String::from),
            card_variant: variant.into(),
            reward_points: RewardPoints::default(),
            raw_text: None,
            raw_response: None,
            status: StatementStatus::Completed,
            error_message: None,
            source: StatementSource::Manual,
            uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(id),
            content_hash: None,
            extraction_method: None,
            page_count: None,
            ocr_confidence: None,
            inbox: None,
        }
    }

    fn ids<T>(items: &[T], f: impl Fn(&T) -> i64) -> Vec<i64> {
        let mut ids: Vec<i64> = items.iter().map(f).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_latest_by_period_end_date() {
        let outcome = dedup().filter_latest(vec![
            record(1, "HDFC Bank", "Regalia", Some("20/02/2024 - 18/03/2024"), "mar.pdf"),
            record(2, "hdfc", "Regalia", Some("20/03/2024 - 18/04/2024"), "apr.pdf"),
            record(3, "HDFC BANK", "Regalia", Some("January 2024"), "jan.pdf"),
        ]);

        assert_eq!(outcome.latest.len(), 1);
        let latest = &outcome.latest[0];
        assert_eq!(latest.statement.id, 2);
        assert_eq!(latest.group.bank, "hdfc bank");
        assert_eq!(latest.period_end, NaiveDate::from_ymd_opt(2024, 4, 18));
        assert_eq!(ids(&outcome.filtered, |f| f.statement.id), vec![1, 3]);
        assert!(outcome
            .filtered
            .iter()
            .all(|f| f.reason == FilterReason::Older { superseded_by: 2 }));
    }

    #[test]
    fn test_same_period_and_file_are_duplicates_not_older() {
        let outcome = dedup().filter_latest(vec![
            record(1, "HDFC Bank", "Millennia", Some("April 2024"), "stmt.pdf"),
            record(2, "HDFC Bank", "Millennia", Some("April 2024"), "stmt.pdf"),
        ]);

        assert_eq!(outcome.latest.len(), 1);
        assert_eq!(outcome.latest[0].statement.id, 2);
        assert!(outcome.filtered.is_empty());
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].statement.id, 1);
        assert_eq!(outcome.duplicates[0].duplicate_of, 2);
    }

    #[test]
    fn test_same_period_different_card_markers_are_not_duplicates() {
        let mut a = record(1, "Axis Bank", "Magnus", Some("April 2024"), "stmt.pdf");
        a.raw_text = Some("Card No: XXXX XXXX XXXX 1111".into());
        let mut b = record(2, "Axis Bank", "Magnus", Some("April 2024"), "stmt.pdf");
        b.raw_text = Some("Card No: XXXX XXXX XXXX 2222".into());

        let outcome = dedup().filter_latest(vec![a, b]);
        assert!(outcome.duplicates.is_empty());
        assert_eq!(outcome.latest[0].statement.id, 2);
        assert_eq!(outcome.filtered.len(), 1);
    }

    #[test]
    fn test_same_marker_different_file_is_duplicate() {
        let mut a = record(1, "Axis Bank", "Magnus", Some("April 2024"), "download (1).pdf");
        a.raw_text = Some("card ending 4321".into());
        let mut b = record(2, "Axis Bank", "Magnus", Some("April 2024"), "april.pdf");
        b.raw_text = Some("card ending 4321".into());

        let outcome = dedup().filter_latest(vec![a, b]);
        assert_eq!(outcome.duplicates.len(), 1);
    }

    #[test]
    fn test_groups_by_bank_and_variant() {
        let outcome = dedup().filter_latest(vec![
            record(1, "HDFC Bank", "Regalia", Some("April 2024"), "a.pdf"),
            record(2, "HDFC Bank", "Millennia", Some("March 2024"), "b.pdf"),
            record(3, "ICICI Bank", "Coral", Some("April 2024"), "c.pdf"),
        ]);
        assert_eq!(outcome.latest.len(), 3);
        assert_eq!(outcome.summary.groups, 3);
        assert!(outcome.filtered.is_empty());
    }

    #[test]
    fn test_unparseable_periods() {
        let outcome = dedup().filter_latest(vec![
            record(1, "SBI Card", "Elite", Some("current cycle"), "x.pdf"),
            record(2, "SBI Card", "Elite", Some("April 2024"), "y.pdf"),
            record(3, "SBI Card", "Elite", None, "z.pdf"),
        ]);
        assert_eq!(outcome.latest[0].statement.id, 2);
        assert_eq!(outcome.summary.no_valid_date, 2);
        assert!(outcome
            .filtered
            .iter()
            .all(|f| f.reason == FilterReason::NoValidDate));
    }

    #[test]
    fn test_single_record_group_keeps_record() {
        let outcome = dedup().filter_latest(vec![record(7, UNKNOWN_BANK, UNKNOWN_VARIANT, None, "x.pdf")]);
        assert_eq!(outcome.latest.len(), 1);
        assert_eq!(outcome.latest[0].statement.id, 7);
        assert_eq!(outcome.latest[0].period_end, None);
    }

    #[test]
    fn test_undated_group_prefers_latest_upload() {
        let outcome = dedup().filter_latest(vec![
            record(1, "Kotak", "Myntra", None, "a.pdf"),
            record(2, "Kotak", "Myntra", Some("n/a"), "b.pdf"),
        ]);
        assert_eq!(outcome.latest[0].statement.id, 2);
        assert_eq!(outcome.filtered[0].statement.id, 1);
        assert_eq!(outcome.filtered[0].reason, FilterReason::NoValidDate);
    }

    #[test]
    fn test_undated_copies_are_not_duplicates() {
        let outcome = dedup().filter_latest(vec![
            record(1, "SBI Card", "Elite", Some("current cycle"), "stmt.pdf"),
            record(2, "SBI Card", "Elite", Some("current cycle"), "stmt.pdf"),
            record(3, "SBI Card", "Elite", Some("April 2024"), "apr.pdf"),
        ]);

        assert!(outcome.duplicates.is_empty());
        assert_eq!(outcome.latest[0].statement.id, 3);
        assert_eq!(ids(&outcome.filtered, |f| f.statement.id), vec![1, 2]);
        assert_eq!(outcome.summary.no_valid_date, 2);
    }

    #[test]
    fn test_ties_broken_by_upload_time() {
        let outcome = dedup().filter_latest(vec![
            record(1, "HDFC Bank", "Regalia", Some("18/04/2024"), "a.pdf"),
            record(2, "HDFC Bank", "Regalia", Some("18 Apr 2024"), "b.pdf"),
        ]);
        assert_eq!(outcome.latest[0].statement.id, 2);
        assert_eq!(
            outcome.filtered[0].reason,
            FilterReason::Older { superseded_by: 2 }
        );
    }

    #[test]
    fn test_unknown_variant_detected_from_text() {
        let mut a = record(1, "HDFC Bank", UNKNOWN_VARIANT, Some("April 2024"), "a.pdf");
        a.raw_text = Some("HDFC Bank Infinia Credit Card Statement".into());
        let b = record(2, "HDFC Bank", "Infinia", Some("March 2024"), "b.pdf");

        let outcome = dedup().filter_latest(vec![a, b]);
        assert_eq!(outcome.latest.len(), 1);
        assert_eq!(outcome.latest[0].group.variant, "Infinia");
        assert_eq!(outcome.latest[0].statement.id, 1);
    }

    #[test]
    fn test_partition_is_complete() {
        let input = vec![
            record(1, "HDFC Bank", "Regalia", Some("April 2024"), "s.pdf"),
            record(2, "HDFC Bank", "Regalia", Some("April 2024"), "s.pdf"),
            record(3, "HDFC Bank", "Regalia", Some("March 2024"), "m.pdf"),
            record(4, "HDFC Bank", "Regalia", Some("??"), "q.pdf"),
            record(5, "Axis Bank", "Ace", Some("May 2024"), "ace.pdf"),
        ];
        let outcome = dedup().filter_latest(input);

        let mut all: Vec<i64> = outcome.latest.iter().map(|l| l.statement.id).collect();
        all.extend(outcome.filtered.iter().map(|f| f.statement.id));
        all.extend(outcome.duplicates.iter().map(|d| d.statement.id));
        all.sort();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
        assert_eq!(outcome.summary.total, 5);
        assert_eq!(outcome.summary.latest, 2);
        assert_eq!(outcome.summary.duplicates, 1);
        assert_eq!(outcome.summary.filtered, 2);
    }

    #[test]
    fn test_empty_input() {
        let outcome = dedup().filter_latest(Vec::new());
        assert!(outcome.latest.is_empty());
        assert_eq!(outcome.summary, DedupSummary::default());
    }
}
