//! Bank-specific layout rewrites
//!
//! Many statements print the reward summary as a row of column headers with
//! the numbers on a following line, which text extraction flattens into a
//! run of words and numbers that models routinely misalign. Each rule here
//! recognizes one bank's layout and replaces it with explicit `Label: value`
//! lines. Rules are independent and pure; an unmatched rule leaves the text
//! untouched.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Labels written by the rewrites. The prompt's field mapping refers to these.
pub const OPENING_LABEL: &str = "Opening Balance";
pub const EARNED_LABEL: &str = "Points Earned";
pub const REDEEMED_LABEL: &str = "Points Redeemed";
pub const ADJUSTED_LABEL: &str = "Points Adjusted/Lapsed";
pub const CLOSING_LABEL: &str = "Closing Balance";

/// Label of the bank hint line in the rendered prompt
pub const BANK_HINT_LABEL: &str = "Detected bank";

/// Label statements commonly use for the billing period
pub const PERIOD_LABEL: &str = "Statement Period";

/// A printed amount: optional sign, digits with Indian or western grouping,
/// up to two decimals
const NUM: &str = r"(-?\d[\d,]*(?:\.\d{1,2})?)";

/// Reward schema field a rewritten label maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardField {
    Opening,
    Earned,
    Redeemed,
    AdjustedLapsed,
    Closing,
}

impl RewardField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Opening => OPENING_LABEL,
            Self::Earned => EARNED_LABEL,
            Self::Redeemed => REDEEMED_LABEL,
            Self::AdjustedLapsed => ADJUSTED_LABEL,
            Self::Closing => CLOSING_LABEL,
        }
    }

    /// Key inside `rewardPoints`
    pub fn json_key(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Earned => "earned",
            Self::Redeemed => "redeemed",
            Self::AdjustedLapsed => "adjustedLapsed",
            Self::Closing => "closing",
        }
    }
}

/// One bank's layout rewrite
pub struct RewriteRule {
    /// Display bank name
    pub bank: &'static str,
    /// Reward summary columns as the bank prints them, in capture order
    pub layout: &'static str,
    pattern: Regex,
    /// Schema field for each capture group, in order
    fields: &'static [RewardField],
    /// Extra mapping guidance for this layout
    note: Option<&'static str>,
}

impl RewriteRule {
    fn new(
        bank: &'static str,
        layout: &'static str,
        pattern: &str,
        fields: &'static [RewardField],
        note: Option<&'static str>,
    ) -> Self {
        let pattern = Regex::new(&pattern.replace("{NUM}", NUM)).expect("rewrite rule regex");
        Self {
            bank,
            layout,
            pattern,
            fields,
            note,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Rewrite the first occurrence of this bank's layout. `None` when absent.
    pub fn apply(&self, text: &str) -> Option<String> {
        if !self.pattern.is_match(text) {
            return None;
        }
        let rewritten = self
            .pattern
            .replace(text, |caps: &Captures<'_>| self.render_block(caps));
        Some(rewritten.into_owned())
    }

    fn render_block(&self, caps: &Captures<'_>) -> String {
        let mut block = format!("\nReward Points Summary ({})\n", self.bank);
        for (i, field) in self.fields.iter().enumerate() {
            if let Some(value) = caps.get(i + 1) {
                block.push_str(field.label());
                block.push_str(": ");
                block.push_str(value.as_str());
                block.push('\n');
            }
        }
        block
    }

    /// Literal label-to-field mapping for the prompt
    pub fn instructions(&self) -> String {
        let mut lines: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("- \"{}\" -> rewardPoints.{}", f.label(), f.json_key()))
            .collect();
        if let Some(note) = self.note {
            lines.push(format!("- {}", note));
        }
        format!("{}:\n{}", self.bank, lines.join("\n"))
    }

    /// Printed columns and the schema field each one fills, for text this
    /// rule did not rewrite
    pub fn layout_instructions(&self) -> String {
        let fields: Vec<&str> = self.fields.iter().map(|f| f.json_key()).collect();
        let mut text = format!("{}: {} -> {}", self.bank, self.layout, fields.join(", "));
        if let Some(note) = self.note {
            text.push_str(&format!(" ({})", note));
        }
        text
    }
}

use RewardField::*;

static RULES: LazyLock<Vec<RewriteRule>> = LazyLock::new(|| {
    vec![
        RewriteRule::new(
            "HDFC Bank",
            "Opening Balance | Earned | Redeemed | Expired/Lapsed | Closing Balance",
            r"(?is)opening\s+balance\s+(?:points\s+)?earned\s+redeemed\s+(?:expired|lapsed|adjusted)(?:\s*/\s*(?:expired|lapsed|adjusted))?\s+closing\s+balance\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}",
            &[Opening, Earned, Redeemed, AdjustedLapsed, Closing],
            None,
        ),
        RewriteRule::new(
            "ICICI Bank",
            "Previous Balance | Points Earned | Points Redeemed | Points Expired | Current Balance",
            r"(?is)previous\s+balance\s+points\s+earned\s+points\s+redeemed\s+points\s+(?:expired|lapsed)\s+current\s+balance\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}",
            &[Opening, Earned, Redeemed, AdjustedLapsed, Closing],
            None,
        ),
        RewriteRule::new(
            "SBI Card",
            "Previous Balance | Earned | Redeemed/Expired | Closing Balance",
            r"(?is)previous\s+balance\s+earned\s+redeemed\s*/\s*expired\s+closing\s+balance\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}",
            &[Opening, Earned, Redeemed, Closing],
            Some("this layout prints redeemed and expired points as one figure; report it as redeemed and leave adjustedLapsed null"),
        ),
        RewriteRule::new(
            "Axis Bank",
            "EDGE Reward Points: Opening | Earned | Redeemed | Closing",
            r"(?is)edge\s+reward(?:s|\s+points).{0,80}?opening(?:\s+balance)?\s*:?\s+{NUM}\s+earned\s*:?\s+{NUM}\s+redeemed\s*:?\s+{NUM}\s+closing(?:\s+balance)?\s*:?\s+{NUM}",
            &[Opening, Earned, Redeemed, Closing],
            None,
        ),
        RewriteRule::new(
            "American Express",
            "Membership Rewards: Opening Balance | Earned | Used | Closing Balance",
            r"(?is)membership\s+rewards.{0,120}?opening\s+balance\s*:?\s+{NUM}\s+(?:points\s+)?earned\s*:?\s+{NUM}\s+(?:points\s+)?(?:used|redeemed)\s*:?\s+{NUM}\s+closing\s+balance\s*:?\s+{NUM}",
            &[Opening, Earned, Redeemed, Closing],
            None,
        ),
        RewriteRule::new(
            "Kotak Mahindra Bank",
            "Opening Points | Earned Points | Redeemed Points | Lapsed Points | Closing Points",
            r"(?is)opening\s+points\s+earned\s+points\s+redeemed\s+points\s+(?:lapsed|expired)\s+points\s+closing\s+points\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}\s+{NUM}",
            &[Opening, Earned, Redeemed, AdjustedLapsed, Closing],
            None,
        ),
    ]
});

/// All rules in application order
pub fn rules() -> &'static [RewriteRule] {
    RULES.as_slice()
}

/// Text after the rewrite chain, and the banks whose layouts were found
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub text: String,
    pub applied: Vec<&'static str>,
}

impl Rewritten {
    /// Bank of the first applied rule
    pub fn bank_hint(&self) -> Option<&'static str> {
        self.applied.first().copied()
    }
}

/// Run every rule in order over `text`
pub fn apply_bank_rewrites(text: &str) -> Rewritten {
    let mut current = text.to_string();
    let mut applied = Vec::new();

    for rule in rules() {
        if let Some(next) = rule.apply(&current) {
            applied.push(rule.bank);
            current = next;
        }
    }

    Rewritten {
        text: current,
        applied,
    }
}

/// Field mappings for the given banks, joined for the prompt
pub fn bank_instructions(banks: &[&str]) -> String {
    rules()
        .iter()
        .filter(|r| banks.contains(&r.bank))
        .map(|r| r.instructions())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Printed layouts of every known bank, one line each
pub fn known_layouts() -> String {
    rules()
        .iter()
        .map(|r| format!("- {}", r.layout_instructions()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdfc_columns_rewritten() {
        let text = "HDFC Bank Credit Card Statement\nReward Points Summary\n\
                    Opening Balance Earned Redeemed Expired/Lapsed Closing Balance\n\
                    12,450 1,230 0 150 13,530\nTransactions follow";
        let out = apply_bank_rewrites(text);

        assert_eq!(out.applied, vec!["HDFC Bank"]);
        assert_eq!(out.bank_hint(), Some("HDFC Bank"));
        assert!(out.text.contains("Opening Balance: 12,450\n"));
        assert!(out.text.contains("Points Earned: 1,230\n"));
        assert!(out.text.contains("Points Redeemed: 0\n"));
        assert!(out.text.contains("Points Adjusted/Lapsed: 150\n"));
        assert!(out.text.contains("Closing Balance: 13,530\n"));
        assert!(out.text.starts_with("HDFC Bank Credit Card Statement"));
        assert!(out.text.ends_with("Transactions follow"));
    }

    #[test]
    fn test_icici_columns_rewritten() {
        let text = "PREVIOUS BALANCE POINTS EARNED POINTS REDEEMED POINTS EXPIRED CURRENT BALANCE\n\
                    2,000 340 500 0 1,840";
        let out = apply_bank_rewrites(text);
        assert_eq!(out.applied, vec!["ICICI Bank"]);
        assert!(out.text.contains("Opening Balance: 2,000"));
        assert!(out.text.contains("Closing Balance: 1,840"));
    }

    #[test]
    fn test_sbi_four_columns_leave_adjusted_out() {
        let text = "Previous Balance Earned Redeemed/Expired Closing Balance\n900 100 50 950";
        let out = apply_bank_rewrites(text);
        assert_eq!(out.applied, vec!["SBI Card"]);
        assert!(!out.text.contains(ADJUSTED_LABEL));
        assert!(out.text.contains("Points Redeemed: 50"));
    }

    #[test]
    fn test_axis_split_pairs() {
        let text = "EDGE REWARD POINTS\nOpening\n1,000\nEarned\n200\nRedeemed\n0\nClosing\n1,200";
        let out = apply_bank_rewrites(text);
        assert_eq!(out.applied, vec!["Axis Bank"]);
        assert!(out.text.contains("Closing Balance: 1,200"));
    }

    #[test]
    fn test_amex_membership_rewards() {
        let text = "Membership Rewards Summary\nOpening Balance 45,000\nEarned 2,100\nUsed 10,000\nClosing Balance 37,100";
        let out = apply_bank_rewrites(text);
        assert_eq!(out.applied, vec!["American Express"]);
        assert!(out.text.contains("Points Redeemed: 10,000"));
    }

    #[test]
    fn test_kotak_columns() {
        let text = "Opening Points Earned Points Redeemed Points Lapsed Points Closing Points\n10 20 0 5 25";
        let out = apply_bank_rewrites(text);
        assert_eq!(out.applied, vec!["Kotak Mahindra Bank"]);
        assert!(out.text.contains("Points Adjusted/Lapsed: 5"));
    }

    #[test]
    fn test_unmatched_text_is_untouched() {
        let text = "Reward points earned this month: 500\nClosing balance 1,500";
        let out = apply_bank_rewrites(text);
        assert!(out.applied.is_empty());
        assert_eq!(out.text, text);
        assert_eq!(out.bank_hint(), None);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let text = "Opening Balance Earned Redeemed Expired Closing Balance\n1 2 3 4 5";
        let once = apply_bank_rewrites(text);
        let twice = apply_bank_rewrites(&once.text);
        assert!(twice.applied.is_empty());
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn test_instructions_reference_labels() {
        let text = bank_instructions(&["HDFC Bank"]);
        assert!(text.starts_with("HDFC Bank:"));
        assert!(text.contains("\"Points Adjusted/Lapsed\" -> rewardPoints.adjustedLapsed"));
        assert!(text.contains("\"Closing Balance\" -> rewardPoints.closing"));

        let sbi = bank_instructions(&["SBI Card"]);
        assert!(sbi.contains("leave adjustedLapsed null"));

        assert!(bank_instructions(&[]).is_empty());
    }

    #[test]
    fn test_known_layouts_cover_every_rule() {
        let layouts = known_layouts();
        assert_eq!(layouts.lines().count(), rules().len());
        assert!(layouts.contains(
            "- ICICI Bank: Previous Balance | Points Earned | Points Redeemed | Points Expired | Current Balance -> opening, earned, redeemed, adjustedLapsed, closing"
        ));
        assert!(layouts.contains("SBI Card: Previous Balance | Earned | Redeemed/Expired | Closing Balance -> opening, earned, redeemed, closing (this layout"));
    }
}
