//! Statement period parsing
//!
//! Periods are printed in many shapes: `20/03/2024 - 18/04/2024`,
//! `2024-03-20 to 2024-04-18`, `18 Apr 2024`, `April 18, 2024`, `April 2024`,
//! `18-Apr-24`.
//! Patterns are tried in a fixed order and the first one that yields a valid
//! date wins. Within that pattern the last match is taken, so a range
//! resolves to its end date.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

/// Order in which date components are captured
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// year, month, day
    Ymd,
    /// day, month, four-digit year
    Dmy,
    /// day, month, two-digit year (20xx)
    DmyShort,
    /// day, month name, year
    DayMonthName,
    /// month name, day, year
    MonthNameDay,
    /// month name, year: last day of that month
    MonthNameYear,
    /// day, month name, two-digit year (20xx)
    DayMonthNameShort,
    /// month name, day, two-digit year (20xx)
    MonthNameDayShort,
}

struct DatePattern {
    regex: Regex,
    layout: Layout,
}

static PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    let p = |re: &str, layout| DatePattern {
        regex: Regex::new(re).expect("date pattern regex"),
        layout,
    };
    vec![
        // 2024-04-18
        p(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b", Layout::Ymd),
        // 18/04/2024, 18-04-2024, 18.04.2024
        p(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b", Layout::Dmy),
        // 18/04/24
        p(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{2})\b", Layout::DmyShort),
        // 18 Apr 2024, 18-Apr-2024, 18th April, 2024
        p(
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s-]+([a-z]{3,9})\.?[\s,-]+(\d{4})\b",
            Layout::DayMonthName,
        ),
        // Apr 18, 2024, April 18th 2024
        p(
            r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
            Layout::MonthNameDay,
        ),
        // April 2024, Apr-2024
        p(r"(?i)\b([a-z]{3,9})\.?[\s,-]+(\d{4})\b", Layout::MonthNameYear),
        // 18-Apr-24, 18 Apr 24
        p(
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s-]([a-z]{3,9})\.?[\s-](\d{2})\b",
            Layout::DayMonthNameShort,
        ),
        // Apr 18, 24
        p(
            r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{2})\b",
            Layout::MonthNameDayShort,
        ),
    ]
});

/// Parse the end date of a statement period. `None` when no pattern yields
/// a valid calendar date.
pub fn parse_period_end(period: &str) -> Option<NaiveDate> {
    PATTERNS.iter().find_map(|pattern| {
        pattern
            .regex
            .captures_iter(period)
            .filter_map(|caps| date_from(&caps, pattern.layout))
            .last()
    })
}

fn date_from(caps: &Captures<'_>, layout: Layout) -> Option<NaiveDate> {
    let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
    let year = |i: usize| caps.get(i)?.as_str().parse::<i32>().ok();
    let month = |i: usize| month_from_name(caps.get(i)?.as_str());

    match layout {
        Layout::Ymd => NaiveDate::from_ymd_opt(year(1)?, num(2)?, num(3)?),
        Layout::Dmy => NaiveDate::from_ymd_opt(year(3)?, num(2)?, num(1)?),
        Layout::DmyShort => NaiveDate::from_ymd_opt(2000 + year(3)?, num(2)?, num(1)?),
        Layout::DayMonthName => NaiveDate::from_ymd_opt(year(3)?, month(2)?, num(1)?),
        Layout::MonthNameDay => NaiveDate::from_ymd_opt(year(3)?, month(1)?, num(2)?),
        Layout::MonthNameYear => last_day_of_month(year(2)?, month(1)?),
        Layout::DayMonthNameShort => NaiveDate::from_ymd_opt(2000 + year(3)?, month(2)?, num(1)?),
        Layout::MonthNameDayShort => NaiveDate::from_ymd_opt(2000 + year(3)?, month(1)?, num(2)?),
    }
}

/// Month number from an English month name or its common abbreviations
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    if lower.len() < 3 {
        return None;
    }
    if lower == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|m| *m == lower || (lower.len() == 3 && m.starts_with(&lower)))
        .map(|i| i as u32 + 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}
