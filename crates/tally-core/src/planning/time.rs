//! Period expressions: explicit ranges, seasons, quarters, months, years and
//! periods relative to a reference date.

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use super::plan::TimeRange;

static ISO_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*(?:to|through|until|and|[-–—])\s*(\d{4}-\d{2}-\d{2})")
        .expect("ISO range regex should be valid")
});

static SEASON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(spring|summer|autumn|fall|winter)\s+(?:of\s+)?((?:19|20)\d{2})\b")
        .expect("season regex should be valid")
});

static QUARTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bq([1-4])\s*(?:of\s+)?((?:19|20)\d{2})\b").expect("quarter regex should be valid")
});

static ORDINAL_QUARTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(first|second|third|fourth|1st|2nd|3rd|4th)\s+quarter\s+(?:of\s+)?((?:19|20)\d{2})\b")
        .expect("ordinal quarter regex should be valid")
});

static MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\s+(?:of\s+)?((?:19|20)\d{2})\b",
    )
    .expect("month regex should be valid")
});

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(last|previous|this|current)\s+(quarter|year|month)\b")
        .expect("relative period regex should be valid")
});

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("year regex should be valid"));

/// How a period was read from the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodMatch {
    /// Named directly by the text.
    Explicit(TimeRange),
    /// Resolved against the reference date.
    Relative(TimeRange),
    /// Only a bare year was found.
    Year(TimeRange),
}

impl PeriodMatch {
    pub fn range(&self) -> &TimeRange {
        match self {
            Self::Explicit(r) | Self::Relative(r) | Self::Year(r) => r,
        }
    }

    pub fn into_range(self) -> TimeRange {
        match self {
            Self::Explicit(r) | Self::Relative(r) | Self::Year(r) => r,
        }
    }
}

/// Finds the most specific period in `text`.
///
/// Precedence: ISO range, season, quarter, month, relative period, bare year.
pub fn parse_period(text: &str, as_of: NaiveDate) -> Option<PeriodMatch> {
    if let Some(range) = find_iso_range(text) {
        return Some(PeriodMatch::Explicit(range));
    }

    if let Some(caps) = SEASON.captures(text) {
        let year: i32 = caps[2].parse().ok()?;
        let season = caps[1].to_lowercase();
        let range = match season.as_str() {
            "spring" => months(year, 3, year, 5),
            "summer" => months(year, 6, year, 8),
            "autumn" | "fall" => months(year, 9, year, 11),
            _ => months(year, 12, year + 1, 2),
        }?;
        return Some(PeriodMatch::Explicit(TimeRange::new(range.0, range.1, format!("{season} {year}"))));
    }

    let quarter = QUARTER
        .captures(text)
        .and_then(|caps| Some((caps[1].parse::<u32>().ok()?, caps[2].parse::<i32>().ok()?)))
        .or_else(|| {
            ORDINAL_QUARTER.captures(text).and_then(|caps| {
                let q = match caps[1].to_lowercase().as_str() {
                    "first" | "1st" => 1,
                    "second" | "2nd" => 2,
                    "third" | "3rd" => 3,
                    _ => 4,
                };
                Some((q, caps[2].parse::<i32>().ok()?))
            })
        });
    if let Some((q, year)) = quarter {
        let (start, end) = quarter_bounds(year, q)?;
        return Some(PeriodMatch::Explicit(TimeRange::new(start, end, format!("Q{q} {year}"))));
    }

    if let Some(caps) = MONTH.captures(text) {
        let month = month_number(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        let (start, end) = months(year, month, year, month)?;
        return Some(PeriodMatch::Explicit(TimeRange::new(start, end, caps[0].to_lowercase())));
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let phrase = caps[0].to_lowercase();
        let current = matches!(caps[1].to_lowercase().as_str(), "this" | "current");
        let (start, end) = match (caps[2].to_lowercase().as_str(), current) {
            ("quarter", false) => {
                let q = (as_of.month() - 1) / 3 + 1;
                let (year, q) = if q == 1 { (as_of.year() - 1, 4) } else { (as_of.year(), q - 1) };
                quarter_bounds(year, q)?
            }
            ("quarter", true) => {
                let (start, _) = quarter_bounds(as_of.year(), (as_of.month() - 1) / 3 + 1)?;
                (start, as_of)
            }
            ("year", false) => months(as_of.year() - 1, 1, as_of.year() - 1, 12)?,
            ("year", true) => (NaiveDate::from_ymd_opt(as_of.year(), 1, 1)?, as_of),
            ("month", false) => {
                let first_of_this = NaiveDate::from_ymd_opt(as_of.year(), as_of.month(), 1)?;
                let last_of_prev = first_of_this - Duration::days(1);
                (NaiveDate::from_ymd_opt(last_of_prev.year(), last_of_prev.month(), 1)?, last_of_prev)
            }
            _ => (NaiveDate::from_ymd_opt(as_of.year(), as_of.month(), 1)?, as_of),
        };
        return Some(PeriodMatch::Relative(TimeRange::new(start, end, phrase)));
    }

    if let Some(caps) = YEAR.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let (start, end) = months(year, 1, year, 12)?;
        return Some(PeriodMatch::Year(TimeRange::new(start, end, year.to_string())));
    }

    None
}

/// First `YYYY-MM-DD to YYYY-MM-DD` range in `text`, with the bounds ordered.
pub fn find_iso_range(text: &str) -> Option<TimeRange> {
    ISO_RANGE.captures_iter(text).find_map(|caps| {
        let a = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let b = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").ok()?;
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Some(TimeRange::new(start, end, caps[0].to_string()))
    })
}

/// First day of `(y1, m1)` through last day of `(y2, m2)`.
fn months(y1: i32, m1: u32, y2: i32, m2: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(y1, m1, 1)?;
    let (next_y, next_m) = if m2 == 12 { (y2 + 1, 1) } else { (y2, m2 + 1) };
    let end = NaiveDate::from_ymd_opt(next_y, next_m, 1)? - Duration::days(1);
    Some((start, end))
}

fn quarter_bounds(year: i32, q: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = (q - 1) * 3 + 1;
    months(year, first, year, first + 2)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let idx = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"]
        .iter()
        .position(|m| *m == prefix)?;
    u32::try_from(idx + 1).ok()
}
