//! Cleaning rules applied to every freshly parsed record.
//!
//! Adapters only pull raw text out of a page; everything that is common to
//! all sources (salary parsing, remote detection, tag and URL hygiene)
//! happens here.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use url::Url;

use crate::adapter::ParseError;
use crate::models::{JobRecord, ScrapeMode};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

static THOUSANDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\s*k\b").expect("valid thousands regex"));

static RUPEE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:inr|rs\.?)\b|₹").expect("valid rupee regex"));

static LAKH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:lpa|lakhs?|lacs?)\b").expect("valid lakh regex"));

static RELATIVE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\+?\s*(minute|min|hour|hr|day|week|month)s?\s+ago")
        .expect("valid relative date regex")
});

static REMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:remote|work from home|wfh|anywhere)\b").expect("valid remote regex")
});

/// Salary bounds and currency parsed from a displayed salary string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedSalary {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub currency: Option<String>,
}

/// Parse a salary as shown on a listing, e.g. `"₹ 5-8 Lacs PA"` or
/// `"$120k - $150k"`.
///
/// The first two numbers become the bounds; a single number fills both.
/// Strings without digits yield no bounds.
pub fn parse_salary(raw: &str) -> ParsedSalary {
    let lower = raw.to_lowercase().replace(',', "");

    let in_lakhs = LAKH_RE.is_match(&lower);
    let currency = if in_lakhs || RUPEE_RE.is_match(&lower) {
        Some("INR".to_string())
    } else if lower.contains('$') || lower.contains("usd") {
        Some("USD".to_string())
    } else {
        None
    };

    let multiplier = if in_lakhs {
        100_000.0
    } else if THOUSANDS_RE.is_match(&lower) {
        1_000.0
    } else {
        1.0
    };

    let amounts: Vec<i64> = NUMBER_RE
        .find_iter(&lower)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .take(2)
        .map(|n| (n * multiplier).round() as i64)
        .collect();

    let (min, max) = match amounts.as_slice() {
        [] => (None, None),
        [single] => (Some(*single), Some(*single)),
        [a, b, ..] => (Some(*a.min(b)), Some(*a.max(b))),
    };

    ParsedSalary { min, max, currency }
}

/// Resolve a posting date relative to `now`.
///
/// Understands `"just now"`, `"today"`, `"yesterday"`, `"N <unit>s ago"`
/// (a month counts as 30 days), RFC 3339 and `YYYY-MM-DD`. Anything else
/// resolves to `now`.
pub fn parse_posted_date(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() || lower.contains("just now") || lower.contains("today") {
        return now;
    }
    if lower.contains("yesterday") {
        return Duration::try_days(1)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);
    }

    if let Some(caps) = RELATIVE_DATE_RE.captures(&lower) {
        let amount: i64 = caps[1].parse().unwrap_or(0);
        let delta = match &caps[2] {
            "minute" | "min" => Duration::try_minutes(amount),
            "hour" | "hr" => Duration::try_hours(amount),
            "day" => Duration::try_days(amount),
            "week" => Duration::try_weeks(amount),
            "month" => amount.checked_mul(30).and_then(Duration::try_days),
            _ => Some(Duration::zero()),
        };
        // Counts too large to represent resolve to `now` like any other
        // unreadable date.
        return delta
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim()) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.and_utc();
        }
    }

    now
}

/// True when the title, location or any tag advertises remote work.
pub fn derive_is_remote<'a>(
    title: &str,
    location: Option<&str>,
    tags: impl IntoIterator<Item = &'a String>,
) -> bool {
    REMOTE_RE.is_match(title)
        || location.is_some_and(|l| REMOTE_RE.is_match(l))
        || tags.into_iter().any(|t| REMOTE_RE.is_match(t))
}

/// Trim and lowercase tags, dropping empties.
pub fn normalize_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Check that `raw` is an absolute http(s) URL and strip its fragment.
pub fn normalize_job_url(raw: &str) -> Result<String, ParseError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|_| ParseError::InvalidUrl(trimmed.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ParseError::InvalidUrl(trimmed.to_string()));
    }
    if url.fragment().is_none() {
        return Ok(trimmed.to_string());
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty())
}

fn clean_required(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply the common cleaning rules to a parsed record.
///
/// Stamps `source` and `mode`, collapses whitespace, fills salary bounds
/// from the raw salary when the adapter left them empty, derives
/// `is_remote` and lowercases tags. A blank title or an unusable URL
/// rejects the record.
pub fn normalize(
    mut record: JobRecord,
    source: &str,
    mode: ScrapeMode,
) -> Result<JobRecord, ParseError> {
    record.source = source.to_string();
    record.mode = mode;

    record.title = clean_required(&record.title);
    if record.title.is_empty() {
        return Err(ParseError::MissingField("title"));
    }
    record.company = clean_required(&record.company);
    record.location = clean_optional(record.location.take());
    record.salary = clean_optional(record.salary.take());
    record.currency = clean_optional(record.currency.take()).map(|c| c.to_uppercase());
    record.job_url = normalize_job_url(&record.job_url)?;

    if let Some(raw) = &record.salary {
        if record.salary_min.is_none() && record.salary_max.is_none() {
            let parsed = parse_salary(raw);
            record.salary_min = parsed.min;
            record.salary_max = parsed.max;
            if record.currency.is_none() {
                record.currency = parsed.currency;
            }
        }
    }

    record.tags = normalize_tags(&record.tags);
    record.is_remote = record.is_remote
        || derive_is_remote(&record.title, record.location.as_deref(), &record.tags);

    Ok(record)
}
