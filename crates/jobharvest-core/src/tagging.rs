//! Tag enrichment and classification.

use crate::models::{JobRecord, ScrapeMode, TagCategory};

const TECHNOLOGY_KEYWORDS: &[&str] = &[
    "python", "java", "javascript", "typescript", "react", "angular", "vue", "node", "nodejs",
    "django", "flask", "spring", "rust", "go", "golang", "c++", "c#", ".net", "php", "ruby",
    "rails", "kotlin", "swift", "scala", "sql", "mysql", "postgresql", "mongodb", "redis",
    "aws", "azure", "gcp", "docker", "kubernetes", "terraform", "linux", "git", "html", "css",
    "machine learning", "ml", "ai", "data science", "devops", "microservices", "api",
];

const EXPERIENCE_KEYWORDS: &[&str] = &[
    "senior", "junior", "lead", "principal", "staff", "intern", "internship", "fresher",
    "entry level", "mid level", "manager", "director", "head", "architect",
];

const JOB_TYPE_KEYWORDS: &[&str] = &[
    "full-time", "full time", "part-time", "part time", "contract", "contractual", "freelance",
    "temporary", "permanent", "hybrid", "onsite", "on-site",
];

/// Request-level facts that become tags on every record of a run.
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    pub query: &'a str,
    /// Location filter as supplied by the caller, if any.
    pub location: Option<&'a str>,
    pub mode: ScrapeMode,
    pub source: &'a str,
}

fn tag(prefix: &str, value: &str) -> Option<String> {
    let value = value.trim().to_lowercase();
    (!value.is_empty()).then(|| format!("{prefix}:{value}"))
}

/// Add context and content tags to a record.
///
/// Deterministic and idempotent: tags are a set, so enriching twice with
/// the same context changes nothing.
pub fn enrich(mut record: JobRecord, ctx: &TagContext<'_>) -> JobRecord {
    let derived = [
        tag("search", ctx.query),
        ctx.location.and_then(|l| tag("location", l)),
        tag("company", &record.company),
        record.salary.as_deref().and_then(|s| tag("salary", s)),
        tag("source", ctx.source),
        tag("mode", ctx.mode.as_str()),
        record.is_remote.then(|| "remote".to_string()),
    ];
    record.tags.extend(derived.into_iter().flatten());
    record
}

/// Classify a tag by prefix first, then by keyword.
pub fn categorize(tag: &str) -> TagCategory {
    let tag = tag.trim().to_lowercase();
    if let Some((prefix, _)) = tag.split_once(':') {
        match prefix {
            "location" => return TagCategory::Location,
            "company" => return TagCategory::Company,
            "salary" => return TagCategory::Compensation,
            "search" => return TagCategory::Search,
            "source" | "mode" => return TagCategory::Source,
            _ => {}
        }
    }
    if tag == "remote" {
        return TagCategory::Location;
    }

    let words: Vec<&str> = tag
        .split(|c: char| c.is_whitespace() || c == '/' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keywords: &[&str]| {
        keywords
            .iter()
            .any(|k| if k.contains(' ') { tag.contains(k) } else { words.contains(k) })
    };

    if has(TECHNOLOGY_KEYWORDS) {
        TagCategory::Technology
    } else if has(EXPERIENCE_KEYWORDS) {
        TagCategory::Experience
    } else if has(JOB_TYPE_KEYWORDS) {
        TagCategory::JobType
    } else {
        TagCategory::Other
    }
}
