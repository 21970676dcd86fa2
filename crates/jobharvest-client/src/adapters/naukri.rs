use std::collections::HashSet;

use chrono::Utc;
use jobharvest_core::adapter::{ParseError, ScriptPolicy, SourceAdapter};
use jobharvest_core::error::AppError;
use jobharvest_core::models::{JobFilters, JobRecord};
use jobharvest_core::normalize::parse_posted_date;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{absolute_url, compile, element_text, first_attr, first_text, outer_html, slugify};

const SITE_BASE: &str = "https://www.naukri.com";
const PAGE_SIZE: usize = 20;
const MAX_PAGES: u32 = 20;

/// City names that show up in Naukri listing slugs.
const CITIES: &[&str] = &[
    "bengaluru",
    "bangalore",
    "mumbai",
    "delhi",
    "pune",
    "chennai",
    "hyderabad",
    "kolkata",
    "noida",
    "gurgaon",
    "gurugram",
    "ahmedabad",
    "jaipur",
    "ajmer",
    "remote",
];

/// Naukri search results.
///
/// The result list is rendered client side, so this adapter needs a
/// session that executes scripts.
pub struct NaukriAdapter {
    card: Vec<Selector>,
    title: Vec<Selector>,
    company: Vec<Selector>,
    location: Vec<Selector>,
    salary: Vec<Selector>,
    date: Vec<Selector>,
    tags: Vec<Selector>,
}

impl NaukriAdapter {
    pub fn new() -> Self {
        Self {
            card: compile(&[".srp-jobtuple-wrapper", "article.jobTuple", "div.cust-job-tuple"]),
            title: compile(&["h2 a.title", "a.title"]),
            company: compile(&[
                "a.comp-name",
                "a.subTitle",
                "span.comp-name",
                "[class*='comp-name']",
            ]),
            location: compile(&[
                "span.locWdth",
                "span[class*='location']",
                ".location",
                "[class*='location']",
            ]),
            salary: compile(&[
                "span[class*='salary']",
                "div[class*='salary']",
                "span[class*='compensation']",
                "div[class*='compensation']",
            ]),
            date: compile(&[
                "span[class*='date']",
                "div[class*='date']",
                "span[class*='posted']",
                "div[class*='posted']",
                "time",
            ]),
            tags: compile(&["ul.tags li a", "ul.tags li", "ul.tags-gt li"]),
        }
    }

    fn tags(&self, card: ElementRef<'_>) -> Vec<String> {
        self.tags
            .iter()
            .map(|selector| {
                card.select(selector)
                    .map(element_text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .find(|tags| !tags.is_empty())
            .unwrap_or_default()
    }
}

impl Default for NaukriAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Dash-separated words of the last path segment of a listing URL.
fn slug_parts(job_url: &str) -> Vec<String> {
    Url::parse(job_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_lowercase))
        })
        .map(|segment| {
            segment
                .split('-')
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Company name recovered from a slug such as
/// `job-listings-rust-developer-zeta-tech-bengaluru-3-to-6-years-120524001234`.
///
/// Title words directly after the `job-listings` prefix are skipped; the
/// company runs until a city name or a numeric part.
fn company_from_slug(parts: &[String], title: &str) -> Option<String> {
    let title_words: HashSet<String> = slugify(title).split('-').map(String::from).collect();
    let company: Vec<String> = parts
        .iter()
        .skip_while(|p| p.as_str() == "job" || p.as_str() == "listings")
        .skip_while(|p| title_words.contains(p.as_str()))
        .take_while(|p| !CITIES.contains(&p.as_str()) && !p.chars().any(|c| c.is_ascii_digit()))
        .map(|p| title_case(p))
        .collect();
    (!company.is_empty()).then(|| company.join(" "))
}

/// Cities mentioned in a listing slug, title cased.
fn location_from_slug(parts: &[String]) -> Option<String> {
    let cities: Vec<String> = parts
        .iter()
        .filter(|p| CITIES.contains(&p.as_str()))
        .map(|p| title_case(p))
        .collect();
    (!cities.is_empty()).then(|| cities.join(", "))
}

impl SourceAdapter for NaukriAdapter {
    fn name(&self) -> &str {
        "naukri"
    }

    fn build_search_url(
        &self,
        query: &str,
        filters: &JobFilters,
        page: u32,
    ) -> Result<String, AppError> {
        let query = slugify(query);
        if query.is_empty() {
            return Err(AppError::ValidationError(
                "Naukri search needs a non-empty query".into(),
            ));
        }
        // Naukri numbers result pages from 1.
        let page = page + 1;
        let location = filters.location.as_deref().map(slugify).unwrap_or_default();

        Ok(if location.is_empty() {
            format!("{SITE_BASE}/{query}-jobs-{page}?k={query}")
        } else {
            format!("{SITE_BASE}/{query}-jobs-in-{location}-{page}?k={query}&l={location}")
        })
    }

    fn ready_selector(&self) -> &str {
        ".srp-jobtuple-wrapper"
    }

    fn extract_raw_entries(&self, page_content: &str) -> Vec<String> {
        outer_html(page_content, &self.card)
    }

    fn parse_entry(&self, raw: &str) -> Result<JobRecord, ParseError> {
        let fragment = Html::parse_fragment(raw);
        let card = fragment.root_element();

        let title = first_text(card, &self.title).ok_or(ParseError::MissingField("title"))?;
        let href = first_attr(card, &self.title, "href").ok_or(ParseError::MissingField("job_url"))?;
        let job_url = absolute_url(SITE_BASE, &href).ok_or_else(|| ParseError::InvalidUrl(href.clone()))?;

        let slug = slug_parts(&job_url);
        let company = first_text(card, &self.company)
            .or_else(|| company_from_slug(&slug, &title))
            .unwrap_or_default();

        let mut record = JobRecord::new(self.name(), job_url, title, company);
        record.location = first_text(card, &self.location).or_else(|| location_from_slug(&slug));
        record.salary = first_text(card, &self.salary);

        let date_text = first_text(card, &self.date).unwrap_or_else(|| "today".to_string());
        record.posted_date = Some(parse_posted_date(&date_text, Utc::now()));
        record.tags = self.tags(card).into_iter().collect();

        Ok(record)
    }

    fn page_size(&self) -> Option<usize> {
        Some(PAGE_SIZE)
    }

    fn max_pages(&self) -> Option<u32> {
        Some(MAX_PAGES)
    }

    fn script_policy(&self) -> ScriptPolicy {
        ScriptPolicy::Required
    }
}
