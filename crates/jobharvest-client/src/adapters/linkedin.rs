use chrono::Utc;
use jobharvest_core::adapter::{ParseError, ScriptPolicy, SourceAdapter};
use jobharvest_core::error::AppError;
use jobharvest_core::models::{JobFilters, JobRecord};
use jobharvest_core::normalize::parse_posted_date;
use scraper::{Html, Selector};
use url::Url;

use super::{absolute_url, compile, first_attr, first_text, outer_html};

const SEARCH_BASE: &str = "https://www.linkedin.com/jobs/search";
const SITE_BASE: &str = "https://www.linkedin.com";
const DEFAULT_LOCATION: &str = "India";
const PAGE_SIZE: usize = 25;

/// Public (logged-out) LinkedIn job search.
///
/// Paginates with `start=0,25,50,...`; salaries are not shown on the
/// public result cards.
pub struct LinkedInAdapter {
    card: Vec<Selector>,
    url: Vec<Selector>,
    title: Vec<Selector>,
    company: Vec<Selector>,
    location: Vec<Selector>,
    date: Vec<Selector>,
}

impl LinkedInAdapter {
    pub fn new() -> Self {
        Self {
            card: compile(&[
                "ul.jobs-search__results-list > li",
                "li.jobs-search__results-list-item",
            ]),
            url: compile(&[
                "a.base-card__full-link",
                "a[data-control-name='job_card_click']",
                "a[href*='/jobs/view/']",
                "a[href*='linkedin.com/jobs']",
            ]),
            title: compile(&[
                "h3.base-search-card__title",
                "h3[data-testid='job-search-card__title']",
                "h3.job-search-card__title",
                "a[data-control-name='job_card_click'] h3",
                "h3",
            ]),
            company: compile(&[
                "h4.base-search-card__subtitle a",
                "h4.base-search-card__subtitle",
                "span.job-search-card__company-name",
                "a[data-control-name='job_card_company_click']",
                "h4",
            ]),
            location: compile(&[
                "span.job-search-card__location",
                "span[data-testid='job-search-card__location']",
                "span.location",
                "li.job-search-card__location",
            ]),
            date: compile(&[
                "time",
                "span.job-search-card__listdate",
                "span[data-testid='job-search-card__listdate']",
            ]),
        }
    }
}

impl Default for LinkedInAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop tracking parameters so the same posting keeps one URL.
fn canonical_job_url(href: &str) -> Option<String> {
    let absolute = absolute_url(SITE_BASE, href)?;
    let mut url = Url::parse(&absolute).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

impl SourceAdapter for LinkedInAdapter {
    fn name(&self) -> &str {
        "linkedin"
    }

    fn build_search_url(
        &self,
        query: &str,
        filters: &JobFilters,
        page: u32,
    ) -> Result<String, AppError> {
        let location = filters
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCATION);
        let start = (page as usize * PAGE_SIZE).to_string();

        let mut params = vec![
            ("keywords", query.trim()),
            ("location", location),
            ("start", start.as_str()),
        ];
        if filters.is_remote == Some(true) {
            // Workplace type 2 is "Remote".
            params.push(("f_WT", "2"));
        }

        Url::parse_with_params(SEARCH_BASE, &params)
            .map(|u| u.to_string())
            .map_err(|e| AppError::ValidationError(format!("Cannot build LinkedIn URL: {e}")))
    }

    fn ready_selector(&self) -> &str {
        "ul.jobs-search__results-list li"
    }

    fn extract_raw_entries(&self, page_content: &str) -> Vec<String> {
        outer_html(page_content, &self.card)
    }

    fn parse_entry(&self, raw: &str) -> Result<JobRecord, ParseError> {
        let fragment = Html::parse_fragment(raw);
        let card = fragment.root_element();

        let href = first_attr(card, &self.url, "href").ok_or(ParseError::MissingField("job_url"))?;
        let job_url =
            canonical_job_url(&href).ok_or_else(|| ParseError::InvalidUrl(href.clone()))?;
        let title = first_text(card, &self.title).ok_or(ParseError::MissingField("title"))?;
        let company = first_text(card, &self.company).unwrap_or_default();

        let mut record = JobRecord::new(self.name(), job_url, title, company);
        record.location = first_text(card, &self.location);

        let date_text = first_attr(card, &self.date, "datetime").or_else(|| first_text(card, &self.date));
        record.posted_date = date_text.map(|text| parse_posted_date(&text, Utc::now()));

        Ok(record)
    }

    fn page_size(&self) -> Option<usize> {
        Some(PAGE_SIZE)
    }

    fn script_policy(&self) -> ScriptPolicy {
        ScriptPolicy::Optional
    }
}
