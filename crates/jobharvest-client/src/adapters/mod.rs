//! Built-in job board adapters.
//!
//! Every field is looked up through an ordered list of CSS selectors; the
//! first selector producing non-empty text wins. Boards reshuffle their
//! markup often, so each list runs from the current class names down to
//! generic fallbacks.

mod linkedin;
mod naukri;

use std::sync::Arc;

use jobharvest_core::adapter::SourceRegistry;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub use linkedin::LinkedInAdapter;
pub use naukri::NaukriAdapter;

/// Registry holding every built-in adapter.
pub fn default_registry() -> SourceRegistry {
    SourceRegistry::new()
        .register(Arc::new(LinkedInAdapter::new()))
        .register(Arc::new(NaukriAdapter::new()))
}

/// Parse selectors, dropping any the `scraper` crate rejects.
fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!(selector = %s, error = %e, "Ignoring invalid selector");
                None
            }
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Text of the first element, across `selectors` in order, with content.
fn first_text(root: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        root.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Value of `attr` on the first matching element that carries it.
fn first_attr(root: ElementRef<'_>, selectors: &[Selector], attr: &str) -> Option<String> {
    selectors.iter().find_map(|selector| {
        root.select(selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(String::from)
    })
}

/// Outer HTML of every element matching the first selector that matches
/// anything in `content`.
fn outer_html(content: &str, selectors: &[Selector]) -> Vec<String> {
    let document = Html::parse_document(content);
    selectors
        .iter()
        .map(|selector| {
            document
                .select(selector)
                .map(|el| el.html())
                .collect::<Vec<_>>()
        })
        .find(|entries| !entries.is_empty())
        .unwrap_or_default()
}

/// Resolve `href` against `base`.
fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Lowercase, dash-separated form of free text for URL paths.
fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_holds_builtin_sources() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["linkedin", "naukri"]);
    }

    #[test]
    fn first_text_skips_empty_matches() {
        let html = Html::parse_fragment(
            r#"<div><h3 class="a"> </h3><h3 class="b">Rust Engineer</h3></div>"#,
        );
        let selectors = compile(&["h3.a", "h3.b"]);
        assert_eq!(
            first_text(html.root_element(), &selectors).as_deref(),
            Some("Rust Engineer")
        );
    }

    #[test]
    fn absolute_url_joins_relative_paths() {
        assert_eq!(
            absolute_url("https://www.linkedin.com", "/jobs/view/42").as_deref(),
            Some("https://www.linkedin.com/jobs/view/42")
        );
        assert_eq!(
            absolute_url("https://www.naukri.com", "https://www.naukri.com/job-listings-x").as_deref(),
            Some("https://www.naukri.com/job-listings-x")
        );
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Python  Developer "), "python-developer");
        assert_eq!(slugify("C++ / Rust"), "c-rust");
        assert_eq!(slugify(""), "");
    }
}
