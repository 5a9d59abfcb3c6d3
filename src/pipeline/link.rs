//! Locate the document link on the landing page.

use scraper::{Html, Selector};
use tracing::debug;

/// Finds the anchor whose visible text equals a marker and absolutises its href.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    marker: String,
    origin: String,
}

impl LinkResolver {
    /// `origin` is scheme + host, e.g. `https://example.org`; a trailing
    /// slash is tolerated.
    pub fn new(marker: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of the first matching anchor, or `None` if there is no
    /// such anchor or it has no href.
    pub fn resolve(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let anchors = Selector::parse("a").ok()?;

        let href = document
            .select(&anchors)
            .find(|a| a.text().collect::<String>().trim() == self.marker)?
            .value()
            .attr("href")?
            .trim();

        if href.is_empty() {
            return None;
        }
        let link = self.absolutise(href);
        debug!("Resolved document link: {}", link);
        Some(link)
    }

    fn absolutise(&self, href: &str) -> String {
        if href.starts_with('/') {
            format!("{}{}", self.origin, href)
        } else if !has_scheme(href) {
            format!("{}/{}", self.origin, href)
        } else {
            href.to_string()
        }
    }
}

/// `scheme:` prefix per RFC 3986 (ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":").
fn has_scheme(href: &str) -> bool {
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
