//! Record extraction from fetched HTML.
//!
//! Each competitor's [`SelectorRule`](crate::config::SelectorRule) picks the
//! item elements (one per post); the per-item field selectors then pull the
//! title, date, snippet, and link out of each item.
//!
//! A selector that matches nothing is an error ([`ParseError::NoMatch`]), not
//! an empty success: "no new posts" and "the page layout changed under us"
//! must look different in the report.

use crate::config::CompetitorConfig;
use crate::errors::ParseError;
use crate::models::Record;
use crate::utils::{collapse_whitespace, format_date, truncate_text};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

/// Snippets are cut to this many characters.
pub const SNIPPET_MAX_CHARS: usize = 500;

/// At most this many content elements feed the snippet.
const SNIPPET_PARAGRAPHS: usize = 3;

fn compile(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Malformed(format!("bad selector `{css}`: {e}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Single-pass iterator over the records of one parsed page.
///
/// Items are matched up front (so a zero-match page fails early), but each
/// [`Record`] is built only when the iterator reaches it. Items without a
/// title are skipped.
pub struct Records<'a> {
    items: std::vec::IntoIter<ElementRef<'a>>,
    matched: usize,
    company: &'a str,
    page_url: &'a Url,
    title: Selector,
    date: Selector,
    content: Selector,
    link: Selector,
}

impl<'a> Records<'a> {
    /// Number of item elements the selector matched, before `max_items`.
    pub fn matched(&self) -> usize {
        self.matched
    }

    fn build(&self, item: ElementRef<'a>) -> Option<Record> {
        let title = item
            .select(&self.title)
            .map(element_text)
            .find(|t| !t.is_empty())?;

        let date = item.select(&self.date).next().and_then(|el| {
            let raw = el
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| element_text(el));
            let raw = raw.trim();
            (!raw.is_empty()).then(|| format_date(raw))
        });

        let snippet = item
            .select(&self.content)
            .take(SNIPPET_PARAGRAPHS)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let snippet = truncate_text(&snippet, SNIPPET_MAX_CHARS);

        let href = if item.value().name() == "a" {
            item.value().attr("href")
        } else {
            item.select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
        };
        let url = href
            .and_then(|h| self.page_url.join(h.trim()).ok())
            .map(|u| u.to_string());

        Some(Record::from_text(self.company, &title, url, date, &snippet))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let item = self.items.next()?;
            if let Some(record) = self.build(item) {
                return Some(record);
            }
            debug!(company = %self.company, "Skipping item without a title");
        }
    }
}

/// Apply a competitor's rules to a parsed document.
///
/// # Arguments
///
/// * `document` - The parsed page
/// * `page_url` - Base for resolving relative links
/// * `competitor` - Item selector, field selectors, and `max_items`
///
/// # Returns
///
/// A lazy, single-pass [`Records`] iterator over at most `max_items` items.
/// Text comes from the DOM's text nodes, so entities are decoded and only
/// whitespace is normalized afterwards.
///
/// # Errors
///
/// - [`ParseError::NoMatch`] when the item selector matches zero elements
/// - [`ParseError::Malformed`] when a field selector does not parse
///
/// # Example
///
/// ```ignore
/// let document = Html::parse_document(&body);
/// for record in extract(&document, &url, &competitor)? {
///     println!("{}", record.title());
/// }
/// ```
pub fn extract<'a>(
    document: &'a Html,
    page_url: &'a Url,
    competitor: &'a CompetitorConfig,
) -> Result<Records<'a>, ParseError> {
    let item_selector = competitor
        .selector
        .compile()
        .map_err(ParseError::Malformed)?;

    let all: Vec<ElementRef<'a>> = document.select(&item_selector).collect();
    if all.is_empty() {
        return Err(ParseError::NoMatch {
            selector: competitor.selector.to_css(),
        });
    }
    let matched = all.len();
    let items: Vec<ElementRef<'a>> = all.into_iter().take(competitor.max_items).collect();

    Ok(Records {
        items: items.into_iter(),
        matched,
        company: &competitor.name,
        page_url,
        title: compile(&competitor.title_selector)?,
        date: compile(&competitor.date_selector)?,
        content: compile(&competitor.content_selector)?,
        link: compile("a[href]")?,
    })
}

/// Parse `html` and collect every record for `competitor`.
///
/// # Errors
///
/// - [`ParseError::NoMatch`] when the item selector matches nothing
/// - [`ParseError::Malformed`] when items matched but none had a title
#[instrument(level = "info", skip_all, fields(company = %competitor.name))]
pub fn extract_records(
    html: &str,
    page_url: &Url,
    competitor: &CompetitorConfig,
) -> Result<Vec<Record>, ParseError> {
    let document = Html::parse_document(html);
    let records = extract(&document, page_url, competitor)?;
    let matched = records.matched();
    let records: Vec<Record> = records.collect();

    if records.is_empty() {
        return Err(ParseError::Malformed(format!(
            "{matched} elements matched `{}` but none had a title matching `{}`",
            competitor.selector.to_css(),
            competitor.title_selector
        )));
    }

    info!(matched, extracted = records.len(), "Extracted records");
    Ok(records)
}
