//! Status code hints embedded in rendered pages.
//!
//! Single-page apps answer every route with 200 and only know after running
//! scripts that a page is missing. They can say so with
//! `<meta name="prerender-status-code" content="404">`, which overrides the
//! status of a successful render.

use scraper::{Html, Selector};

pub const STATUS_META_NAME: &str = "prerender-status-code";

/// The status requested by the page's meta tag, if it holds a valid code.
pub fn status_hint(html: &str) -> Option<u16> {
    // cheap pre-check, most pages have no hint
    if !html.contains(STATUS_META_NAME) {
        return None;
    }

    let selector = Selector::parse(&format!("meta[name=\"{STATUS_META_NAME}\"]")).ok()?;
    let document = Html::parse_document(html);
    let content = document.select(&selector).next()?.value().attr("content")?;

    content.trim().parse::<u16>().ok().filter(|code| (100..=599).contains(code))
}
