//! Cache key canonicalization.
//!
//! Requests for the same page must land on the same entry, so the key is the
//! request URL in a normalized form:
//!
//! - surrounding whitespace trimmed, `https://` assumed when no scheme is given
//! - only `http` and `https` accepted
//! - host lowercased (the `url` crate does this for special schemes)
//! - fragment dropped, an empty `?` dropped
//! - query string kept in its original order

use url::Url;

use crate::Error;

/// Parse and normalize a page URL.
pub fn canonical_url(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut url = Url::parse(&with_scheme).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("unsupported scheme: {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(format!("missing host: {trimmed}")));
    }

    url.set_fragment(None);
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// The cache key for a page URL.
pub fn cache_key(input: &str) -> Result<String, Error> {
    canonical_url(input).map(String::from)
}
