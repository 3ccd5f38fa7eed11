//! Published-file id extraction from user input
//!
//! Accepts a bare id, a workshop URL (`?id=N` or a trailing numeric path
//! segment), or arbitrary text containing an id.

use crate::types::PublishedFileId;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static STANDALONE_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{6,})\b").expect("STANDALONE_DIGITS_RE should compile"));

/// Extract a published-file id from a raw id, a URL or free text
///
/// Returns `None` when nothing id-shaped is found.
///
/// # Examples
///
/// ```
/// use workshop_dl::ids::parse_published_file_id;
/// use workshop_dl::PublishedFileId;
///
/// assert_eq!(
///     parse_published_file_id("https://steamcommunity.com/sharedfiles/filedetails/?id=123456789"),
///     Some(PublishedFileId(123456789))
/// );
/// assert_eq!(parse_published_file_id("no id here"), None);
/// ```
pub fn parse_published_file_id(input: &str) -> Option<PublishedFileId> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(id) = input.parse::<u64>() {
        return Some(PublishedFileId(id));
    }

    if let Ok(url) = url::Url::parse(input) {
        let from_query = url
            .query_pairs()
            .find(|(name, _)| name.eq_ignore_ascii_case("id"))
            .and_then(|(_, value)| value.trim().parse::<u64>().ok());
        if let Some(id) = from_query {
            return Some(PublishedFileId(id));
        }

        let last_segment = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()));
        if let Some(id) = last_segment.and_then(|s| s.parse::<u64>().ok()) {
            return Some(PublishedFileId(id));
        }
    }

    STANDALONE_DIGITS_RE
        .captures_iter(input)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .last()
        .map(PublishedFileId)
}
