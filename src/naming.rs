//! Deterministic output naming for downloaded content

use crate::config::NamingOptions;
use crate::types::{ItemDetails, PublishedFileId};

/// Maximum length of a generated base name, in characters
pub const MAX_BASE_NAME_CHARS: usize = 120;

/// Build the base name (no extension) for a download's output
///
/// Components, in order: sanitized title (when `include_title` and a title is
/// known), the numeric id (or `content_name_base` when `include_id` is off), and
/// the update timestamp as `yyyyMMdd_HHmmss` UTC. Components are joined by `_` or
/// a space depending on `replace_spaces_with_underscores`, sanitized again, and
/// capped at [`MAX_BASE_NAME_CHARS`]. Falls back to the id when nothing is left.
///
/// # Examples
///
/// ```
/// use workshop_dl::config::NamingOptions;
/// use workshop_dl::naming::build_output_base_name;
/// use workshop_dl::{ItemDetails, PublishedFileId};
///
/// let details = ItemDetails {
///     title: Some("My Cool: Map?".into()),
///     ..Default::default()
/// };
/// let options = NamingOptions { include_title: true, ..Default::default() };
///
/// assert_eq!(
///     build_output_base_name(PublishedFileId(42), Some(&details), &options, None),
///     "My_Cool_Map_42"
/// );
/// ```
pub fn build_output_base_name(
    published_file_id: PublishedFileId,
    details: Option<&ItemDetails>,
    options: &NamingOptions,
    content_name_base: Option<&str>,
) -> String {
    let underscores = options.replace_spaces_with_underscores;
    let mut parts: Vec<String> = Vec::with_capacity(3);

    if options.include_title
        && let Some(title) = details.and_then(|d| d.title.as_deref())
        && !title.trim().is_empty()
    {
        parts.push(sanitize_file_name(title, underscores));
    }

    if options.include_id {
        parts.push(published_file_id.to_string());
    } else if let Some(base) = content_name_base.filter(|b| !b.trim().is_empty()) {
        parts.push(sanitize_file_name(base, underscores));
    } else if parts.is_empty() {
        parts.push(published_file_id.to_string());
    }

    if options.append_updated_timestamp
        && let Some(updated) = details.and_then(|d| d.updated_at)
    {
        parts.push(updated.format("%Y%m%d_%H%M%S").to_string());
    }

    let separator = if underscores { "_" } else { " " };
    let combined = parts
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(separator);

    let mut name = sanitize_file_name(&combined, underscores);
    if name.chars().count() > MAX_BASE_NAME_CHARS {
        let truncated: String = name.chars().take(MAX_BASE_NAME_CHARS).collect();
        name = truncated
            .trim()
            .trim_end_matches(['_', '.', ' '])
            .to_string();
    }

    if name.trim().is_empty() {
        published_file_id.to_string()
    } else {
        name
    }
}

/// Replace characters that are invalid in file names on any supported platform
///
/// With `replace_whitespace`, whitespace also becomes `_`, leading underscores
/// are dropped and runs of underscores collapse to one; otherwise runs of
/// spaces collapse to one. Trailing dots and spaces are trimmed.
///
/// # Examples
///
/// ```
/// use workshop_dl::naming::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("a/b\\c  d", true), "a_b_c_d");
/// assert_eq!(sanitize_file_name("a  b.", false), "a b");
/// ```
pub fn sanitize_file_name(input: &str, replace_whitespace: bool) -> String {
    if input.trim().is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(input.len());
    let mut last: Option<char> = None;

    for c in input.chars() {
        let mapped = if is_invalid_file_name_char(c) || (replace_whitespace && c.is_whitespace()) {
            '_'
        } else if c.is_whitespace() {
            ' '
        } else {
            c
        };

        if replace_whitespace && mapped == '_' && (out.is_empty() || last == Some('_')) {
            last = Some('_');
            continue;
        }
        if mapped == ' ' && last == Some(' ') {
            continue;
        }

        out.push(mapped);
        last = Some(mapped);
    }

    out.trim().trim_end_matches(['.', ' ']).to_string()
}

fn is_invalid_file_name_char(c: char) -> bool {
    c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
}
