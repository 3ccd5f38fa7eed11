//! Workshop build manifest (`workshopitem` VDF) for SteamCMD

use crate::error::Result;
use crate::types::{AppId, PublishRequest, PublishedFileId};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Default manifest location: `<tmp>/workshop_<app>_<id|new>.vdf`
pub fn default_vdf_path(app_id: AppId, published_file_id: PublishedFileId) -> PathBuf {
    let id = if published_file_id.is_unset() {
        "new".to_string()
    } else {
        published_file_id.to_string()
    };
    std::env::temp_dir().join(format!("workshop_{app_id}_{id}.vdf"))
}

/// Escape backslash, quote and the control characters SteamCMD cares about
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Trimmed tags, de-duplicated case-insensitively, comma-joined
fn tags_csv(tags: &[String]) -> Option<String> {
    let mut seen = HashSet::new();
    let cleaned: Vec<&str> = tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect();
    (!cleaned.is_empty()).then(|| cleaned.join(","))
}

/// Render the manifest for `request` with `content_folder` as the payload
pub fn render_vdf(request: &PublishRequest, content_folder: &Path) -> Result<String> {
    let content = std::path::absolute(content_folder)?;
    let preview = std::path::absolute(&request.preview_file)?;

    let mut fields: Vec<(&str, String)> = vec![
        ("appid", request.app_id.to_string()),
        ("publishedfileid", request.published_file_id.to_string()),
        ("contentfolder", content.to_string_lossy().into_owned()),
        ("previewfile", preview.to_string_lossy().into_owned()),
        ("visibility", (request.visibility as i32).to_string()),
        ("title", request.title.clone()),
        ("description", request.description.clone()),
        ("changenote", request.change_note.clone()),
    ];
    if let Some(tags) = tags_csv(&request.tags) {
        fields.push(("tags", tags));
    }

    let mut out = String::from("\"workshopitem\"\n{\n");
    for (key, value) in fields {
        let _ = writeln!(out, "\t\"{key}\"\t\t\"{}\"", escape_value(&value));
    }
    out.push_str("}\n");
    Ok(out)
}

/// Write the manifest, creating parent directories as needed
pub async fn write_vdf(path: &Path, request: &PublishRequest, content_folder: &Path) -> Result<()> {
    let text = render_vdf(request, content_folder)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}

/// Read `publishedfileid` back from a manifest SteamCMD has updated
pub fn parse_published_file_id(text: &str) -> Option<PublishedFileId> {
    text.lines().find_map(|line| {
        let mut quoted = line.split('"').skip(1).step_by(2);
        let key = quoted.next()?;
        if !key.eq_ignore_ascii_case("publishedfileid") {
            return None;
        }
        quoted
            .next()?
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(PublishedFileId)
    })
}

/// Published id from the manifest file, if it can be read
pub async fn read_published_file_id(path: &Path) -> Option<PublishedFileId> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_published_file_id(&text),
        Err(e) => {
            tracing::debug!(path = ?path, error = %e, "could not read back workshop manifest");
            None
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;

    fn request() -> PublishRequest {
        let mut request = PublishRequest::new(
            AppId(4000),
            "/content",
            "/preview.jpg",
            "Title \"quoted\"",
            "line1\nline2",
            "fix\tstuff",
        );
        request.visibility = Visibility::Unlisted;
        request.tags = vec![" Fun ".into(), "fun".into(), "".into(), "Build".into()];
        request
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_value("a\\b\"c\r\n\t"), "a\\\\b\\\"c\\r\\n\\t");
    }

    #[test]
    fn rendered_layout_and_order() {
        let text = render_vdf(&request(), Path::new("/payload")).unwrap();
        let expected = "\"workshopitem\"\n{\n\
            \t\"appid\"\t\t\"4000\"\n\
            \t\"publishedfileid\"\t\t\"0\"\n\
            \t\"contentfolder\"\t\t\"/payload\"\n\
            \t\"previewfile\"\t\t\"/preview.jpg\"\n\
            \t\"visibility\"\t\t\"3\"\n\
            \t\"title\"\t\t\"Title \\\"quoted\\\"\"\n\
            \t\"description\"\t\t\"line1\\nline2\"\n\
            \t\"changenote\"\t\t\"fix\\tstuff\"\n\
            \t\"tags\"\t\t\"Fun,Build\"\n\
            }\n";
        if cfg!(unix) {
            assert_eq!(text, expected);
        }
    }

    #[test]
    fn tags_line_is_omitted_when_empty() {
        let mut request = request();
        request.tags = vec!["  ".into()];
        let text = render_vdf(&request, Path::new("/payload")).unwrap();
        assert!(!text.contains("\"tags\""));
    }

    #[test]
    fn published_id_read_back() {
        let text = "\"workshopitem\"\n{\n\t\"appid\"\t\t\"4000\"\n\t\"publishedfileid\"\t\t\"3141592653\"\n}\n";
        assert_eq!(parse_published_file_id(text), Some(PublishedFileId(3141592653)));
        assert_eq!(
            parse_published_file_id("\"workshopitem\"\n{\n\t\"publishedfileid\"\t\t\"0\"\n}"),
            None
        );
        assert_eq!(parse_published_file_id("garbage"), None);
    }

    #[test]
    fn default_path_names_new_items() {
        let path = default_vdf_path(AppId(4000), PublishedFileId(0));
        assert!(path.ends_with("workshop_4000_new.vdf"));
        let path = default_vdf_path(AppId(730), PublishedFileId(12));
        assert!(path.ends_with("workshop_730_12.vdf"));
    }
}
