//! `addon.json` handling for Garry's Mod payloads

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Canonical manifest file name
pub const MANIFEST_FILE_NAME: &str = "addon.json";

/// Accepted addon types, in their canonical spelling
pub const ADDON_TYPES: &[&str] = &[
    "ServerContent",
    "gamemode",
    "map",
    "weapon",
    "vehicle",
    "npc",
    "tool",
    "effects",
    "model",
];

/// Accepted addon tags
pub const ADDON_TAGS: &[&str] = &[
    "fun", "roleplay", "scenic", "movie", "realism", "cartoon", "water", "comic", "build",
];

/// Maximum number of addon tags
pub const MAX_ADDON_TAGS: usize = 2;

/// Ignore patterns appended to every manifest
pub const IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".github/",
    ".vs/",
    ".vscode/",
    ".idea/",
    ".svn/",
    ".hg/",
    "bin/",
    "obj/",
    "node_modules/",
    "__pycache__/",
    ".venv/",
    ".pytest_cache/",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
];

/// Find the manifest in `dir`
///
/// Order: `addon.json`, any top-level `.json` named `addon.json` in another
/// case, `d.json`, then the only `.json` file if there is exactly one.
pub async fn locate_manifest(dir: &Path) -> Result<Option<PathBuf>> {
    let direct = dir.join(MANIFEST_FILE_NAME);
    if tokio::fs::metadata(&direct).await.is_ok_and(|m| m.is_file()) {
        return Ok(Some(direct));
    }

    let mut candidates = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && crate::utils::has_extension(&path, "json") {
            candidates.push(path);
        }
    }
    candidates.sort();

    let named = |wanted: &str| {
        candidates
            .iter()
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            })
            .cloned()
    };

    if let Some(found) = named(MANIFEST_FILE_NAME).or_else(|| named("d.json")) {
        return Ok(Some(found));
    }
    Ok(match candidates.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    })
}

/// Whether `path` is named exactly `addon.json` (any case)
pub fn is_canonical_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.eq_ignore_ascii_case(MANIFEST_FILE_NAME))
}

fn canonical_type(input: &str) -> Option<&'static str> {
    let input = input.trim();
    ADDON_TYPES
        .iter()
        .copied()
        .find(|t| t.eq_ignore_ascii_case(input))
}

/// Lowercased, trimmed, de-duplicated tags, blanks dropped
fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Contents of a new manifest
///
/// The type defaults to `ServerContent`. Unknown types or tags and more than
/// [`MAX_ADDON_TAGS`] tags are rejected.
pub fn new_manifest(
    title: &str,
    description: &str,
    content_type: Option<&str>,
    tags: &[String],
) -> Result<String> {
    let type_input = content_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("ServerContent");
    let addon_type = canonical_type(type_input)
        .ok_or_else(|| Error::invalid(format!("invalid addon type: {type_input:?}")))?;

    let tags = clean_tags(tags);
    if tags.len() > MAX_ADDON_TAGS {
        return Err(Error::invalid(format!(
            "addon tags are limited to {MAX_ADDON_TAGS}"
        )));
    }
    if let Some(bad) = tags.iter().find(|tag| !ADDON_TAGS.contains(&tag.as_str())) {
        return Err(Error::invalid(format!("invalid addon tag: {bad:?}")));
    }

    let title = match title.trim() {
        "" => "Addon",
        trimmed => trimmed,
    };

    let mut manifest = Map::new();
    manifest.insert("title".into(), title.into());
    manifest.insert("type".into(), addon_type.into());
    manifest.insert("tags".into(), tags.into());
    manifest.insert("ignore".into(), IGNORE_PATTERNS.to_vec().into());
    manifest.insert("description".into(), description.into());

    Ok(serde_json::to_string_pretty(&Value::Object(manifest))? + "\n")
}

/// Fill in what an existing manifest lacks
///
/// Missing `title`, `description`, `type` (only for a recognized type) and
/// `tags` (only allowed tags, at most [`MAX_ADDON_TAGS`]) are added, and the
/// recommended ignore patterns are appended without dropping existing ones.
/// Returns the new text, or `None` when nothing changed.
pub fn patch_manifest(
    text: &str,
    title: &str,
    description: &str,
    content_type: Option<&str>,
    tags: &[String],
) -> std::result::Result<Option<String>, String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut root: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let Some(obj) = root.as_object_mut() else {
        return Err("root must be a JSON object".into());
    };

    let mut changed = false;
    let has_string = |obj: &Map<String, Value>, key: &str| obj.get(key).is_some_and(Value::is_string);

    if !obj
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty())
    {
        let title = match title.trim() {
            "" => "Addon",
            trimmed => trimmed,
        };
        obj.insert("title".into(), title.into());
        changed = true;
    }

    if !has_string(obj, "description") {
        obj.insert("description".into(), description.into());
        changed = true;
    }

    if !has_string(obj, "type")
        && let Some(addon_type) = content_type.and_then(canonical_type)
    {
        obj.insert("type".into(), addon_type.into());
        changed = true;
    }

    if obj.get("tags").is_none_or(Value::is_null) {
        let tags: Vec<String> = clean_tags(tags)
            .into_iter()
            .filter(|tag| ADDON_TAGS.contains(&tag.as_str()))
            .take(MAX_ADDON_TAGS)
            .collect();
        if !tags.is_empty() {
            obj.insert("tags".into(), tags.into());
            changed = true;
        }
    }

    if !obj.get("ignore").is_some_and(Value::is_array) {
        obj.insert("ignore".into(), Value::Array(Vec::new()));
        changed = true;
    }
    if let Some(Value::Array(ignore)) = obj.get_mut("ignore") {
        let existing: HashSet<String> = ignore
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        for pattern in IGNORE_PATTERNS {
            if !existing.contains(&pattern.to_lowercase()) {
                ignore.push((*pattern).into());
                changed = true;
            }
        }
    }

    if !changed {
        return Ok(None);
    }
    let text = serde_json::to_string_pretty(&root).map_err(|e| e.to_string())?;
    Ok(Some(text + "\n"))
}

/// Patch the manifest at `path` in place
pub async fn patch_manifest_file(
    path: &Path,
    title: &str,
    description: &str,
    content_type: Option<&str>,
    tags: &[String],
) -> Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let patched = patch_manifest(&text, title, description, content_type, tags).map_err(
        |reason| Error::Manifest {
            path: path.to_path_buf(),
            reason,
        },
    )?;
    if let Some(patched) = patched {
        tracing::debug!(path = ?path, "patched addon manifest");
        tokio::fs::write(path, patched).await?;
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_manifest_uses_canonical_type_and_key_order() {
        let text = new_manifest("My Addon", "desc", Some("WEAPON"), &tags(&["Fun", "fun", " build "]))
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["title", "type", "tags", "ignore", "description"]);
        assert_eq!(value["type"], "weapon");
        assert_eq!(value["tags"], serde_json::json!(["fun", "build"]));
        assert_eq!(value["ignore"].as_array().unwrap().len(), IGNORE_PATTERNS.len());
    }

    #[test]
    fn new_manifest_defaults_and_rejections() {
        let value: Value =
            serde_json::from_str(&new_manifest(" ", "", None, &[]).unwrap()).unwrap();
        assert_eq!(value["title"], "Addon");
        assert_eq!(value["type"], "ServerContent");

        assert!(new_manifest("t", "", Some("skin"), &[]).is_err());
        assert!(new_manifest("t", "", None, &tags(&["fun", "water", "comic"])).is_err());
        assert!(new_manifest("t", "", None, &tags(&["spooky"])).is_err());
    }

    #[test]
    fn patch_fills_missing_fields_only() {
        let original = "\u{feff}{\"title\":\"Kept\",\"ignore\":[\"*.psd\",\".git/\"]}";
        let patched = patch_manifest(original, "New", "d", Some("map"), &tags(&["scenic", "bogus"]))
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&patched).unwrap();

        assert_eq!(value["title"], "Kept");
        assert_eq!(value["description"], "d");
        assert_eq!(value["type"], "map");
        assert_eq!(value["tags"], serde_json::json!(["scenic"]));

        let ignore: Vec<&str> = value["ignore"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(ignore[0], "*.psd");
        assert_eq!(ignore.iter().filter(|p| **p == ".git/").count(), 1);
        assert_eq!(ignore.len(), IGNORE_PATTERNS.len() + 1);
    }

    #[test]
    fn patch_ignores_unknown_type_and_reports_no_change() {
        let complete = new_manifest("T", "D", None, &tags(&["fun"])).unwrap();
        assert_eq!(
            patch_manifest(&complete, "x", "y", Some("weapon"), &[]).unwrap(),
            None
        );

        let patched = patch_manifest("{\"title\":\"T\"}", "", "", Some("skin"), &[])
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&patched).unwrap();
        assert!(value.get("type").is_none());
    }

    #[test]
    fn patch_rejects_non_object_root() {
        assert!(patch_manifest("[1,2]", "", "", None, &[]).is_err());
        assert!(patch_manifest("{ not json", "", "", None, &[]).is_err());
    }

    #[tokio::test]
    async fn locate_prefers_direct_then_d_json_then_sole_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        assert_eq!(locate_manifest(dir).await.unwrap(), None);

        std::fs::write(dir.join("info.json"), "{}").unwrap();
        assert_eq!(locate_manifest(dir).await.unwrap(), Some(dir.join("info.json")));

        std::fs::write(dir.join("other.json"), "{}").unwrap();
        assert_eq!(locate_manifest(dir).await.unwrap(), None);

        std::fs::write(dir.join("D.json"), "{}").unwrap();
        assert_eq!(locate_manifest(dir).await.unwrap(), Some(dir.join("D.json")));

        std::fs::write(dir.join("addon.json"), "{}").unwrap();
        let found = locate_manifest(dir).await.unwrap().unwrap();
        assert!(is_canonical_name(&found));
    }

    #[tokio::test]
    async fn patch_file_reports_manifest_error_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("addon.json");
        std::fs::write(&path, "not json").unwrap();

        let err = patch_manifest_file(&path, "t", "d", None, &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "manifest_error");
        assert!(err.to_string().contains("addon.json"));
    }
}
