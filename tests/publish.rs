//! Publish pipeline scenarios: staging, packing, upload and scratch cleanup
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --test publish
//! ```

mod common;

use async_trait::async_trait;
use common::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use workshop_dl::{
    AppId, ContainerFormat, ContainerPacker, EventSink, NoOpPacker, PublishBackend,
    PublishRequest, PublishedFileId, Workshop,
};

const UNUSED_DETAILS: &str = "http://127.0.0.1:9/details";

/// Packer that records what it was asked to pack and writes a stub output
#[derive(Default)]
struct RecordingPacker {
    calls: Mutex<Vec<(Vec<String>, PathBuf, ContainerFormat)>>,
    fail: bool,
}

#[async_trait]
impl ContainerPacker for RecordingPacker {
    async fn pack(
        &self,
        input_dir: &Path,
        output_path: &Path,
        format: ContainerFormat,
        _events: &EventSink,
        _cancel: &CancellationToken,
    ) -> workshop_dl::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((relative_files(input_dir), output_path.to_path_buf(), format));
        if self.fail {
            return Err(workshop_dl::Error::OperationFailed("packer exploded".into()));
        }
        fs::write(output_path, "packed").map_err(Into::into)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// A content folder with a Lua file, a stray `.git` folder and a preview
fn addon_source(dir: &Path) -> (PathBuf, PathBuf) {
    let content = dir.join("my_addon");
    fs::create_dir_all(content.join("lua/autorun")).unwrap();
    fs::create_dir_all(content.join(".git")).unwrap();
    fs::write(content.join("lua/autorun/init.lua"), "print('hi')").unwrap();
    fs::write(content.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    let preview = dir.join("preview.jpg");
    fs::write(&preview, "jpg").unwrap();
    (content, preview)
}

fn gmod_request(content: &Path, preview: &Path) -> PublishRequest {
    let mut request = PublishRequest::new(
        AppId(4000),
        content,
        preview,
        "My Addon",
        "Does things",
        "Initial release",
    );
    request.steamcmd_username = Some("builder".into());
    request.tags = vec!["fun".into(), "build".into()];
    request
}

#[cfg(unix)]
#[tokio::test]
async fn gmod_folder_is_packed_and_uploaded_with_steamcmd() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.gmad_path = Some(fake_gmad(tools.path()));
    config.tools.steamcmd_path = Some(fake_steamcmd_publish(tools.path(), 3141592653));
    let workshop = Workshop::new(config).unwrap();

    let mut request = gmod_request(&content, &preview);
    let vdf_path = tools.path().join("item.vdf");
    request.vdf_path = Some(vdf_path.clone());

    let result = workshop
        .publish(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.app_id, AppId(4000));
    assert_eq!(result.published_file_id, PublishedFileId(3141592653));
    assert_eq!(result.vdf_path.as_deref(), Some(vdf_path.as_path()));

    // gmad saw a junk-free copy with a synthesized manifest.
    let listing = fs::read_to_string(tools.path().join("gmad_listing.txt")).unwrap();
    assert!(listing.contains("./lua/autorun/init.lua"));
    assert!(listing.contains("./addon.json"));
    assert!(!listing.contains(".git"));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tools.path().join("gmad_addon.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["title"], "My Addon");
    assert_eq!(manifest["type"], "ServerContent");
    assert_eq!(manifest["tags"], serde_json::json!(["fun", "build"]));

    let uploaded = fs::read_to_string(tools.path().join("uploaded.vdf")).unwrap();
    assert!(uploaded.starts_with("\"workshopitem\"\n{\n"));
    assert!(uploaded.contains("\t\"appid\"\t\t\"4000\"\n"));
    assert!(uploaded.contains("\t\"publishedfileid\"\t\t\"0\"\n"));
    assert!(uploaded.contains("\t\"tags\"\t\t\"fun,build\"\n"));

    // The user's folder is untouched and no scratch root survives.
    assert!(!content.join("addon.json").exists());
    assert!(sandbox.scratch_entries().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn missing_gma_packer_fails_and_cleans_up() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.steamcmd_path = Some(fake_steamcmd_publish(tools.path(), 1));
    let workshop = Workshop::new(config).unwrap();

    let err = workshop
        .publish(&gmod_request(&content, &preview), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "not_supported");
    assert!(err.to_string().contains("gmad"));
    assert!(sandbox.scratch_entries().is_empty());
    assert!(!tools.path().join("uploaded.vdf").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn failing_gmad_reports_exit_code_and_cleans_up() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.gmad_path = Some(failing_tool(tools.path(), "gmad", 3));
    config.tools.steamcmd_path = Some(fake_steamcmd_publish(tools.path(), 1));
    let workshop = Workshop::new(config).unwrap();

    let err = workshop
        .publish(&gmod_request(&content, &preview), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gmad failed with exit code 3"), "{err}");
    assert!(sandbox.scratch_entries().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn vpk_is_packed_from_a_clean_copy() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.steamcmd_path = Some(fake_steamcmd_publish(tools.path(), 77));
    let vpk = Arc::new(RecordingPacker::default());
    let workshop = Workshop::new(config)
        .unwrap()
        .with_packers(Arc::new(NoOpPacker::new("gmad")), vpk.clone());

    let mut request = gmod_request(&content, &preview);
    request.app_id = AppId(730);
    request.stage_clean_payload = true;
    request.pack_vpk = Some(workshop_dl::VpkOptions {
        include_md5_sections: true,
        ..Default::default()
    });

    let result = workshop
        .publish(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.published_file_id, PublishedFileId(77));

    let calls = vpk.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (files, output, format) = &calls[0];
    assert_eq!(files, &vec!["lua/autorun/init.lua".to_string()]);
    assert_eq!(output.file_name().unwrap(), "My Addon.vpk");
    match format {
        ContainerFormat::Vpk(options) => assert_eq!(options.version, 2),
        other => panic!("expected a VPK format, got {other:?}"),
    }

    let uploaded = fs::read_to_string(tools.path().join("uploaded.vdf")).unwrap();
    assert!(uploaded.contains("\t\"appid\"\t\t\"730\"\n"));
    assert!(sandbox.scratch_entries().is_empty());
}

#[tokio::test]
async fn helper_backend_without_helper_cleans_up_staging() {
    let sandbox = Sandbox::new();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.helper_path = Some(source.path().join("no-such-helper"));
    let gma = Arc::new(RecordingPacker::default());
    let workshop = Workshop::new(config)
        .unwrap()
        .with_packers(gma.clone(), Arc::new(NoOpPacker::new("vpk")));

    let mut request = gmod_request(&content, &preview);
    request.backend = PublishBackend::Helper;
    request.steamcmd_username = None;

    let err = workshop
        .publish(&request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "tool_not_found");
    assert_eq!(gma.calls.lock().unwrap().len(), 1);
    assert!(sandbox.scratch_entries().is_empty());
}

#[tokio::test]
async fn packer_failure_leaves_no_scratch_roots() {
    let sandbox = Sandbox::new();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let gma = Arc::new(RecordingPacker {
        fail: true,
        ..Default::default()
    });
    let workshop = Workshop::new(sandbox.config(UNUSED_DETAILS))
        .unwrap()
        .with_packers(gma, Arc::new(NoOpPacker::new("vpk")));

    let mut request = gmod_request(&content, &preview);
    request.backend = PublishBackend::Helper;

    let err = workshop
        .publish(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("packer exploded"));
    assert!(sandbox.scratch_entries().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn cancelling_during_upload_removes_scratch_roots() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());
    let started = tools.path().join("upload_started");

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.steamcmd_path = Some(hanging_steamcmd(tools.path(), &started));
    let gma = Arc::new(RecordingPacker::default());
    let workshop = Workshop::new(config)
        .unwrap()
        .with_packers(gma.clone(), Arc::new(NoOpPacker::new("vpk")));

    let mut request = gmod_request(&content, &preview);
    request.vdf_path = Some(tools.path().join("item.vdf"));
    let cancel = CancellationToken::new();

    let (result, staged_while_uploading) = tokio::join!(workshop.publish(&request, &cancel), async {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        while !started.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let staged = sandbox.scratch_entries().len();
        cancel.cancel();
        staged
    });

    let err = result.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(started.exists());
    assert_eq!(gma.calls.lock().unwrap().len(), 1);
    assert!(staged_while_uploading > 0);
    assert!(sandbox.scratch_entries().is_empty());
}

#[tokio::test]
async fn steamcmd_backend_requires_steamcmd_before_staging() {
    let sandbox = Sandbox::new();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());

    let gma = Arc::new(RecordingPacker::default());
    let workshop = Workshop::new(sandbox.config(UNUSED_DETAILS))
        .unwrap()
        .with_packers(gma.clone(), Arc::new(NoOpPacker::new("vpk")));

    let err = workshop
        .publish(&gmod_request(&content, &preview), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "tool_not_found");
    assert!(gma.calls.lock().unwrap().is_empty());
    assert!(sandbox.scratch_entries().is_empty());
}

#[tokio::test]
async fn loose_file_for_gmod_is_rejected() {
    let sandbox = Sandbox::new();
    let source = TempDir::new().unwrap();
    let (_content, preview) = addon_source(source.path());
    let loose = source.path().join("notes.txt");
    fs::write(&loose, "text").unwrap();

    let workshop = Workshop::new(sandbox.config(UNUSED_DETAILS)).unwrap();
    let mut request = gmod_request(&loose, &preview);
    request.backend = PublishBackend::Helper;

    let err = workshop
        .publish(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_input");
    assert!(err.to_string().contains("must be a folder or a .gma file"));
}

#[cfg(unix)]
#[tokio::test]
async fn incomplete_manifest_is_patched_in_the_staged_copy_only() {
    let sandbox = Sandbox::new();
    let tools = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    let (content, preview) = addon_source(source.path());
    let original = "{\"title\":\"Kept Title\",\"type\":\"weapon\"}";
    fs::write(content.join("addon.json"), original).unwrap();

    let mut config = sandbox.config(UNUSED_DETAILS);
    config.tools.gmad_path = Some(fake_gmad(tools.path()));
    config.tools.steamcmd_path = Some(fake_steamcmd_publish(tools.path(), 5));
    let workshop = Workshop::new(config).unwrap();

    workshop
        .publish(&gmod_request(&content, &preview), &CancellationToken::new())
        .await
        .unwrap();

    let packed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tools.path().join("gmad_addon.json")).unwrap())
            .unwrap();
    assert_eq!(packed["title"], "Kept Title");
    assert_eq!(packed["type"], "weapon");
    assert_eq!(packed["description"], "Does things");
    assert!(packed["ignore"].as_array().is_some_and(|patterns| !patterns.is_empty()));

    assert_eq!(fs::read_to_string(content.join("addon.json")).unwrap(), original);
    assert!(sandbox.scratch_entries().is_empty());
}
