//! Library layouts, payload generators and details endpoint mocks

use serde_json::{Value, json};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workshop_dl::{Config, Event};

/// A temporary Steam library plus an output directory
pub struct Sandbox {
    pub library: TempDir,
    pub output: TempDir,
    pub scratch: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            library: TempDir::new().expect("library dir"),
            output: TempDir::new().expect("output dir"),
            scratch: TempDir::new().expect("scratch dir"),
        }
    }

    /// Create `<library>/steamapps/workshop/content/<app>/<id>` and return it
    pub fn cached_item(&self, app_id: u32, published_file_id: u64) -> PathBuf {
        let dir = self
            .library
            .path()
            .join("steamapps/workshop/content")
            .join(app_id.to_string())
            .join(published_file_id.to_string());
        std::fs::create_dir_all(&dir).expect("create cached item");
        dir
    }

    /// Offline config over this sandbox: no PATH search, details at `details_endpoint`
    pub fn config(&self, details_endpoint: &str) -> Config {
        let mut config = Config::default();
        config.download.library_roots = vec![self.library.path().to_path_buf()];
        config.network.details_endpoint = details_endpoint.to_string();
        config.network.details_timeout = Duration::from_secs(5);
        config.network.download_timeout = Duration::from_secs(10);
        config.tools.search_path = false;
        config.publish.scratch_dir = self.scratch.path().to_path_buf();
        config
    }

    /// Entries left in the scratch directory
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.scratch.path())
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }
}

/// `GetPublishedFileDetails` body for one item
pub fn details_body(title: &str, consumer_app_id: u32, file_url: Option<&str>, file_name: Option<&str>) -> Value {
    json!({
        "response": {
            "result": 1,
            "resultcount": 1,
            "publishedfiledetails": [{
                "result": 1,
                "title": title,
                "consumer_app_id": consumer_app_id,
                "time_updated": 1_700_000_000,
                "file_url": file_url.unwrap_or(""),
                "filename": file_name.unwrap_or(""),
                "file_size": 0,
            }]
        }
    })
}

/// Mount a details endpoint at `/details` that must be hit exactly `times` times
pub async fn mount_details(server: &MockServer, body: Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

/// Mount a static file at `route`
pub async fn mount_file(server: &MockServer, route: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .expect(1)
        .mount(server)
        .await;
}

/// A zip archive holding `entries` (name, contents)
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .expect("start zip entry");
        writer.write_all(contents.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A minimal GMA body (magic plus filler)
pub fn gma_bytes(filler: &str) -> Vec<u8> {
    let mut bytes = b"GMAD\x03".to_vec();
    bytes.extend_from_slice(filler.as_bytes());
    bytes
}

/// `data` compressed in the LZMA-alone format
pub fn lzma_bytes(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::new();
    lzma_rs::lzma_compress(&mut Cursor::new(data), &mut output).expect("lzma compress");
    output
}

/// Drain every event currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Progress messages among `events`
pub fn progress_messages(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress {
                message: Some(message),
                ..
            } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Every file below `root`, relative and sorted
pub fn relative_files(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
