//! External tool discovery through explicit paths and PATH
//!
//! These tests rewrite `PATH` and therefore run serially.

#![cfg(unix)]

mod common;

use common::*;
use serial_test::serial;
use std::ffi::OsString;
use tempfile::TempDir;
use workshop_dl::config::ToolsConfig;
use workshop_dl::steamcmd::locate_steamcmd;
use workshop_dl::{Config, GmadPacker, VpkToolPacker, Workshop};

/// Restores `PATH` when dropped
struct PathGuard(Option<OsString>);

impl PathGuard {
    fn set(dir: &std::path::Path) -> Self {
        let previous = std::env::var_os("PATH");
        // SAFETY: callers are #[serial], so no other test thread reads the environment concurrently.
        unsafe { std::env::set_var("PATH", dir) };
        Self(previous)
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        // SAFETY: see PathGuard::set.
        unsafe {
            match self.0.take() {
                Some(path) => std::env::set_var("PATH", path),
                None => std::env::remove_var("PATH"),
            }
        }
    }
}

#[test]
#[serial]
fn tools_are_found_on_path() {
    let tools = TempDir::new().unwrap();
    write_script(tools.path(), "steamcmd", "exit 0");
    write_script(tools.path(), "gmad", "exit 0");
    write_script(tools.path(), "vpk", "exit 0");
    let _guard = PathGuard::set(tools.path());

    let config = ToolsConfig {
        search_path: true,
        ..Default::default()
    };
    assert_eq!(locate_steamcmd(&config), Some(tools.path().join("steamcmd")));
    assert!(GmadPacker::from_config(&config).is_some());
    assert!(VpkToolPacker::from_config(&config).is_some());

    let mut full = Config::default();
    full.tools = config;
    let workshop = Workshop::new(full).unwrap();
    let debug = format!("{workshop:?}");
    assert!(debug.contains("cli-gmad"));
    assert!(debug.contains("cli-vpk"));
}

#[test]
#[serial]
fn path_is_ignored_when_search_is_off() {
    let tools = TempDir::new().unwrap();
    write_script(tools.path(), "steamcmd", "exit 0");
    let _guard = PathGuard::set(tools.path());

    let config = ToolsConfig {
        search_path: false,
        ..Default::default()
    };
    assert_eq!(locate_steamcmd(&config), None);
    assert!(GmadPacker::from_config(&config).is_none());
}

#[test]
#[serial]
fn explicit_directory_override_finds_named_binary() {
    let tools = TempDir::new().unwrap();
    let script = write_script(tools.path(), "steamcmd.sh", "exit 0");
    let _guard = PathGuard::set(&tools.path().join("empty"));

    let config = ToolsConfig {
        steamcmd_path: Some(tools.path().to_path_buf()),
        search_path: false,
        ..Default::default()
    };
    assert_eq!(locate_steamcmd(&config), Some(script));
}
