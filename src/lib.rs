//! # workshop-dl
//!
//! Backend library for acquiring and publishing Steam Workshop content.
//!
//! ## Design Philosophy
//!
//! workshop-dl is designed to be:
//! - **Cache first** - Items already present in a local library are copied, never re-downloaded
//! - **Backend agnostic** - Direct HTTP, a structured helper process and SteamCMD are tried in order
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to output lines and progress, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use workshop_dl::{Config, Workshop};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.library_roots = vec!["/home/me/.steam/steam".into()];
//!
//!     let workshop = Workshop::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = workshop.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let cancel = CancellationToken::new();
//!     workshop_dl::cancel_on_shutdown_signal(cancel.clone());
//!
//!     let request = workshop.download_request(
//!         "https://steamcommunity.com/sharedfiles/filedetails/?id=123456789",
//!         "downloads",
//!     );
//!     let result = workshop.download(&request, &cancel).await?;
//!     println!("saved to {}", result.output_path.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Download orchestration and payload handling
pub mod acquire;
/// Local library cache lookup
pub mod cache;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Structured helper process client
pub mod helper;
/// Workshop item id parsing
pub mod ids;
/// Published file details lookup
pub mod metadata;
/// Output file naming
pub mod naming;
/// External tool process plumbing
pub mod process;
/// Event and progress reporting
pub mod progress;
/// Publish pipeline: staging, manifests, packing
pub mod publish;
/// Interactive tool sessions and credential prompts
pub mod session;
/// SteamCMD driver
pub mod steamcmd;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// The client facade
pub mod workshop;

// Re-export commonly used types
pub use config::{
    Config, DownloadConfig, NamingOptions, NetworkConfig, PromptConfig, PublishConfig, ToolsConfig,
};
pub use error::{Error, Result};
pub use helper::{HelperClient, HelperDownload};
pub use ids::parse_published_file_id;
pub use progress::{EventSink, ProgressReporter};
pub use publish::{
    ContainerFormat, ContainerPacker, GmadPacker, NoOpPacker, StagedPayload, VpkToolPacker,
};
pub use session::{Prompt, PromptKind, PromptLimits, PromptRequest, PromptResolver, prompt_channel};
pub use types::{
    AppId, DownloadRequest, Event, ItemDetails, ListResult, OutputKind, PublishBackend,
    PublishRequest, PublishResult, PublishedFileId, PublishedItem, QuotaResult, TransferResult,
    Visibility, VpkOptions,
};
pub use workshop::Workshop;

/// Cancel `token` when the process receives a termination signal
///
/// Spawns a task that waits for the signal; in-flight operations observing
/// the token then stop their external tools and clean up scratch space.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a tokio runtime.
pub fn cancel_on_shutdown_signal(
    token: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
