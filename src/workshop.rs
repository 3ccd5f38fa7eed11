//! The [`Workshop`] facade owning every long-lived dependency

use crate::cache::CacheLocator;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::helper::HelperClient;
use crate::metadata::DetailsClient;
use crate::progress::EventSink;
use crate::publish::{ContainerPacker, GmadPacker, NoOpPacker, VpkToolPacker};
use crate::session::PromptResolver;
use crate::types::{AppId, DownloadRequest, Event, ListResult, PublishedFileId, QuotaResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Workshop content downloader and publisher
///
/// Construct once with [`Workshop::new`] and reuse it for every operation;
/// it holds the shared HTTP client, the metadata client, the cache locator,
/// the helper client and the container packers. Operations report output
/// lines and progress through [`Workshop::subscribe`].
#[derive(Clone)]
pub struct Workshop {
    pub(crate) config: Arc<Config>,
    pub(crate) events: EventSink,
    pub(crate) http: reqwest::Client,
    pub(crate) details: DetailsClient,
    pub(crate) cache: CacheLocator,
    pub(crate) helper: Arc<HelperClient>,
    pub(crate) prompts: Option<PromptResolver>,
    /// GMA packer (trait object so tests and callers can substitute one)
    pub(crate) gma_packer: Arc<dyn ContainerPacker>,
    /// VPK packer
    pub(crate) vpk_packer: Arc<dyn ContainerPacker>,
}

impl std::fmt::Debug for Workshop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workshop")
            .field("config", &self.config)
            .field("gma_packer", &self.gma_packer.name())
            .field("vpk_packer", &self.vpk_packer.name())
            .field("prompts", &self.prompts.is_some())
            .finish_non_exhaustive()
    }
}

impl Workshop {
    /// Create a new instance from `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is invalid and
    /// [`Error::Network`] when the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let events = EventSink::new(event_tx);

        let http = reqwest::Client::builder()
            .user_agent(concat!("workshop-dl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let details = DetailsClient::new(
            http.clone(),
            config.network.details_endpoint.clone(),
            config.network.details_timeout,
        );
        let cache = CacheLocator::new(config.download.library_roots.clone());
        let helper = Arc::new(HelperClient::new(
            config.tools.helper_path.clone(),
            events.clone(),
        ));

        let gma_packer: Arc<dyn ContainerPacker> = match GmadPacker::from_config(&config.tools) {
            Some(packer) => Arc::new(packer),
            None => Arc::new(NoOpPacker::new("gmad")),
        };
        let vpk_packer: Arc<dyn ContainerPacker> = match VpkToolPacker::from_config(&config.tools)
        {
            Some(packer) => Arc::new(packer),
            None => Arc::new(NoOpPacker::new("vpk")),
        };
        tracing::info!(
            gma_packer = gma_packer.name(),
            vpk_packer = vpk_packer.name(),
            library_roots = config.download.library_roots.len(),
            "workshop client initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            events,
            http,
            details,
            cache,
            helper,
            prompts: None,
            gma_packer,
            vpk_packer,
        })
    }

    /// Receive output lines and progress for every subsequent operation
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer SteamCMD credential prompts through `resolver`
    ///
    /// Without a resolver, SteamCMD runs unattended and prompts go unanswered.
    pub fn with_prompt_resolver(mut self, resolver: PromptResolver) -> Self {
        self.prompts = Some(resolver);
        self
    }

    /// Use `helper` instead of the helper resolved from configuration
    pub fn with_helper(mut self, helper: HelperClient) -> Self {
        self.helper = Arc::new(helper);
        self
    }

    /// Replace the container packers
    pub fn with_packers(
        mut self,
        gma_packer: Arc<dyn ContainerPacker>,
        vpk_packer: Arc<dyn ContainerPacker>,
    ) -> Self {
        self.gma_packer = gma_packer;
        self.vpk_packer = vpk_packer;
        self
    }

    /// The event sink operations report through
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// A download request carrying the configured defaults
    pub fn download_request(
        &self,
        id_or_link: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> DownloadRequest {
        let defaults = &self.config.download;
        let mut request = DownloadRequest::new(id_or_link, output_dir);
        request.app_id = defaults.default_app_id;
        request.convert_payload = defaults.convert_payloads;
        request.overwrite = defaults.overwrite_existing;
        request.naming = defaults.naming;
        request.steamcmd_username = self.config.tools.steamcmd_username.clone();
        request
    }

    /// Delete a published item through the helper
    pub async fn delete(
        &self,
        app_id: AppId,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        require_app(app_id)?;
        if published_file_id.is_unset() {
            return Err(Error::invalid("published file id is required"));
        }
        tracing::info!(%app_id, %published_file_id, "deleting workshop item");
        self.helper.delete(app_id, published_file_id, cancel).await
    }

    /// One page (1-based) of the caller's published items, through the helper
    pub async fn list_published(
        &self,
        app_id: AppId,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<ListResult> {
        require_app(app_id)?;
        self.helper.list(app_id, page, cancel).await
    }

    /// Cloud storage quota for `app_id`, through the helper
    pub async fn quota(&self, app_id: AppId, cancel: &CancellationToken) -> Result<QuotaResult> {
        require_app(app_id)?;
        self.helper.quota(app_id, cancel).await
    }
}

fn require_app(app_id: AppId) -> Result<()> {
    if app_id.is_unset() {
        Err(Error::invalid("app id is required"))
    } else {
        Ok(())
    }
}
