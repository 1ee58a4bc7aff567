use std::{fmt, sync::Arc};

use anyhow::Context;
use goesview_core::{
    ChannelTable, DirectoryIndexer, ExtensionSet, ImageRenderer, Reconciler, Renderer, ScanObserver,
    ScanReport, SourceRoot, ThumbnailCache, start_queue,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub indexer: DirectoryIndexer,
    pub cache: ThumbnailCache,
    pub channels: Arc<ChannelTable>,
    pub reconciler: Arc<Reconciler>,
    /// Cancelled once on shutdown; background loops watch it.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("source_root", &self.config.source_root)
            .field("cache_dir", &self.cache.cache_dir())
            .finish_non_exhaustive()
    }
}

/// Reload the channel table whenever a reconciliation pass completes.
#[derive(Debug)]
struct ReloadChannelsAfterScan {
    channels: Arc<ChannelTable>,
}

impl ScanObserver for ReloadChannelsAfterScan {
    fn scan_finished(&self, _report: &ScanReport) {
        let channels = Arc::clone(&self.channels);
        tokio::spawn(async move { channels.reload_or_keep().await });
    }
}

impl AppState {
    /// Wire the core services for `config` with the production image renderer.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let renderer = Arc::new(ImageRenderer::from_config(&config.preview));
        Self::build_with_renderer(config, renderer).await
    }

    /// Same as [`build`](Self::build) with a caller-supplied renderer.
    pub async fn build_with_renderer(
        config: Config,
        renderer: Arc<dyn Renderer>,
    ) -> anyhow::Result<Self> {
        let root = SourceRoot::new(&config.source_root).context("source root is not readable")?;
        let queue = start_queue(&config.preview, renderer).context("failed to start render workers")?;
        let cache = ThumbnailCache::open(root.clone(), &config.cache_dir, queue)
            .await
            .context("failed to open thumbnail cache")?;
        let indexer = DirectoryIndexer::new(root, ExtensionSet::new(&config.preview.extensions));

        let channels = match ChannelTable::load(&config.channel_map).await {
            Ok(table) => {
                info!(path = %config.channel_map.display(), channels = table.len(), "channel table loaded");
                table
            }
            Err(err) => {
                warn!(error = %err, "starting with an empty channel table");
                ChannelTable::empty(&config.channel_map)
            }
        };
        let channels = Arc::new(channels);

        let reconciler = Reconciler::new(indexer.clone(), cache.clone()).with_observer(Arc::new(
            ReloadChannelsAfterScan {
                channels: Arc::clone(&channels),
            },
        ));

        Ok(Self {
            config: Arc::new(config),
            indexer,
            cache,
            channels,
            reconciler: Arc::new(reconciler),
            shutdown: CancellationToken::new(),
        })
    }

    /// Stop background loops and discard queued renders.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
        self.cache.queue().shutdown();
    }
}
