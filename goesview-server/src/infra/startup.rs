use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::infra::app_state::AppState;

/// Work run once the state is wired and before the listener accepts requests.
#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Starts the reconciliation loop (first pass immediately) and the periodic
/// channel table reload.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        let scan_interval = state.config.preview.scan_interval();
        info!(interval_secs = scan_interval.as_secs(), "starting reconciliation loop");
        let reconciler = state.reconciler.clone();
        let cancel = state.shutdown.clone();
        tokio::spawn(async move { reconciler.run(scan_interval, cancel).await });

        spawn_channel_reload(state, state.config.channel_reload_interval());
        Ok(())
    }
}

/// Leaves every background loop off; used by tests that drive the core directly.
#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}

fn spawn_channel_reload(state: &AppState, every: Duration) {
    let channels = state.channels.clone();
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The table was loaded while building the state.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => channels.reload_or_keep().await,
            }
        }
        debug!("channel reload loop stopped");
    });
}
