// src/refresh.rs
use std::sync::Arc;
use log::{error, info, warn};
use crate::fetch::ServerSource;
use crate::normalize::normalize_all;
use crate::storage::cache;
use crate::storage::memory::{InstallOutcome, ServerStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Cooldowns not yet passed, or another refresh is running.
    Skipped,
    Failed,
    Discarded { count: usize },
    Installed { count: usize },
}

/// Runs the refresh policy against one upstream source.
///
/// Request handlers and the background timer share a single `Refresher`, so
/// they also share its throttle.
pub struct Refresher<S> {
    storage: Arc<ServerStorage>,
    source: S,
}

impl<S: ServerSource> Refresher<S> {
    pub fn new(storage: Arc<ServerStorage>, source: S) -> Self {
        Self { storage, source }
    }

    pub fn storage(&self) -> &ServerStorage {
        &self.storage
    }

    pub async fn refresh_if_due(&self) -> RefreshOutcome {
        let claim = match self.storage.try_claim_refresh() {
            Some(claim) => claim,
            None => return RefreshOutcome::Skipped,
        };

        let list = match self.source.fetch().await {
            Ok(list) => list,
            Err(e) => {
                error!("Failed to fetch server list, keeping previous list: {}", e);
                return RefreshOutcome::Failed;
            }
        };

        let servers = normalize_all(list);
        info!("Fetched {} servers", servers.len());

        match claim.install(servers) {
            InstallOutcome::Discarded { count } => {
                warn!(
                    "Discarding fetched list of {} servers (need more than {})",
                    count,
                    self.storage.config().min_valid_count
                );
                RefreshOutcome::Discarded { count }
            }
            InstallOutcome::Installed(snapshot) => {
                if let Err(e) = cache::save(&self.storage.config().cache_file, &snapshot.servers) {
                    error!("Failed to write server cache: {}", e);
                }
                RefreshOutcome::Installed {
                    count: snapshot.servers.len(),
                }
            }
        }
    }

    /// Refreshes on a fixed, slow timer for as long as the process runs.
    pub async fn run_background(self: Arc<Self>) {
        let period = self.storage.config().background_refresh();
        info!("Background refresh every {:?}", period);
        loop {
            tokio::time::sleep(period).await;
            self.refresh_if_due().await;
        }
    }
}
