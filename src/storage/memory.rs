// src/storage/memory.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use log::{debug, warn};
use parking_lot::Mutex;
use crate::config::Config;
use crate::models::server::{ServerRecord, VersionCount};
use crate::query::{sort_servers, SortBy};

/// The server list as it stood after one accepted refresh.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub servers: Vec<ServerRecord>,
    pub versions: Vec<VersionCount>,
    pub player_count: usize,
    pub captured_at: Option<SystemTime>,
}

impl Snapshot {
    pub fn new(mut servers: Vec<ServerRecord>, captured_at: Option<SystemTime>) -> Self {
        sort_servers(&mut servers, SortBy::Players);
        let versions = version_counts(&servers);
        let player_count = servers.iter().map(ServerRecord::player_count).sum();
        Self {
            servers,
            versions,
            player_count,
            captured_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshState {
    pub last_success: Option<Instant>,
    pub last_attempt: Option<Instant>,
}

impl RefreshState {
    fn elapsed(since: Option<Instant>, now: Instant, bound: Duration) -> bool {
        since.map_or(true, |t| now.saturating_duration_since(t) >= bound)
    }

    pub fn is_due(&self, now: Instant, refresh_interval: Duration, retry_cooldown: Duration) -> bool {
        Self::elapsed(self.last_success, now, refresh_interval)
            && Self::elapsed(self.last_attempt, now, retry_cooldown)
    }
}

struct Inner {
    snapshot: Arc<Snapshot>,
    refresh: RefreshState,
    fetching: bool,
}

pub struct ServerStorage {
    inner: Mutex<Inner>,
    config: Config,
}

impl ServerStorage {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: Arc::new(Snapshot::default()),
                refresh: RefreshState::default(),
                fetching: false,
            }),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.lock().snapshot)
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.inner.lock().refresh
    }

    /// Installs a list read from the disk cache at startup.
    ///
    /// Lists at or below the validity threshold are ignored. The cache's
    /// write time counts as the last successful refresh.
    pub fn restore(&self, servers: Vec<ServerRecord>, captured_at: Option<SystemTime>) -> bool {
        if servers.len() <= self.config.min_valid_count {
            warn!(
                "Cached list has only {} servers (need more than {}), ignoring it",
                servers.len(),
                self.config.min_valid_count
            );
            return false;
        }

        let age = captured_at
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .unwrap_or_default();
        let snapshot = Arc::new(Snapshot::new(servers, captured_at));

        let mut inner = self.inner.lock();
        inner.refresh.last_success = Instant::now().checked_sub(age);
        inner.snapshot = snapshot;
        true
    }

    /// Claims the right to fetch, if the refresh policy allows one now.
    ///
    /// At most one claim exists at a time. The attempt is stamped here, before
    /// any network traffic, so slow fetches still throttle other callers.
    pub fn try_claim_refresh(&self) -> Option<RefreshClaim<'_>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.fetching {
            debug!("Refresh already in flight");
            return None;
        }
        if !inner.refresh.is_due(now, self.config.refresh_interval(), self.config.retry_cooldown()) {
            return None;
        }

        inner.refresh.last_attempt = Some(now);
        inner.fetching = true;
        Some(RefreshClaim { storage: self })
    }
}

/// Exclusive right to fetch and install a new list. Dropping it ends the
/// refresh, whatever its outcome.
pub struct RefreshClaim<'a> {
    storage: &'a ServerStorage,
}

/// What happened to a fetched list.
#[derive(Debug)]
pub enum InstallOutcome {
    Installed(Arc<Snapshot>),
    Discarded { count: usize },
}

impl RefreshClaim<'_> {
    /// Records a completed fetch and swaps the list in if it is large enough.
    pub fn install(&self, servers: Vec<ServerRecord>) -> InstallOutcome {
        let now = Instant::now();
        let min_valid = self.storage.config.min_valid_count;

        if servers.len() <= min_valid {
            self.storage.inner.lock().refresh.last_success = Some(now);
            return InstallOutcome::Discarded { count: servers.len() };
        }

        // Built before taking the lock so readers never wait on the sort.
        let snapshot = Arc::new(Snapshot::new(servers, Some(SystemTime::now())));

        let mut inner = self.storage.inner.lock();
        inner.refresh.last_success = Some(now);
        inner.snapshot = Arc::clone(&snapshot);
        InstallOutcome::Installed(snapshot)
    }
}

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        self.storage.inner.lock().fetching = false;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct SemVer(u64, u64, u64);

fn parse_version(input: &str) -> SemVer {
    let parts: Vec<&str> = input.split('.').collect();
    if parts.len() != 3 {
        return SemVer::default();
    }
    let num = |s: &str| s.trim().parse::<u64>().unwrap_or(0);
    SemVer(num(parts[0]), num(parts[1]), num(parts[2]))
}

/// Servers per game version, most popular first, then newest first.
pub fn version_counts(servers: &[ServerRecord]) -> Vec<VersionCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for server in servers {
        *counts.entry(server.info.application_version.game_version.as_str()).or_default() += 1;
    }

    let mut list: Vec<VersionCount> = counts
        .into_iter()
        .map(|(version, count)| VersionCount {
            version: version.to_string(),
            count,
        })
        .collect();

    list.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| parse_version(&b.version).cmp(&parse_version(&a.version)))
            .then_with(|| a.version.cmp(&b.version))
    });
    list
}
