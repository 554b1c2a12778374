use std::env;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use governor::Quota;
use log::warn;

pub const USER_AGENT: &str = concat!("factorio-serverlist-", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct Config {
    // Upstream matchmaking API
    pub upstream_url: String,
    pub username: String,
    pub token: String,
    pub request_timeout_secs: u64,
    pub fetch_max_attempts: u32,
    pub fetch_backoff_ms: u64,

    // Refresh policy
    pub refresh_interval_secs: u64,
    pub retry_cooldown_secs: u64,
    pub background_refresh_secs: u64,
    pub min_valid_count: usize,

    // Cache
    pub cache_file: PathBuf,

    // Query
    pub items_per_page: usize,

    // Rate limiting configs
    pub server_list_period_secs: u64,
    pub server_list_burst_limit: u32,
    pub limiter_purge_secs: u64,

    // Peers whose X-Forwarded-For header is believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: "https://multiplayer.factorio.com".to_string(),
            username: String::new(),
            token: String::new(),
            request_timeout_secs: 5,
            fetch_max_attempts: 2,
            fetch_backoff_ms: 500,
            refresh_interval_secs: 300, // 5 minutes
            retry_cooldown_secs: 15,
            background_refresh_secs: 3 * 60 * 60,
            // Fewer results than this means the upstream data is incomplete or corrupt
            min_valid_count: 25,
            cache_file: PathBuf::from("data/cache.json"),
            items_per_page: 25,
            server_list_period_secs: 1,
            server_list_burst_limit: 30,
            limiter_purge_secs: 60,
            trusted_proxies: Vec::new(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma separated addresses; entries that do not parse are skipped with a warning.
fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!("Ignoring invalid TRUSTED_PROXIES entry: {}", entry);
                None
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            username: env::var("MATCHMAKING_USERNAME").unwrap_or_default(),
            token: env::var("MATCHMAKING_TOKEN").unwrap_or_default(),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            fetch_max_attempts: env_or("FETCH_MAX_ATTEMPTS", defaults.fetch_max_attempts),
            fetch_backoff_ms: env_or("FETCH_BACKOFF_MS", defaults.fetch_backoff_ms),
            refresh_interval_secs: env_or("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs),
            retry_cooldown_secs: env_or("RETRY_COOLDOWN_SECS", defaults.retry_cooldown_secs),
            background_refresh_secs: env_or(
                "BACKGROUND_REFRESH_SECS",
                defaults.background_refresh_secs,
            ),
            min_valid_count: env_or("MIN_VALID_COUNT", defaults.min_valid_count),
            cache_file: env::var("CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_file),
            items_per_page: env_or("ITEMS_PER_PAGE", defaults.items_per_page).max(1),
            server_list_period_secs: env_or(
                "SERVER_LIST_PERIOD_SECS",
                defaults.server_list_period_secs,
            ),
            server_list_burst_limit: env_or(
                "SERVER_LIST_BURST_LIMIT",
                defaults.server_list_burst_limit,
            ),
            limiter_purge_secs: env_or("LIMITER_PURGE_SECS", defaults.limiter_purge_secs),
            trusted_proxies: env::var("TRUSTED_PROXIES")
                .map(|raw| parse_ip_list(&raw))
                .unwrap_or(defaults.trusted_proxies),
        }
    }

    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        self.trusted_proxies.contains(&peer)
    }

    pub fn limiter_purge(&self) -> Duration {
        Duration::from_secs(self.limiter_purge_secs.max(1))
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.token.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    pub fn background_refresh(&self) -> Duration {
        Duration::from_secs(self.background_refresh_secs)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    pub fn server_list_quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.server_list_burst_limit).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(Duration::from_secs(self.server_list_period_secs))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}
