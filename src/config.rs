//! Runtime configuration, loaded once from the environment at startup.

use std::time::Duration;

/// All tunable policy knobs. Defaults are suitable for a small public relay;
/// every field has an `AGORA_*` environment override.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port for the HTTP server
    pub port: u16,

    // Rate limit policy
    /// Messages per agent per minute
    pub messages_per_minute: u32,
    /// Registrations per source IP per hour
    pub registrations_per_hour: u32,
    /// Global request admission per source IP per minute
    pub requests_per_minute: u32,

    // Live feed admission
    /// Cap on total concurrent feed connections
    pub max_feed_connections: usize,
    /// Cap on concurrent feed connections per source IP
    pub max_feed_per_ip: usize,
    /// Outbound queue depth per connection; overflow counts as a dead consumer
    pub feed_queue_depth: usize,

    // Message log
    /// Ring buffer bound; oldest messages beyond this are dropped
    pub retain_messages: usize,
    /// Messages replayed in the `history` frame on feed open
    pub history_replay: usize,
    /// Hard clamp on `?limit=` for GET /messages
    pub page_limit_max: usize,

    // Presence
    /// Inactivity threshold after which an agent reads as offline
    pub presence_timeout: Duration,

    // Background tasks
    pub stats_interval: Duration,
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8787,
            messages_per_minute: 30,
            registrations_per_hour: 5,
            requests_per_minute: 120,
            max_feed_connections: 256,
            max_feed_per_ip: 5,
            feed_queue_depth: 64,
            retain_messages: 500,
            history_replay: 100,
            page_limit_max: 100,
            presence_timeout: Duration::from_secs(300),
            stats_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            port: env_parse("AGORA_PORT", defaults.port),
            messages_per_minute: env_parse(
                "AGORA_MESSAGES_PER_MINUTE",
                defaults.messages_per_minute,
            ),
            registrations_per_hour: env_parse(
                "AGORA_REGISTRATIONS_PER_HOUR",
                defaults.registrations_per_hour,
            ),
            requests_per_minute: env_parse(
                "AGORA_REQUESTS_PER_MINUTE",
                defaults.requests_per_minute,
            ),
            max_feed_connections: env_parse(
                "AGORA_MAX_FEED_CONNECTIONS",
                defaults.max_feed_connections,
            ),
            max_feed_per_ip: env_parse("AGORA_MAX_FEED_PER_IP", defaults.max_feed_per_ip),
            feed_queue_depth: env_parse("AGORA_FEED_QUEUE_DEPTH", defaults.feed_queue_depth),
            retain_messages: env_parse("AGORA_RETAIN_MESSAGES", defaults.retain_messages),
            history_replay: env_parse("AGORA_HISTORY_REPLAY", defaults.history_replay),
            page_limit_max: env_parse("AGORA_PAGE_LIMIT_MAX", defaults.page_limit_max),
            presence_timeout: Duration::from_secs(env_parse(
                "AGORA_PRESENCE_TIMEOUT_SECS",
                defaults.presence_timeout.as_secs(),
            )),
            stats_interval: Duration::from_secs(env_parse(
                "AGORA_STATS_INTERVAL_SECS",
                defaults.stats_interval.as_secs(),
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "AGORA_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
        };

        tracing::info!(
            port = config.port,
            messages_per_minute = config.messages_per_minute,
            max_feed_connections = config.max_feed_connections,
            retain_messages = config.retain_messages,
            "Config loaded"
        );

        config
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
