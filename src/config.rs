use crate::cache::DEFAULT_FRESHNESS_WINDOW;
use clap::Parser;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Parser)]
#[command(name = "dns-cache")]
#[command(version)]
#[command(about = "Caching DNS forwarder for A and NS queries")]
pub struct Config {
    /// Address to answer queries on
    #[arg(short = 'l', long, default_value = "127.0.0.1:53")]
    pub listen: String,

    /// Upstream resolver queries are forwarded to
    #[arg(short = 'u', long, default_value = "8.8.8.8:53")]
    pub upstream: String,

    /// Directory holding one cache file per domain
    #[arg(long, value_name = "DIR", default_value = "infos")]
    pub cache_dir: PathBuf,

    /// How long to wait for each upstream reply
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Upstream attempts per query, including the first
    #[arg(long, default_value_t = 2)]
    pub attempts: u32,

    /// Delay before the first retry, doubled for each one after
    #[arg(long, default_value_t = 100)]
    pub backoff_ms: u64,

    /// Queries handled at once, further datagrams are dropped
    #[arg(long, default_value_t = 256)]
    pub max_inflight: usize,

    /// Seconds a cached domain is served before it is fetched again
    #[arg(long, default_value_t = DEFAULT_FRESHNESS_WINDOW)]
    pub freshness_window: u32,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["dns-cache"]);

        assert_eq!(config.listen, "127.0.0.1:53");
        assert_eq!(config.upstream, "8.8.8.8:53");
        assert_eq!(config.cache_dir, PathBuf::from("infos"));
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.attempts, 2);
        assert_eq!(config.backoff(), Duration::from_millis(100));
        assert_eq!(config.max_inflight, 256);
        assert_eq!(config.freshness_window, 360);
    }

    #[test]
    fn overrides() {
        let config = Config::parse_from([
            "dns-cache",
            "--listen",
            "0.0.0.0:5353",
            "--upstream",
            "1.1.1.1:53",
            "--cache-dir",
            "/var/cache/dns",
            "--attempts",
            "1",
            "--freshness-window",
            "60",
        ]);

        assert_eq!(config.listen, "0.0.0.0:5353");
        assert_eq!(config.upstream, "1.1.1.1:53");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/dns"));
        assert_eq!(config.attempts, 1);
        assert_eq!(config.freshness_window, 60);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
