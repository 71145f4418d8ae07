use clap::Parser;
use dns_cache::cache::{CacheStore, PersistError, RecordCache};
use dns_cache::config::Config;
use dns_cache::resolver::{caching::CachingResolver, retry::Retry, stub::UdpForwarder, timeout::Timeout};
use dns_cache::server::Server;
use std::{error::Error, sync::Arc};
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // install global collector configured based on RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    let cache = Arc::new(RecordCache::load(CacheStore::open(&config.cache_dir)?)?);

    let forwarder = UdpForwarder::new(config.upstream.as_str())?;
    info!(upstream = %forwarder.target(), "Forwarding to upstream");
    let forwarder = Retry::new(
        Timeout::new(forwarder, config.timeout()),
        config.attempts,
        config.backoff(),
    );
    let resolver = CachingResolver::new(Arc::clone(&cache), forwarder, config.freshness_window);

    let socket = UdpSocket::bind(&config.listen).await?;
    let server = Server::new(socket, resolver, config.max_inflight);
    info!(listen = %server.local_addr()?, "Serving queries");

    tokio::select! {
        result = server.run() => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    let flushed = tokio::task::spawn_blocking(move || cache.flush())
        .await
        .map_err(PersistError::from)
        .and_then(|result| result);
    if let Err(err) = flushed {
        warn!(%err, "Failed to flush cache");
    }

    Ok(())
}
