//! Entrypoint for the lakecat catalog server
use std::{sync::Arc, time::Duration};

use lakecat_cache::{CacheConfigError, CachingCatalog};
use lakecat_catalog::{Catalog, MemCatalog};
use lakecat_clap_blocks::{
    cache::CacheConfig,
    object_store::{ObjectStoreConfig, ParseError},
    socket_addr::SocketAddr,
};
use lakecat_server::{CatalogService, ServiceConfig, serve};
use lakecat_time::{SystemProvider, TimeProvider};
use lakecat_types::DEFAULT_PREFIX;
use object_store::path::Path;
use secrecy::Secret;
use thiserror::Error;
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::common::KeyValue;
use crate::logging::LoggingConfig;

/// The default bind address for the HTTP API.
pub(crate) const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8181";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("Cannot parse object store config: {0}")]
    ObjectStoreParsing(#[from] ParseError),

    #[error("Invalid cache config: {0}")]
    CacheConfig(#[from] CacheConfigError),

    #[error("--cache-clean-up-interval must be greater than 0")]
    ZeroCleanUpInterval,

    #[error("Failed to bind address")]
    BindAddress(#[source] std::io::Error),

    #[error("Server error: {0}")]
    Server(#[from] lakecat_server::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// object store options
    #[clap(flatten)]
    object_store_config: ObjectStoreConfig,

    /// catalog cache options
    #[clap(flatten)]
    cache_config: CacheConfig,

    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// The address on which lakecat will serve HTTP API requests
    #[clap(
        long = "http-bind",
        env = "LAKECAT_HTTP_BIND_ADDR",
        default_value = DEFAULT_HTTP_BIND_ADDR,
        action,
    )]
    http_bind_address: SocketAddr,

    /// Maximum size of HTTP request bodies.
    #[clap(
        long = "max-http-request-size",
        env = "LAKECAT_MAX_HTTP_REQUEST_SIZE",
        default_value = "10485760", // 10 MiB
        action,
    )]
    max_http_request_size: usize,

    /// Bearer token every request must present
    #[clap(long = "bearer-token", env = "LAKECAT_BEARER_TOKEN", action)]
    bearer_token: Secret<String>,

    /// Name of the warehouse, tables are stored below it in the object store
    #[clap(
        long = "warehouse",
        env = "LAKECAT_WAREHOUSE",
        default_value = lakecat_catalog::mem::DEFAULT_WAREHOUSE,
        action
    )]
    warehouse: String,

    /// Path prefix of the catalog resources, e.g. `/v1/<prefix>/databases`
    #[clap(long = "prefix", env = "LAKECAT_PREFIX", default_value = DEFAULT_PREFIX, action)]
    prefix: String,

    /// Header clients must send with every request, as NAME=VALUE. Advertised through
    /// `/v1/config`, may be repeated.
    #[clap(long = "client-header", action = clap::ArgAction::Append)]
    client_headers: Vec<KeyValue<String, String>>,

    /// How often expired entries are evicted from the catalog caches, e.g. "1m".
    #[clap(
        long = "cache-clean-up-interval",
        env = "LAKECAT_CACHE_CLEAN_UP_INTERVAL",
        default_value = "1m",
        action
    )]
    cache_clean_up_interval: humantime::Duration,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    info!(
        http_bind_address = %config.http_bind_address,
        warehouse = %config.warehouse,
        prefix = %config.prefix,
        "starting lakecat"
    );

    let clean_up_interval: Duration = config.cache_clean_up_interval.into();
    if clean_up_interval.is_zero() {
        return Err(Error::ZeroCleanUpInterval);
    }
    let options = config.cache_config.to_options()?;

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());
    let object_store = config.object_store_config.make_object_store()?;
    let backend: Arc<dyn Catalog> = Arc::new(MemCatalog::with_object_store(
        object_store,
        Path::from(config.warehouse.as_str()),
        Arc::clone(&time_provider),
    ));

    let shutdown = CancellationToken::new();
    let catalog: Arc<dyn Catalog> = if options.enabled {
        let cache = Arc::new(CachingCatalog::try_new(
            backend,
            options,
            Arc::clone(&time_provider),
        )?);
        tokio::spawn(clean_up_caches(
            Arc::clone(&cache),
            clean_up_interval,
            shutdown.clone(),
        ));
        cache as _
    } else {
        info!("catalog cache disabled");
        backend
    };

    let service_config = ServiceConfig {
        max_request_bytes: config.max_http_request_size,
        headers: config
            .client_headers
            .into_iter()
            .map(|KeyValue(header)| header)
            .collect(),
        ..ServiceConfig::new(config.prefix, config.warehouse, config.bearer_token)
    };
    let service = Arc::new(CatalogService::new(catalog, service_config));

    let listener = TcpListener::bind(*config.http_bind_address)
        .await
        .map_err(Error::BindAddress)?;

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received ctrl-c, shutting down"),
            Err(e) => warn!(%e, "cannot listen for ctrl-c, shutting down"),
        }
        signal_shutdown.cancel();
    });

    serve(service, listener, shutdown.clone()).await?;
    shutdown.cancel();
    Ok(())
}

/// Evict expired cache entries every `interval` until `shutdown` is cancelled
async fn clean_up_caches(
    cache: Arc<CachingCatalog>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                cache.clean_up();
                debug!("cleaned up catalog caches");
            }
        }
    }
}
