#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Host Directory Service node entrypoint.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use tracing::{error, info, warn};
use zeroize::Zeroize;

use hds::bootstrap;
use hds::config::{Config, KeySource};
use hds::core::handler::Handler;
use hds::core::security::keystore::Keystore;
use hds::core::store::Store;
use hds::federation::FederationClient;
use hds::http::{router, AppState};
use hds::monitoring::metrics::Metrics;

fn load_keystore(config: &Config) -> anyhow::Result<Keystore> {
    match &config.node.key_source {
        KeySource::Path(path) => Ok(Keystore::load_from_path(std::path::Path::new(path))?),
        KeySource::Inline(data) => {
            let mut der = Base64.decode(data)?;
            let keystore = Keystore::load_from_pkcs8(&der)?;
            der.zeroize();
            Ok(keystore)
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);
    let result = if config.log.format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.compact().try_init()
    };
    let _ = result;
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    let keystore = match load_keystore(&config) {
        Ok(k) => k,
        Err(e) => {
            error!(error = %e, "failed to load private key");
            std::process::exit(1);
        }
    };
    let server_key = keystore.server_key().to_string();
    info!(server_key = %server_key[..server_key.len().min(12)], "node identity loaded");

    let store = match Store::open(&config.node.data_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(?e, "failed to open store");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => Arc::new(m),
        Err(e) => {
            error!(?e, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let keystore = Arc::new(keystore);
    let federation_client = Arc::new(FederationClient::new(keystore.clone(), metrics.clone()));

    bootstrap::seed_own_identity(&store, &keystore, &config);

    let config = Arc::new(config);
    tokio::spawn({
        let federation_client = federation_client.clone();
        let config = config.clone();
        async move {
            bootstrap::register_with_peers(&federation_client, &config).await;
        }
    });
    tokio::spawn(bootstrap::refresh_loop(federation_client.clone(), config.clone()));

    let handler = Arc::new(Handler::new(store.clone(), Some(federation_client.clone())));
    let state = AppState {
        handler,
        store,
        server_key,
        metrics,
        federation: Some(federation_client),
    };

    let app = router(state);
    let listener = match tokio::net::TcpListener::bind(&config.http.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %config.http.listen_addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    info!(addr = %config.http.listen_addr, "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server exited with error");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => warn!(error = %e, "failed to install shutdown signal handler"),
    }
}
