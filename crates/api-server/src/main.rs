//! Proxy brokerage API server entry point.
//!
//! Wires together the in-memory proxy collection and the per-domain
//! brokerage, then serves the REST adapter over HTTP.

use std::env;
use std::sync::Arc;

use api_server::ApiServer;
use broker_core::{BrokerConfig, Brokerage, ProxyCollection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let collection = Arc::new(ProxyCollection::new());
    let brokerage = Arc::new(Brokerage::new(collection.clone(), BrokerConfig::default()));
    let server = ApiServer::new(collection, brokerage);

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080);

    server.run(&host, port).await
}
