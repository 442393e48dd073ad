use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use crate::prelude::info;

use crate::broker::Broker;
use crate::proxy::{ProxyKey, ProxyRecord};

/// Authoritative registry of every known proxy. New registrations are
/// fanned out to every live [`Broker`] (one per domain, each owning a
/// `DomainMonitor` 1:1) so a domain created after a proxy is discovered
/// still sees it.
#[derive(Default)]
pub struct ProxyCollection {
    proxies: RwLock<HashMap<ProxyKey, ProxyRecord>>,
    brokers: RwLock<HashMap<String, Arc<Broker>>>,
}

impl ProxyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the record and pushes it into every registered broker.
    pub async fn register_proxy(&self, record: ProxyRecord) {
        let key = record.key();
        {
            let mut proxies = self.proxies.write().await;
            proxies.insert(key.clone(), record.clone());
        }

        let brokers = self.brokers.read().await;
        for broker in brokers.values() {
            broker.register(record.clone()).await;
        }

        info!(proxy = %key, "proxy collection registered proxy");
    }

    /// Wires a newly created broker into the fan-out list and
    /// back-fills it with every proxy already known. This is why a
    /// freshly contacted domain doesn't need discovery to re-push.
    pub async fn register_broker(&self, broker: Arc<Broker>) {
        let domain = broker.domain().to_string();

        {
            let known = self.proxies.read().await;
            for record in known.values() {
                broker.register(record.clone()).await;
            }
        }

        self.brokers.write().await.insert(domain.clone(), broker);
        info!(%domain, "proxy collection registered broker");
    }

    /// Snapshot of every known proxy key, sorted for stable output.
    pub async fn keys(&self) -> Vec<ProxyKey> {
        let proxies = self.proxies.read().await;
        let mut keys: Vec<ProxyKey> = proxies.keys().cloned().collect();
        keys.sort();
        keys
    }
}
