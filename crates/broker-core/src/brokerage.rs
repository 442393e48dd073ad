use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::broker::{Broker, BrokerConfig};
use crate::collection::ProxyCollection;
use crate::domain_monitor::{DomainMonitor, MonitorStats};
use crate::proxy::ProxyKey;

/// Result of an acquisition attempt, mirroring spec's
/// `{broker, proxy}` response shape.
#[derive(Debug, Clone, Serialize)]
pub struct AcquireOutcome {
    pub broker: String,
    pub proxy: Option<ProxyKey>,
}

/// Router: maps a request URL to a domain, lazily creating the
/// `DomainMonitor` + `Broker` pair for a domain on first contact and
/// wiring it into the shared [`ProxyCollection`].
pub struct Brokerage {
    collection: Arc<ProxyCollection>,
    broker_config: BrokerConfig,
    brokers: RwLock<HashMap<String, Arc<Broker>>>,
}

impl Brokerage {
    pub fn new(collection: Arc<ProxyCollection>, broker_config: BrokerConfig) -> Self {
        Self {
            collection,
            broker_config,
            brokers: RwLock::new(HashMap::new()),
        }
    }

    /// Extracts the lowercased host from `url`; acquires from that
    /// domain's broker, creating it (and registering it with the
    /// collection, triggering back-fill) on first contact.
    pub async fn acquire(
        &self,
        url: &str,
        requirements: &[String],
        max_wait_time: Duration,
    ) -> Result<AcquireOutcome, url::ParseError> {
        let domain = domain_of(url)?;
        let broker = self.broker_for(&domain).await;

        let proxy = broker.acquire(requirements, max_wait_time).await;
        Ok(AcquireOutcome { broker: domain, proxy })
    }

    /// Releases `proxy` against `domain`'s broker. A release addressed
    /// to an unknown domain is a no-op, not a fault — it covers late
    /// releases against a broker that was never created or was evicted
    /// in the interim.
    pub async fn release(&self, domain: &str, proxy: ProxyKey, response_time: f64, is_failure: bool) -> bool {
        let brokers = self.brokers.read().await;
        let Some(broker) = brokers.get(domain) else {
            return false;
        };
        broker.release(proxy, response_time, is_failure).await;
        true
    }

    pub async fn list_all(&self) -> HashMap<String, MonitorStats> {
        let brokers = self.brokers.read().await;
        let mut snapshot = HashMap::with_capacity(brokers.len());
        for (domain, broker) in brokers.iter() {
            snapshot.insert(domain.clone(), broker.stats().await);
        }
        snapshot
    }

    async fn broker_for(&self, domain: &str) -> Arc<Broker> {
        if let Some(broker) = self.brokers.read().await.get(domain) {
            return broker.clone();
        }

        let mut brokers = self.brokers.write().await;
        if let Some(broker) = brokers.get(domain) {
            return broker.clone();
        }

        let monitor = DomainMonitor::new(domain.to_string());
        let broker = Arc::new(Broker::new(monitor, self.broker_config.clone()));
        self.collection.register_broker(broker.clone()).await;
        brokers.insert(domain.to_string(), broker.clone());
        broker
    }
}

/// Parses `url` and returns its lowercased host ("domain" in spec's
/// vocabulary). Domain interning (a memory optimization in the source
/// for millions of parsed URLs) is intentionally omitted: plain
/// `String` equality is sufficient, and correctness must not depend on
/// pointer identity per spec's invariant.
fn domain_of(url: &str) -> Result<String, url::ParseError> {
    let parsed = url::Url::parse(url)?;
    Ok(parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_default())
}
