//! End-to-end scenarios for the broker/monitor pair, mirroring the
//! timer-driven behaviors a production scraping client would observe.

use std::sync::Arc;
use std::time::Duration;

use broker_core::{Broker, BrokerConfig, DomainMonitor, Protocol, ProxyRecord};

fn two_proxy_monitor() -> DomainMonitor {
    let mut monitor = DomainMonitor::new("google.com");
    monitor.register(&ProxyRecord::new(Protocol::Http, "proxy-a", 8888, 0.1, None, None));
    monitor.register(&ProxyRecord::new(Protocol::Http, "proxy-b", 8888, 0.1, None, None));
    monitor
}

/// A single-proxy monitor so failure-accounting tests can reacquire
/// the exact same key across cycles without depending on the
/// stochastic sampler's choice.
fn one_proxy_monitor() -> DomainMonitor {
    let mut monitor = DomainMonitor::new("google.com");
    monitor.register(&ProxyRecord::new(Protocol::Http, "proxy-a", 8888, 0.1, None, None));
    monitor
}

#[tokio::test(start_paused = true)]
async fn happy_path_release_then_auto_return_cycle() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());
    assert_eq!(broker.stats().await.available, 2);

    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    assert_eq!(broker.stats().await.available, 1);

    broker.release(proxy, 0.2, false).await;
    assert_eq!(broker.stats().await.available, 1);

    tokio::time::advance(Duration::from_secs(31)).await;

    assert_eq!(broker.stats().await.available, 2);
    assert!((broker.stats().await.avg_resp_time - 0.15).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn forgotten_release_is_auto_returned() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());

    broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    assert_eq!(broker.stats().await.available, 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    assert_eq!(broker.stats().await.available, 2);
    assert!((broker.stats().await.avg_resp_time - 15.05).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn failed_request_is_quarantined_then_released() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());

    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.release(proxy, 0.2, true).await;

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(broker.stats().await.available, 1, "still quarantined at 31s");

    tokio::time::advance(Duration::from_secs(600)).await;
    assert_eq!(broker.stats().await.available, 2);
}

#[tokio::test(start_paused = true)]
async fn strike_out_eviction_never_returns_the_proxy() {
    // A single-proxy monitor keeps the checked-out key unambiguous
    // across the three consecutive failures below.
    let broker = Broker::new(one_proxy_monitor(), BrokerConfig::default());

    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    assert_eq!(broker.stats().await.available, 0);

    // Each release re-arms the bad-return timer until the third strike
    // evicts the key outright; the proxy never leaves quarantine.
    broker.release(proxy.clone(), 0.2, true).await;
    broker.release(proxy.clone(), 0.2, true).await;
    broker.release(proxy, 0.2, true).await;

    assert_eq!(broker.stats().await.available, 0);

    // No timer will ever bring it back.
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(broker.stats().await.available, 0);
}

#[tokio::test(start_paused = true)]
async fn waiter_succeeds_once_a_proxy_is_returned() {
    let broker = Arc::new(Broker::new(two_proxy_monitor(), BrokerConfig::default()));

    broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    assert_eq!(broker.stats().await.available, 0);

    // Default auto_return_delay (60s) will free one of them up while
    // this waiter is still polling; spawn it separately so the mid-wait
    // state can be observed before it resolves.
    let waiter = broker.clone();
    let handle = tokio::spawn(async move { waiter.acquire(&[], Duration::from_secs(120)).await });

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!handle.is_finished(), "waiter should still be polling at 30s");
    assert_eq!(broker.stats().await.available, 0);

    tokio::time::advance(Duration::from_secs(31)).await;
    let proxy = handle.await.unwrap();
    assert!(proxy.is_some());

    // The other proxy's own auto-return timer fired at the same 60s
    // mark and is not re-consumed by anyone, so it stays idle.
    assert_eq!(broker.stats().await.available, 1);
}

#[tokio::test(start_paused = true)]
async fn waiter_times_out_and_returns_none() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());

    broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.acquire(&[], Duration::from_secs(60)).await.unwrap();

    let result = broker.acquire(&[], Duration::from_millis(10)).await;
    assert!(result.is_none());
}

#[tokio::test(start_paused = true)]
async fn good_release_resets_the_failure_counter() {
    let broker = Broker::new(one_proxy_monitor(), BrokerConfig::default());

    // First strike, then the auto-return of the bad-release timer
    // brings it back without clearing the counter.
    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.release(proxy, 0.1, true).await;
    tokio::time::advance(Duration::from_secs(601)).await;
    assert_eq!(broker.stats().await.available, 1);

    // A clean release clears the counter back to zero.
    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.release(proxy, 10.0, false).await;
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(broker.stats().await.available, 1);

    // A single failure right after the reset should only count as one
    // strike, not trigger eviction.
    let proxy = broker.acquire(&[], Duration::from_secs(60)).await.unwrap();
    broker.release(proxy, 0.1, true).await;
    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(broker.stats().await.available, 0, "still quarantined, not evicted");
}

#[tokio::test(start_paused = true)]
async fn register_and_delist_update_availability() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());
    let extra = ProxyRecord::new(Protocol::Http, "proxy-c", 8888, 0.1, None, None);

    broker.register(extra.clone()).await;
    assert_eq!(broker.stats().await.available, 3);

    broker.delist(&extra.key()).await.unwrap();
    assert_eq!(broker.stats().await.available, 2);
}

#[tokio::test(start_paused = true)]
async fn delisting_an_unknown_key_is_an_error() {
    let broker = Broker::new(two_proxy_monitor(), BrokerConfig::default());
    let ghost = ProxyRecord::new(Protocol::Http, "ghost", 1, 0.1, None, None);
    assert!(broker.delist(&ghost.key()).await.is_err());
}
