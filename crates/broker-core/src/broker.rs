use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use crate::prelude::info;

use crate::domain_monitor::{DomainMonitor, MonitorStats};
use crate::error::MonitorError;
use crate::proxy::{ProxyKey, ProxyRecord};

/// Tunables for one [`Broker`]. Defaults match the source service's
/// observed behavior.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Politeness delay after a successful release.
    pub return_delay: Duration,
    /// Forgive-me delay when a client never releases what it acquired.
    pub auto_return_delay: Duration,
    /// Quarantine delay after a failed request.
    pub bad_return_delay: Duration,
    /// Strike limit before permanent eviction.
    pub max_consecutive_failures: u32,
    /// Synthetic response time recorded when the client never reported
    /// one (auto-return or failed request), so a forgotten proxy
    /// doesn't look infinitely fast.
    pub failed_release_resp_time: f64,
    /// Acquisition poll interval.
    pub retry_time: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            return_delay: Duration::from_secs(30),
            auto_return_delay: Duration::from_secs(60),
            bad_return_delay: Duration::from_secs(600),
            max_consecutive_failures: 3,
            failed_release_resp_time: 30.0,
            retry_time: Duration::from_secs(1),
        }
    }
}

enum TimerAction {
    AutoReturn,
    BadReturn,
    Release { response_time: f64 },
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct BrokerState {
    monitor: DomainMonitor,
    timers: HashMap<ProxyKey, Timer>,
    consecutive_failures: HashMap<ProxyKey, u32>,
    next_generation: u64,
}

impl Drop for BrokerState {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

/// Wraps one [`DomainMonitor`] with timer-driven release, failure
/// quarantine, and acquisition-with-timeout. All mutable state (the
/// monitor, the outstanding timers, and the failure counters) lives
/// behind a single mutex — the "required per-Broker mutex" from the
/// concurrency model.
pub struct Broker {
    domain: String,
    config: BrokerConfig,
    state: Arc<Mutex<BrokerState>>,
}

impl Broker {
    pub fn new(monitor: DomainMonitor, config: BrokerConfig) -> Self {
        let domain = monitor.domain().to_string();
        info!(%domain, "initiated broker");
        Self {
            domain,
            config,
            state: Arc::new(Mutex::new(BrokerState {
                monitor,
                timers: HashMap::new(),
                consecutive_failures: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub async fn register(&self, record: ProxyRecord) {
        self.state.lock().await.monitor.register(&record);
    }

    pub async fn delist(&self, key: &ProxyKey) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        state.monitor.delist(key)?;
        if let Some(old) = state.timers.remove(key) {
            old.handle.abort();
        }
        state.consecutive_failures.remove(key);
        Ok(())
    }

    pub async fn stats(&self) -> MonitorStats {
        self.state.lock().await.monitor.stats()
    }

    /// Polls `monitor.acquire` every `retry_time` until a proxy is
    /// sampled or `max_wait_time` elapses. Not a FIFO queue: concurrent
    /// waiters race stochastically on every poll.
    pub async fn acquire(&self, requirements: &[String], max_wait_time: Duration) -> Option<ProxyKey> {
        let start = tokio::time::Instant::now();

        loop {
            let mut state = self.state.lock().await;
            let acquired = state.monitor.acquire(requirements);

            if let Some(key) = acquired {
                self.spawn_timer(&mut state, key.clone(), self.config.auto_return_delay, TimerAction::AutoReturn);
                drop(state);
                info!(domain = %self.domain, proxy = %key, "acquired");
                return Some(key);
            }
            drop(state);

            if start.elapsed() >= max_wait_time {
                info!(domain = %self.domain, "failed to acquire within max_wait_time");
                return None;
            }

            tokio::time::sleep(self.config.retry_time).await;
        }
    }

    /// Cancels the outstanding timer on `key` and installs exactly one
    /// new one: a politeness-delay return on success, a quarantine on
    /// failure, or none at all once the failure budget is exhausted
    /// (in which case the key simply never becomes idle again).
    pub async fn release(&self, key: ProxyKey, response_time: f64, is_failure: bool) {
        let mut state = self.state.lock().await;

        if is_failure {
            let failures = state.consecutive_failures.get(&key).copied().unwrap_or(0) + 1;

            if failures >= self.config.max_consecutive_failures {
                state.consecutive_failures.remove(&key);
                if let Some(old) = state.timers.remove(&key) {
                    old.handle.abort();
                }
                info!(domain = %self.domain, proxy = %key, failures, "proxy evicted after repeated failures");
            } else {
                state.consecutive_failures.insert(key.clone(), failures);
                self.spawn_timer(&mut state, key, self.config.bad_return_delay, TimerAction::BadReturn);
            }
        } else {
            state.consecutive_failures.remove(&key);
            self.spawn_timer(&mut state, key, self.config.return_delay, TimerAction::Release { response_time });
        }
    }

    /// Atomically replaces any existing timer on `key` with a fresh
    /// one. The spawned task tags itself with the generation it was
    /// installed under; when it wakes it only acts if it's still the
    /// current timer for that key, so a task that was pre-empted by a
    /// replacement (or whose abort lost the race) safely no-ops.
    fn spawn_timer(&self, state: &mut BrokerState, key: ProxyKey, delay: Duration, action: TimerAction) {
        if let Some(old) = state.timers.remove(&key) {
            old.handle.abort();
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        let shared_state = self.state.clone();
        let domain = self.domain.clone();
        let failed_resp_time = self.config.failed_release_resp_time;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut state = shared_state.lock().await;
            let still_current = matches!(
                state.timers.get(&task_key),
                Some(timer) if timer.generation == generation
            );
            if !still_current {
                return;
            }
            state.timers.remove(&task_key);

            let resp_time = match action {
                TimerAction::Release { response_time } => response_time,
                TimerAction::AutoReturn | TimerAction::BadReturn => failed_resp_time,
            };
            state.monitor.release(task_key.clone(), resp_time);
            info!(%domain, proxy = %task_key, "timer fired, proxy released");
        });

        state.timers.insert(key, Timer { generation, handle });
    }
}
