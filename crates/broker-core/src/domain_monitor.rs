use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::Serialize;
use crate::prelude::info;

use crate::error::MonitorError;
use crate::proxy::{ProxyKey, ProxyRecord};

/// Small floor added to the stochastic-acceptance denominator so the
/// slowest candidate in a pool still has non-zero selection probability.
/// See: http://jbn.github.io/fast_proportional_selection/
const STOCHASTIC_EPSILON: f64 = 0.01;

/// Snapshot returned by [`DomainMonitor::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub available: usize,
    pub acquisitions_processed: u64,
    pub avg_resp_time: f64,
    pub indices: HashMap<String, usize>,
}

/// Per-domain pool of proxies: tracks which are idle, indexes them by
/// property tag, and samples from the idle set with a response-time-
/// weighted policy. Does no locking of its own — ordering across
/// concurrent callers is the [`crate::broker::Broker`]'s job.
pub struct DomainMonitor {
    domain: String,
    idle: HashSet<ProxyKey>,
    resp_time: HashMap<ProxyKey, f64>,
    props: HashMap<String, HashSet<ProxyKey>>,
    acquisitions_processed: u64,
}

impl DomainMonitor {
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        info!(%domain, "initiated domain monitor");
        Self {
            domain,
            idle: HashSet::new(),
            resp_time: HashMap::new(),
            props: HashMap::new(),
            acquisitions_processed: 0,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Registers a proxy. Idempotent: registering an already-known key
    /// is a no-op besides a log line.
    pub fn register(&mut self, record: &ProxyRecord) {
        let key = record.key();

        if self.resp_time.contains_key(&key) {
            info!(domain = %self.domain, proxy = %key, "already registered");
            return;
        }

        self.idle.insert(key.clone());
        self.resp_time.insert(key.clone(), record.resp_time);
        for tag in record.property_tags() {
            self.props.entry(tag.to_string()).or_default().insert(key.clone());
        }

        info!(domain = %self.domain, proxy = %key, "registered proxy");
    }

    /// Removes a proxy and prunes it out of every property index.
    /// Delisting a key the monitor does not know about is a caller bug.
    pub fn delist(&mut self, key: &ProxyKey) -> Result<(), MonitorError> {
        if self.resp_time.remove(key).is_none() {
            return Err(MonitorError::UnknownKey(key.clone()));
        }
        self.idle.remove(key);

        let mut emptied = Vec::new();
        for (tag, members) in self.props.iter_mut() {
            members.remove(key);
            if members.is_empty() {
                emptied.push(tag.clone());
            }
        }
        for tag in emptied {
            self.props.remove(&tag);
        }

        info!(domain = %self.domain, proxy = %key, "delisted proxy");
        Ok(())
    }

    /// Samples one idle proxy matching every tag in `requirements`
    /// (conjunction). An empty slice matches the whole idle set.
    pub fn acquire(&mut self, requirements: &[String]) -> Option<ProxyKey> {
        let candidates = self.candidates(requirements);
        if candidates.is_empty() {
            return None;
        }

        let chosen = self.sample(&candidates);
        self.idle.remove(&chosen);
        self.acquisitions_processed += 1;
        Some(chosen)
    }

    fn candidates(&self, requirements: &[String]) -> Vec<ProxyKey> {
        let Some((first, rest)) = requirements.split_first() else {
            return self.idle.iter().cloned().collect();
        };

        let empty = HashSet::new();
        let mut set: HashSet<ProxyKey> = self
            .props
            .get(first)
            .unwrap_or(&empty)
            .intersection(&self.idle)
            .cloned()
            .collect();

        for tag in rest {
            let bucket = self.props.get(tag).unwrap_or(&empty);
            set = set.intersection(bucket).cloned().collect();
        }

        set.into_iter().collect()
    }

    /// Returns a proxy to the idle set. If `resp_time > 0.0` the stored
    /// sample is overwritten; a client-supplied `0.0` never clobbers a
    /// good prior measurement. If the key is already idle the
    /// auto-return beat this release to the punch — logged, not an
    /// error.
    pub fn release(&mut self, key: ProxyKey, resp_time: f64) {
        if self.idle.contains(&key) {
            info!(domain = %self.domain, proxy = %key, "already idle (auto-return raced this release)");
        } else {
            self.idle.insert(key.clone());
            info!(domain = %self.domain, proxy = %key, "proxy idle again");
        }

        if resp_time > 0.0 {
            self.resp_time.insert(key, resp_time);
        }
    }

    /// Mean of all known response times; `+inf` when nothing is known
    /// yet (so callers don't mistake "no data" for "instant").
    pub fn average_response_time(&self) -> f64 {
        if self.resp_time.is_empty() {
            return f64::INFINITY;
        }
        self.resp_time.values().sum::<f64>() / self.resp_time.len() as f64
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            available: self.idle.len(),
            acquisitions_processed: self.acquisitions_processed,
            avg_resp_time: self.average_response_time(),
            indices: self.props.iter().map(|(k, v)| (k.clone(), v.len())).collect(),
        }
    }

    /// Stochastic acceptance: repeatedly pick a uniformly random
    /// candidate and accept it with probability proportional to how
    /// close its response time is to the fastest in the pool. Expected
    /// O(1) iterations since the fastest candidate always has
    /// acceptance probability close to 1.
    fn sample(&self, candidates: &[ProxyKey]) -> ProxyKey {
        let resp_times: Vec<f64> = candidates.iter().map(|k| self.resp_time[k]).collect();
        let min_resp_time = resp_times.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_resp_time = resp_times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut rng = rand::thread_rng();

        if max_resp_time == 0.0 {
            let idx = rng.gen_range(0..candidates.len());
            return candidates[idx].clone();
        }

        loop {
            let idx = rng.gen_range(0..candidates.len());
            let score = 1.0 - (resp_times[idx] - min_resp_time) / (max_resp_time - min_resp_time + STOCHASTIC_EPSILON);
            if rng.gen::<f64>() < score {
                return candidates[idx].clone();
            }
        }
    }
}
