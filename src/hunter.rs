// Traffic-facing orchestrator for version-hunter
//
// intercepted request -> scope check -> version detection -> endpoint claim -> sweep
//
// `observe` never waits on the network: a newly claimed endpoint gets a
// background sweep and the call returns at once.

use crate::aggregator::{AggregatorSnapshot, ResultAggregator, ResultEvent};
use crate::config::HunterConfig;
use crate::dedup::EndpointDeduplicator;
use crate::detector::detect;
use crate::dispatcher::{FuzzDispatcher, SweepSummary};
use crate::engine::ReplayEngine;
use crate::error::{HunterError, StateError};
use crate::models::{EndpointKey, HttpRequest, HttpSender, ProbeOutcome};
use crate::scope::{AllowAll, ScopeFilter};
use crate::state::{self, StateStore};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What `observe` did with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    OutOfScope,
    /// No version segment in the path
    Unversioned,
    /// The endpoint was already swept (or is being swept)
    AlreadyClaimed(EndpointKey),
    /// A new sweep was started
    Dispatched(EndpointKey),
}

pub struct VersionHunter {
    config: Arc<HunterConfig>,
    dedup: Arc<EndpointDeduplicator>,
    aggregator: Arc<ResultAggregator>,
    dispatcher: FuzzDispatcher,
    scope: Box<dyn ScopeFilter>,
    sweeps: Mutex<Vec<JoinHandle<SweepSummary>>>,
}

impl VersionHunter {
    /// Hunter with everything in scope
    pub fn new(config: HunterConfig, sender: Arc<dyn HttpSender>) -> Self {
        let config = Arc::new(config);
        let dedup = Arc::new(EndpointDeduplicator::new());
        let aggregator = Arc::new(ResultAggregator::with_capacity(dedup.clone(), config.event_capacity));
        let dispatcher = FuzzDispatcher::new(sender, aggregator.clone(), config.clone());
        Self {
            config,
            dedup,
            aggregator,
            dispatcher,
            scope: Box::new(AllowAll),
            sweeps: Mutex::new(Vec::new()),
        }
    }

    /// Hunter sending probes through a reqwest `ReplayEngine`
    pub fn connect(config: HunterConfig) -> Result<Self, HunterError> {
        config.validate()?;
        let engine = ReplayEngine::new(&config)?;
        Ok(Self::new(config, Arc::new(engine)))
    }

    pub fn with_scope(mut self, scope: impl ScopeFilter + 'static) -> Self {
        self.scope = Box::new(scope);
        self
    }

    /// Inspect one intercepted request, starting a sweep for a newly seen endpoint.
    /// Must be called from within a Tokio runtime.
    pub fn observe(&self, request: &HttpRequest) -> Observation {
        if !self.scope.is_in_scope(&request.url()) {
            return Observation::OutOfScope;
        }
        let detection = match detect(&request.path) {
            Some(detection) => detection,
            None => return Observation::Unversioned,
        };

        let key = EndpointKey::new(request.host(), &detection.normalized_path);
        if !self.dedup.try_claim(&key) {
            debug!(endpoint = %key, "endpoint already claimed");
            return Observation::AlreadyClaimed(key);
        }

        info!(endpoint = %key, method = %request.method, path = %request.path, "new versioned endpoint");
        let handle = self.dispatcher.run(request.clone(), detection);
        self.sweeps.lock().push(handle);
        Observation::Dispatched(key)
    }

    /// Wait for every dispatched sweep, including ones started while waiting
    pub async fn wait_idle(&self) -> Vec<SweepSummary> {
        let mut summaries = Vec::new();
        loop {
            let handles = std::mem::take(&mut *self.sweeps.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                match handle.await {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => warn!(error = %e, "sweep task failed"),
                }
            }
        }
        summaries
    }

    pub fn pending_sweeps(&self) -> usize {
        self.sweeps.lock().iter().filter(|h| !h.is_finished()).count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResultEvent> {
        self.aggregator.subscribe()
    }

    pub fn list_hosts(&self) -> Vec<String> {
        self.aggregator.list_hosts()
    }

    pub fn get_results(&self, host: &str) -> Vec<Arc<ProbeOutcome>> {
        self.aggregator.get_results(host)
    }

    /// Remove a host's results and claims; later traffic to it starts fresh sweeps
    pub fn delete_host(&self, host: &str) -> bool {
        self.aggregator.delete_host(host)
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        self.aggregator.snapshot()
    }

    pub fn save_state(&self, store: &dyn StateStore) -> Result<usize, StateError> {
        state::save(store, &self.config.state_key, &self.aggregator)
    }

    pub fn load_state(&self, store: &dyn StateStore) -> usize {
        state::load(store, &self.config.state_key, &self.aggregator)
    }

    pub fn config(&self) -> &HunterConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Arc<ResultAggregator> {
        &self.aggregator
    }

    pub fn deduplicator(&self) -> &Arc<EndpointDeduplicator> {
        &self.dedup
    }

    pub fn dispatcher(&self) -> &FuzzDispatcher {
        &self.dispatcher
    }
}
