// Version sweep dispatcher
//
// One sweep per newly claimed endpoint:
//   1. replay the triggering request unmodified (kind = Original)
//   2. substitute the observed version segment with every other configured
//      version and issue each configured method (kind = Fuzz)
//
// Sweeps run as spawned tokio tasks so the traffic path never waits on them.
// A global semaphore bounds running sweeps and a per-host semaphore bounds
// outstanding probes against one target. A failed probe is logged and counted;
// it never aborts its siblings.

use crate::aggregator::{RecordStatus, ResultAggregator, SweepTicket};
use crate::config::HunterConfig;
use crate::detector::Detection;
use crate::models::{EndpointKey, HttpRequest, HttpSender, ProbeKind, ProbeOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// A fuzz probe ready to be issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedProbe {
    pub version: String,
    pub request: HttpRequest,
}

/// Every request one sweep will issue, in deterministic order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    pub endpoint: EndpointKey,
    pub original: HttpRequest,
    pub original_version: String,
    pub probes: Vec<PlannedProbe>,
}

impl SweepPlan {
    /// Original replay plus fuzz probes
    pub fn total_requests(&self) -> usize {
        self.probes.len() + 1
    }
}

/// Build the probe matrix for `trigger`.
///
/// Versions ascend, methods follow the configured order. The observed version is
/// skipped so it only appears as the Original entry.
pub fn plan(trigger: &HttpRequest, detection: &Detection, config: &HunterConfig) -> SweepPlan {
    let observed = detection.segment.literal();
    let mut probes = Vec::new();

    for n in config.versions() {
        let target = format!("v{}", n);
        if observed == format!("/{}", target) || observed == format!("/{}/", target) {
            continue;
        }
        let sibling = trigger.with_path(detection.segment.replace_in(&trigger.path, &format!("/{}", target)));
        for method in &config.methods {
            probes.push(PlannedProbe {
                version: target.clone(),
                request: sibling.with_method(method.clone()),
            });
        }
    }

    SweepPlan {
        endpoint: EndpointKey::new(trigger.host(), &detection.normalized_path),
        original: trigger.clone(),
        original_version: detection.segment.token.clone(),
        probes,
    }
}

/// Counters for one finished sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub endpoint: EndpointKey,
    /// Requests issued, original replay included
    pub attempted: usize,
    pub recorded: usize,
    pub duplicates: usize,
    /// Transport errors
    pub failed: usize,
    /// Responses dropped because the host was deleted mid-sweep
    pub discarded: usize,
}

impl SweepSummary {
    fn new(endpoint: EndpointKey) -> Self {
        Self {
            endpoint,
            attempted: 0,
            recorded: 0,
            duplicates: 0,
            failed: 0,
            discarded: 0,
        }
    }

    fn tally(&mut self, status: ProbeStatus) {
        self.attempted += 1;
        match status {
            ProbeStatus::Recorded => self.recorded += 1,
            ProbeStatus::Duplicate => self.duplicates += 1,
            ProbeStatus::Discarded => self.discarded += 1,
            ProbeStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeStatus {
    Recorded,
    Duplicate,
    Discarded,
    Failed,
}

#[derive(Clone)]
pub struct FuzzDispatcher {
    sender: Arc<dyn HttpSender>,
    aggregator: Arc<ResultAggregator>,
    config: Arc<HunterConfig>,
    sweep_slots: Arc<Semaphore>,
    host_limits: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl FuzzDispatcher {
    pub fn new(sender: Arc<dyn HttpSender>, aggregator: Arc<ResultAggregator>, config: Arc<HunterConfig>) -> Self {
        let sweep_slots = Arc::new(Semaphore::new(config.max_concurrent_sweeps.max(1)));
        Self {
            sender,
            aggregator,
            config,
            sweep_slots,
            host_limits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &HunterConfig {
        &self.config
    }

    /// Start a sweep in the background and return immediately.
    /// Must be called from within a Tokio runtime.
    ///
    /// The host bucket is opened before the task is spawned, so deleting the
    /// host at any later point discards this sweep's outcomes.
    pub fn run(&self, trigger: HttpRequest, detection: Detection) -> JoinHandle<SweepSummary> {
        let ticket = self.aggregator.open_sweep(trigger.host());
        let this = self.clone();
        tokio::spawn(async move { this.sweep(ticket, trigger, detection).await })
    }

    async fn sweep(&self, ticket: SweepTicket, trigger: HttpRequest, detection: Detection) -> SweepSummary {
        let plan = plan(&trigger, &detection, &self.config);
        let _slot = self.sweep_slots.clone().acquire_owned().await.ok();

        let limiter = self.host_limiter(trigger.host());
        info!(
            endpoint = %plan.endpoint,
            version = %plan.original_version,
            requests = plan.total_requests(),
            "starting version sweep"
        );

        let mut summary = SweepSummary::new(plan.endpoint.clone());
        let status = self
            .probe(&ticket, limiter.clone(), ProbeKind::Original, plan.original_version, plan.original)
            .await;
        summary.tally(status);

        let mut probes = JoinSet::new();
        for probe in plan.probes {
            let this = self.clone();
            let ticket = ticket.clone();
            let limiter = limiter.clone();
            probes.spawn(async move {
                this.probe(&ticket, limiter, ProbeKind::Fuzz, probe.version, probe.request)
                    .await
            });
        }
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(status) => summary.tally(status),
                Err(e) => {
                    warn!(endpoint = %summary.endpoint, error = %e, "probe task aborted");
                    summary.tally(ProbeStatus::Failed);
                }
            }
        }
        self.release_host_limiter(trigger.host(), limiter);

        info!(
            endpoint = %summary.endpoint,
            attempted = summary.attempted,
            recorded = summary.recorded,
            failed = summary.failed,
            "version sweep finished"
        );
        summary
    }

    async fn probe(
        &self,
        ticket: &SweepTicket,
        limiter: Option<Arc<Semaphore>>,
        kind: ProbeKind,
        version: String,
        request: HttpRequest,
    ) -> ProbeStatus {
        let permit = match limiter {
            Some(limiter) => limiter.acquire_owned().await.ok(),
            None => None,
        };
        debug!(%kind, %version, method = %request.method, path = %request.path, "sending probe");

        let response = self.sender.send(&request).await;
        drop(permit);

        match response {
            Ok(response) => {
                let outcome = ProbeOutcome::new(kind, version, request, response);
                match self.aggregator.record_for(ticket, outcome) {
                    RecordStatus::Inserted => ProbeStatus::Recorded,
                    RecordStatus::Duplicate => ProbeStatus::Duplicate,
                    RecordStatus::HostGone => ProbeStatus::Discarded,
                }
            }
            Err(e) => {
                warn!(
                    host = %request.service.host,
                    method = %request.method,
                    path = %request.path,
                    error = %e,
                    "probe failed"
                );
                ProbeStatus::Failed
            }
        }
    }

    fn host_limiter(&self, host: &str) -> Option<Arc<Semaphore>> {
        let cap = self.config.max_probes_per_host;
        if cap == 0 {
            return None;
        }
        let mut limits = self.host_limits.lock();
        Some(
            limits
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(cap)))
                .clone(),
        )
    }

    /// Forget `host`'s limiter once no running sweep holds it
    fn release_host_limiter(&self, host: &str, limiter: Option<Arc<Semaphore>>) {
        drop(limiter);
        let mut limits = self.host_limits.lock();
        if limits.get(host).map_or(false, |s| Arc::strong_count(s) == 1) {
            limits.remove(host);
        }
    }

    /// Probes currently holding a slot for `host`
    pub fn in_flight(&self, host: &str) -> usize {
        let cap = self.config.max_probes_per_host;
        self.host_limits
            .lock()
            .get(host)
            .map_or(0, |s| cap.saturating_sub(s.available_permits()))
    }
}
