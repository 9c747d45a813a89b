// Result aggregation for version-hunter
//
// Collects probe outcomes per host from any number of concurrent sweeps.
// Within a host, (method, path, version) is unique and insertion order is kept.
//
// Host buckets are opened when a sweep starts and never created by `record`.
// Deleting a host detaches its bucket, so outcomes still in flight for it are
// dropped instead of silently recreating the host.
//
// Subscribers (a UI, a live report) receive a `ResultEvent` per inserted outcome.

use crate::dedup::EndpointDeduplicator;
use crate::models::{ProbeOutcome, ResultKey};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Default capacity for the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Notifications published to subscribers
#[derive(Debug, Clone)]
pub enum ResultEvent {
    /// A new, non-duplicate outcome was recorded
    Added {
        host: String,
        outcome: Arc<ProbeOutcome>,
    },
    /// A host and its claims were removed
    HostDeleted { host: String },
    /// The whole state was replaced from persisted data
    Restored { hosts: Vec<String> },
}

/// What happened to a recorded outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Inserted,
    /// Same (method, path, version) already present for the host
    Duplicate,
    /// The host bucket was deleted (or replaced) after the sweep started
    HostGone,
}

/// Handed to a sweep when it starts; binds its outcomes to one host bucket generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTicket {
    host: String,
    generation: u64,
}

impl SweepTicket {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Ordered results of one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResults {
    pub host: String,
    pub outcomes: Vec<ProbeOutcome>,
}

/// Point-in-time copy of every non-empty host, in display order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorSnapshot {
    pub hosts: Vec<HostResults>,
}

impl AggregatorSnapshot {
    pub fn result_count(&self) -> usize {
        self.hosts.iter().map(|h| h.outcomes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[derive(Debug, Default)]
struct BucketEntries {
    outcomes: Vec<Arc<ProbeOutcome>>,
    seen: HashSet<ResultKey>,
    detached: bool,
}

#[derive(Debug)]
struct HostBucket {
    generation: u64,
    entries: Mutex<BucketEntries>,
}

impl HostBucket {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            entries: Mutex::new(BucketEntries::default()),
        }
    }

    fn detach(&self) {
        self.entries.lock().detached = true;
    }
}

#[derive(Debug, Default)]
struct HostTable {
    order: Vec<String>,
    buckets: HashMap<String, Arc<HostBucket>>,
}

impl HostTable {
    fn get(&self, host: &str) -> Option<Arc<HostBucket>> {
        self.buckets.get(host).cloned()
    }
}

pub struct ResultAggregator {
    hosts: RwLock<HostTable>,
    next_generation: AtomicU64,
    dedup: Arc<EndpointDeduplicator>,
    events: broadcast::Sender<ResultEvent>,
}

impl ResultAggregator {
    pub fn new(dedup: Arc<EndpointDeduplicator>) -> Self {
        Self::with_capacity(dedup, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(dedup: Arc<EndpointDeduplicator>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            hosts: RwLock::new(HostTable::default()),
            next_generation: AtomicU64::new(1),
            dedup,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResultEvent> {
        self.events.subscribe()
    }

    pub fn deduplicator(&self) -> &Arc<EndpointDeduplicator> {
        &self.dedup
    }

    /// Open (or join) the bucket for `host` before a sweep issues probes
    pub fn open_sweep(&self, host: &str) -> SweepTicket {
        if let Some(bucket) = self.hosts.read().get(host) {
            return SweepTicket {
                host: host.to_string(),
                generation: bucket.generation,
            };
        }

        let mut table = self.hosts.write();
        let generation = match table.buckets.get(host) {
            Some(bucket) => bucket.generation,
            None => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                table
                    .buckets
                    .insert(host.to_string(), Arc::new(HostBucket::new(generation)));
                table.order.push(host.to_string());
                generation
            }
        };
        SweepTicket {
            host: host.to_string(),
            generation,
        }
    }

    /// Record an outcome for `host`. Returns true when it was new.
    ///
    /// The host bucket must already exist; outcomes for unknown or deleted
    /// hosts are dropped.
    pub fn record(&self, host: &str, outcome: ProbeOutcome) -> bool {
        let bucket = self.hosts.read().get(host);
        match bucket {
            Some(bucket) => self.insert(host, &bucket, outcome) == RecordStatus::Inserted,
            None => {
                debug!(host, path = %outcome.path, "dropping outcome for unknown host");
                false
            }
        }
    }

    /// Record an outcome produced by the sweep holding `ticket`
    pub fn record_for(&self, ticket: &SweepTicket, outcome: ProbeOutcome) -> RecordStatus {
        let bucket = self.hosts.read().get(&ticket.host);
        match bucket {
            Some(bucket) if bucket.generation == ticket.generation => {
                self.insert(&ticket.host, &bucket, outcome)
            }
            _ => {
                debug!(host = %ticket.host, path = %outcome.path, "dropping straggler outcome for deleted host");
                RecordStatus::HostGone
            }
        }
    }

    fn insert(&self, host: &str, bucket: &HostBucket, outcome: ProbeOutcome) -> RecordStatus {
        let mut entries = bucket.entries.lock();
        if entries.detached {
            return RecordStatus::HostGone;
        }
        if !entries.seen.insert(outcome.result_key()) {
            debug!(
                host,
                method = %outcome.method,
                path = %outcome.path,
                version = %outcome.version,
                "duplicate outcome discarded"
            );
            return RecordStatus::Duplicate;
        }

        let outcome = Arc::new(outcome);
        entries.outcomes.push(outcome.clone());
        // Published under the bucket lock so event order matches insertion order.
        let _ = self.events.send(ResultEvent::Added {
            host: host.to_string(),
            outcome,
        });
        RecordStatus::Inserted
    }

    /// Hosts with at least one result, in the order they were first opened
    pub fn list_hosts(&self) -> Vec<String> {
        let table = self.hosts.read();
        table
            .order
            .iter()
            .filter(|host| {
                table
                    .buckets
                    .get(*host)
                    .map_or(false, |b| !b.entries.lock().outcomes.is_empty())
            })
            .cloned()
            .collect()
    }

    /// Results for `host` in insertion order
    pub fn get_results(&self, host: &str) -> Vec<Arc<ProbeOutcome>> {
        let bucket = self.hosts.read().get(host);
        bucket
            .map(|b| b.entries.lock().outcomes.clone())
            .unwrap_or_default()
    }

    pub fn result_count(&self) -> usize {
        let table = self.hosts.read();
        table
            .buckets
            .values()
            .map(|b| b.entries.lock().outcomes.len())
            .sum()
    }

    /// Remove `host`'s results and release its endpoint claims so it can be fuzzed again.
    /// In-flight probes are not cancelled; their outcomes are dropped on arrival.
    pub fn delete_host(&self, host: &str) -> bool {
        let removed = {
            let mut table = self.hosts.write();
            table.order.retain(|h| h != host);
            table.buckets.remove(host)
        };
        if let Some(bucket) = &removed {
            bucket.detach();
        }
        let released = self.dedup.clear_host(host);
        debug!(host, released, "host deleted");

        let _ = self.events.send(ResultEvent::HostDeleted {
            host: host.to_string(),
        });
        removed.is_some()
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        let table = self.hosts.read();
        let hosts = table
            .order
            .iter()
            .filter_map(|host| {
                let bucket = table.buckets.get(host)?;
                let entries = bucket.entries.lock();
                if entries.outcomes.is_empty() {
                    return None;
                }
                Some(HostResults {
                    host: host.clone(),
                    outcomes: entries.outcomes.iter().map(|o| (**o).clone()).collect(),
                })
            })
            .collect();
        AggregatorSnapshot { hosts }
    }

    /// Replace the whole state with `snapshot`. Returns the number of results loaded.
    ///
    /// Duplicates inside the snapshot keep their first occurrence.
    pub fn restore(&self, snapshot: AggregatorSnapshot) -> usize {
        let mut table = HostTable::default();
        let mut loaded = 0;

        for HostResults { host, outcomes } in snapshot.hosts {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let bucket = Arc::new(HostBucket::new(generation));
            {
                let mut entries = bucket.entries.lock();
                for outcome in outcomes {
                    if entries.seen.insert(outcome.result_key()) {
                        entries.outcomes.push(Arc::new(outcome));
                        loaded += 1;
                    }
                }
            }
            if table.buckets.insert(host.clone(), bucket).is_none() {
                table.order.push(host);
            }
        }

        let hosts = table.order.clone();
        let previous = std::mem::replace(&mut *self.hosts.write(), table);
        for bucket in previous.buckets.values() {
            bucket.detach();
        }

        let _ = self.events.send(ResultEvent::Restored { hosts });
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpRequest, HttpResponse, HttpService, Method, ProbeKind};

    fn outcome(kind: ProbeKind, version: &str, method: Method, path: &str, status: u16) -> ProbeOutcome {
        let request = HttpRequest::new(HttpService::new("api.example.com", 443, true), method, path);
        ProbeOutcome::new(kind, version, request, HttpResponse::new(status, "{}"))
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(Arc::new(EndpointDeduplicator::new()))
    }

    #[test]
    fn duplicate_results_are_discarded() {
        let agg = aggregator();
        agg.open_sweep("api.example.com");
        let first = outcome(ProbeKind::Fuzz, "v2", Method::GET, "/api/v2/users", 200);
        let mut again = first.clone();
        again.status_code = 500;

        assert!(agg.record("api.example.com", first));
        assert!(!agg.record("api.example.com", again));

        let results = agg.get_results("api.example.com");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status_code, 200);
    }

    #[test]
    fn record_does_not_create_hosts() {
        let agg = aggregator();
        assert!(!agg.record("ghost", outcome(ProbeKind::Fuzz, "v1", Method::GET, "/v1", 200)));
        assert!(agg.list_hosts().is_empty());
    }

    #[test]
    fn list_hosts_skips_empty_buckets_and_keeps_order() {
        let agg = aggregator();
        agg.open_sweep("b.example.com");
        agg.open_sweep("a.example.com");
        agg.open_sweep("c.example.com");
        agg.record("a.example.com", outcome(ProbeKind::Fuzz, "v1", Method::GET, "/v1", 200));
        agg.record("b.example.com", outcome(ProbeKind::Fuzz, "v1", Method::GET, "/v1", 200));

        assert_eq!(agg.list_hosts(), vec!["b.example.com", "a.example.com"]);
    }

    #[test]
    fn stragglers_after_delete_are_dropped() {
        let agg = aggregator();
        let ticket = agg.open_sweep("api.example.com");
        assert_eq!(
            agg.record_for(&ticket, outcome(ProbeKind::Original, "v1", Method::GET, "/api/v1/users", 200)),
            RecordStatus::Inserted
        );

        assert!(agg.delete_host("api.example.com"));
        assert_eq!(
            agg.record_for(&ticket, outcome(ProbeKind::Fuzz, "v2", Method::GET, "/api/v2/users", 200)),
            RecordStatus::HostGone
        );
        assert!(agg.list_hosts().is_empty());

        // A new sweep reopens the host; the old ticket still cannot write into it.
        let fresh = agg.open_sweep("api.example.com");
        assert_ne!(fresh.generation(), ticket.generation());
        assert_eq!(
            agg.record_for(&ticket, outcome(ProbeKind::Fuzz, "v3", Method::GET, "/api/v3/users", 200)),
            RecordStatus::HostGone
        );
        assert_eq!(
            agg.record_for(&fresh, outcome(ProbeKind::Fuzz, "v3", Method::GET, "/api/v3/users", 200)),
            RecordStatus::Inserted
        );
        assert_eq!(agg.get_results("api.example.com").len(), 1);
    }

    #[test]
    fn delete_host_releases_claims() {
        let dedup = Arc::new(EndpointDeduplicator::new());
        let agg = ResultAggregator::new(dedup.clone());
        let key = crate::models::EndpointKey::new("api.example.com", "/api/{v}/users");
        assert!(dedup.try_claim(&key));
        agg.open_sweep("api.example.com");

        assert!(agg.delete_host("api.example.com"));
        assert!(!dedup.is_claimed(&key));
        assert!(!agg.delete_host("api.example.com"));
    }

    #[tokio::test]
    async fn subscribers_see_each_new_entry_once() {
        let agg = aggregator();
        let mut rx = agg.subscribe();
        agg.open_sweep("api.example.com");
        let o = outcome(ProbeKind::Fuzz, "v4", Method::PUT, "/api/v4/users", 403);
        agg.record("api.example.com", o.clone());
        agg.record("api.example.com", o.clone());
        agg.delete_host("api.example.com");

        match rx.recv().await.unwrap() {
            ResultEvent::Added { host, outcome } => {
                assert_eq!(host, "api.example.com");
                assert_eq!(*outcome, o);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), ResultEvent::HostDeleted { .. }));
    }

    #[test]
    fn restore_replaces_state_and_detaches_old_tickets() {
        let agg = aggregator();
        let old = agg.open_sweep("old.example.com");
        agg.record_for(&old, outcome(ProbeKind::Fuzz, "v1", Method::GET, "/v1", 200));

        let snapshot = AggregatorSnapshot {
            hosts: vec![HostResults {
                host: "new.example.com".to_string(),
                outcomes: vec![
                    outcome(ProbeKind::Original, "v2", Method::GET, "/v2", 200),
                    outcome(ProbeKind::Original, "v2", Method::GET, "/v2", 404),
                    outcome(ProbeKind::Fuzz, "v1", Method::POST, "/v1", 405),
                ],
            }],
        };
        assert_eq!(agg.restore(snapshot), 2);
        assert_eq!(agg.list_hosts(), vec!["new.example.com"]);
        assert_eq!(
            agg.record_for(&old, outcome(ProbeKind::Fuzz, "v3", Method::GET, "/v3", 200)),
            RecordStatus::HostGone
        );
        assert_eq!(agg.snapshot().result_count(), 2);
    }
}
