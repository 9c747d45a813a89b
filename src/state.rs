// Session persistence for version-hunter
//
// The whole result set is stored as one JSON string under a fixed key:
//
//   {"schema": 1, "hosts": {"api.example.com": [ {record}, ... ], ...}}
//
// Each record flattens a ProbeOutcome; request and response are kept as raw
// HTTP text plus the host/port/secure needed to rebuild the request on load.
// Host order and record order are preserved. Unversioned blobs (a bare host
// map with requestString/responseString fields) are still accepted.
//
// A blob that fails to decode is rejected as a whole; `load` then starts empty.

use crate::aggregator::{AggregatorSnapshot, HostResults, ResultAggregator};
use crate::detector::detect;
use crate::error::StateError;
use crate::models::{EndpointKey, HttpRequest, HttpResponse, HttpService, Method, ProbeKind, ProbeOutcome};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// One flattened outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub length: usize,
    #[serde(alias = "requestString")]
    pub request_text: String,
    #[serde(alias = "responseString")]
    pub response_text: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    /// Base64 of the response body when it is not valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_base64: Option<String>,
}

impl PersistedRecord {
    pub fn from_outcome(outcome: &ProbeOutcome) -> Self {
        let service = &outcome.request.service;
        Self {
            kind: outcome.kind.to_string(),
            version: outcome.version.clone(),
            method: outcome.method.to_string(),
            path: outcome.path.clone(),
            status_code: outcome.status_code,
            length: outcome.body_length,
            request_text: outcome.request.to_wire_text(),
            response_text: outcome.response.to_wire_text(),
            host: service.host.clone(),
            port: service.port,
            secure: service.secure,
            response_body_base64: std::str::from_utf8(&outcome.response.body)
                .is_err()
                .then(|| STANDARD.encode(&outcome.response.body)),
        }
    }

    pub fn to_outcome(&self) -> Result<ProbeOutcome, String> {
        let kind: ProbeKind = self.kind.parse()?;
        let method: Method = self.method.parse()?;
        if !is_version_token(&self.version) {
            return Err(format!("'{}' is not a version token", self.version));
        }
        if self.host.is_empty() {
            return Err("missing service host".to_string());
        }

        let service = HttpService::new(self.host.clone(), self.port, self.secure);
        let request = HttpRequest::from_wire_text(service, &self.request_text)
            .map_err(|e| format!("request text: {}", e))?;
        if request.method != method || request.path != self.path {
            return Err(format!(
                "request line '{} {}' does not match record '{} {}'",
                request.method, request.path, method, self.path
            ));
        }
        let mut response = HttpResponse::from_wire_text(&self.response_text)
            .map_err(|e| format!("response text: {}", e))?;
        if let Some(encoded) = &self.response_body_base64 {
            response.body = STANDARD
                .decode(encoded)
                .map_err(|e| format!("response body: {}", e))?;
        }

        Ok(ProbeOutcome {
            kind,
            version: self.version.clone(),
            method,
            path: self.path.clone(),
            status_code: self.status_code,
            body_length: self.length,
            request,
            response,
        })
    }
}

fn is_version_token(token: &str) -> bool {
    token
        .strip_prefix('v')
        .map_or(false, |n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Host → records, serialized as a JSON object whose key order is kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRecords(pub Vec<(String, Vec<PersistedRecord>)>);

impl Serialize for HostRecords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (host, records) in &self.0 {
            map.serialize_entry(host, records)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HostRecords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedHosts;

        impl<'de> Visitor<'de> for OrderedHosts {
            type Value = HostRecords;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of host to result records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut hosts: Vec<(String, Vec<PersistedRecord>)> = Vec::new();
                while let Some((host, records)) = access.next_entry::<String, Vec<PersistedRecord>>()? {
                    if hosts.iter().any(|(h, _)| *h == host) {
                        return Err(serde::de::Error::custom(format!("duplicate host '{}'", host)));
                    }
                    hosts.push((host, records));
                }
                Ok(HostRecords(hosts))
            }
        }

        deserializer.deserialize_map(OrderedHosts)
    }
}

/// Versioned document stored under the state key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateDocument {
    pub schema: u32,
    pub hosts: HostRecords,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedBlob {
    Versioned(StateDocument),
    Legacy(HostRecords),
}

/// Serialize a snapshot into the persisted blob
pub fn encode(snapshot: &AggregatorSnapshot) -> Result<String, StateError> {
    let hosts = snapshot
        .hosts
        .iter()
        .map(|h| {
            (
                h.host.clone(),
                h.outcomes.iter().map(PersistedRecord::from_outcome).collect(),
            )
        })
        .collect();
    let document = StateDocument {
        schema: STATE_SCHEMA_VERSION,
        hosts: HostRecords(hosts),
    };
    Ok(serde_json::to_string(&document)?)
}

/// Parse a persisted blob. Any invalid record rejects the whole blob.
pub fn decode(blob: &str) -> Result<AggregatorSnapshot, StateError> {
    let hosts = match serde_json::from_str::<PersistedBlob>(blob)? {
        PersistedBlob::Versioned(doc) if doc.schema == STATE_SCHEMA_VERSION => doc.hosts,
        PersistedBlob::Versioned(doc) => return Err(StateError::UnsupportedSchema(doc.schema)),
        PersistedBlob::Legacy(hosts) => {
            debug!(hosts = hosts.0.len(), "decoding unversioned state blob");
            hosts
        }
    };

    let mut snapshot = AggregatorSnapshot::default();
    for (host, records) in hosts.0 {
        let mut outcomes = Vec::with_capacity(records.len());
        for (index, mut record) in records.into_iter().enumerate() {
            // Older records carry no service; the map key names the host.
            if record.host.is_empty() {
                record.host = host.clone();
            }
            if record.port == 0 {
                record.port = if record.secure { 443 } else { 80 };
            }
            let outcome = record.to_outcome().map_err(|reason| StateError::InvalidRecord {
                host: host.clone(),
                index,
                reason,
            })?;
            outcomes.push(outcome);
        }
        snapshot.hosts.push(HostResults { host, outcomes });
    }
    Ok(snapshot)
}

/// Key/value string storage provided by the hosting environment
pub trait StateStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, StateError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), StateError>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON file holding a key → string object
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>, StateError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&data)?)
    }
}

impl StateStore for FileStateStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, StateError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut values = self.read_all().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "overwriting unreadable state file");
            HashMap::new()
        });
        values.insert(key.to_string(), value.to_string());

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Persist the aggregator's current results. Returns the number of results written.
pub fn save(store: &dyn StateStore, key: &str, aggregator: &ResultAggregator) -> Result<usize, StateError> {
    let snapshot = aggregator.snapshot();
    store.set_string(key, &encode(&snapshot)?)?;
    info!(hosts = snapshot.hosts.len(), results = snapshot.result_count(), "state saved");
    Ok(snapshot.result_count())
}

/// Restore persisted results into `aggregator` and re-claim their endpoints.
///
/// Missing state is normal; unreadable or invalid state is logged and leaves
/// the aggregator empty. Returns the number of results restored.
pub fn load(store: &dyn StateStore, key: &str, aggregator: &ResultAggregator) -> usize {
    let blob = match store.get_string(key) {
        Ok(Some(blob)) if !blob.trim().is_empty() => blob,
        Ok(_) => {
            debug!(key, "no persisted state");
            return 0;
        }
        Err(e) => {
            warn!(key, error = %e, "could not read persisted state, starting empty");
            aggregator.restore(AggregatorSnapshot::default());
            return 0;
        }
    };

    let snapshot = match decode(&blob) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(key, error = %e, "discarding invalid persisted state, starting empty");
            aggregator.restore(AggregatorSnapshot::default());
            return 0;
        }
    };

    let dedup = aggregator.deduplicator();
    let mut claimed = 0;
    for host in &snapshot.hosts {
        for outcome in &host.outcomes {
            if let Some(detection) = detect(&outcome.path) {
                if dedup.try_claim(&EndpointKey::new(host.host.clone(), &detection.normalized_path)) {
                    claimed += 1;
                }
            }
        }
    }

    let restored = aggregator.restore(snapshot);
    info!(results = restored, endpoints = claimed, "state restored");
    restored
}
