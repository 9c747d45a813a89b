// Endpoint claim tracking
// Each logical endpoint (host + normalized path) is fuzzed at most once per process

use crate::models::EndpointKey;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Set of claimed endpoints, grouped by host so a host can be released in one step.
#[derive(Debug, Default)]
pub struct EndpointDeduplicator {
    claims: RwLock<HashMap<String, HashSet<String>>>,
}

impl EndpointDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns true only for the first caller; membership test and
    /// insert happen under one write lock.
    pub fn try_claim(&self, key: &EndpointKey) -> bool {
        let mut claims = self.claims.write();
        claims
            .entry(key.host().to_string())
            .or_default()
            .insert(key.normalized_path().to_string())
    }

    pub fn is_claimed(&self, key: &EndpointKey) -> bool {
        self.claims
            .read()
            .get(key.host())
            .map_or(false, |paths| paths.contains(key.normalized_path()))
    }

    /// Drop every claim for `host`; returns how many were released
    pub fn clear_host(&self, host: &str) -> usize {
        self.claims.write().remove(host).map_or(0, |paths| paths.len())
    }

    pub fn len(&self) -> usize {
        self.claims.read().values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
