//! Scope filtering
//!
//! Decides which intercepted requests are considered at all. Only in-scope
//! traffic can trigger a version sweep.

use url::Url;

pub trait ScopeFilter: Send + Sync {
    fn is_in_scope(&self, url: &str) -> bool;
}

/// Everything is in scope
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ScopeFilter for AllowAll {
    fn is_in_scope(&self, _url: &str) -> bool {
        true
    }
}

/// Host pattern: `api.example.com` or `*.example.com`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    /// Matches the domain itself and any subdomain
    Wildcard(String),
}

impl HostPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(domain) => HostPattern::Wildcard(domain.to_string()),
            None => HostPattern::Exact(pattern),
        }
    }

    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            HostPattern::Exact(h) => host == *h,
            HostPattern::Wildcard(domain) => {
                host == *domain || host.ends_with(&format!(".{}", domain))
            }
        }
    }
}

/// Include/exclude host lists; excludes win, and an empty include list matches nothing
#[derive(Debug, Clone, Default)]
pub struct HostScope {
    pub include: Vec<HostPattern>,
    pub exclude: Vec<HostPattern>,
}

impl HostScope {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            include: patterns.into_iter().map(|p| HostPattern::parse(p.as_ref())).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude.push(HostPattern::parse(pattern));
        self
    }
}

impl ScopeFilter for HostScope {
    fn is_in_scope(&self, url: &str) -> bool {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            Some(host) => host,
            None => return false,
        };
        if self.exclude.iter().any(|p| p.matches(&host)) {
            return false;
        }
        self.include.iter().any(|p| p.matches(&host))
    }
}
