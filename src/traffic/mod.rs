pub mod har;
pub mod raw;

pub use har::HarParser;
pub use raw::RawRequestParser;

use crate::models::{HttpRequest, HttpService};
use url::Url;

/// Trait for loading captured traffic (HAR exports, raw request dumps, etc.)
pub trait TrafficParser {
    /// Parse a capture and return the requests in capture order
    fn parse(&self, path: &str) -> Result<Vec<HttpRequest>, String>;
}

/// Split an absolute URL into its service and request target (path + query)
pub(crate) fn split_url(url: &str) -> Option<(HttpService, String)> {
    let parsed = Url::parse(url).ok()?;
    let secure = match parsed.scheme() {
        "https" => true,
        "http" => false,
        _ => return None,
    };
    let host = parsed.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = parsed.port_or_known_default()?;
    let target = match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    };
    Some((HttpService::new(host, port, secure), target))
}

/// Parse a Host header value (`name`, `name:port`, `[v6]:port`)
pub(crate) fn split_host_header(value: &str) -> Option<(String, Option<u16>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => Some(p.parse().ok()?),
            None => None,
        };
        return Some((host.to_string(), port));
    }
    match value.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), Some(port.parse().ok()?))),
        None => Some((value.to_string(), None)),
    }
}
