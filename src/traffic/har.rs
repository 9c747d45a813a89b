// HAR capture parser for version-hunter
// Uses serde_json to read HAR 1.2 exports (log.entries[].request)

use super::{split_url, TrafficParser};
use crate::models::{HttpRequest, Method};
use serde_json::Value;
use tracing::debug;

pub struct HarParser;

impl TrafficParser for HarParser {
    fn parse(&self, file_path: &str) -> Result<Vec<HttpRequest>, String> {
        let data = std::fs::read_to_string(file_path)
            .map_err(|e| format!("Failed to read {}: {}", file_path, e))?;
        let json: Value = serde_json::from_str(&data)
            .map_err(|e| format!("Failed to parse JSON: {}", e))?;
        let entries = json
            .get("log")
            .and_then(|log| log.get("entries"))
            .and_then(|entries| entries.as_array())
            .ok_or_else(|| format!("{} is not a HAR file (missing log.entries)", file_path))?;

        let mut requests = Vec::new();
        for entry in entries {
            if let Some(request) = entry.get("request").and_then(parse_request) {
                requests.push(request);
            } else {
                debug!("skipping HAR entry without a usable request");
            }
        }
        Ok(requests)
    }
}

fn parse_request(request: &Value) -> Option<HttpRequest> {
    let method: Method = request.get("method")?.as_str()?.parse().ok()?;
    let (service, target) = split_url(request.get("url")?.as_str()?)?;
    let mut parsed = HttpRequest::new(service, method, target);

    if let Some(headers) = request.get("headers").and_then(|h| h.as_array()) {
        for header in headers {
            let name = header.get("name").and_then(|n| n.as_str());
            let value = header.get("value").and_then(|v| v.as_str());
            if let (Some(name), Some(value)) = (name, value) {
                // HTTP/2 pseudo-headers (:authority, :path, ...)
                if name.starts_with(':') {
                    continue;
                }
                parsed = parsed.with_header(name, value);
            }
        }
    }

    if let Some(text) = request
        .get("postData")
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
    {
        parsed = parsed.with_body(text);
    }
    Some(parsed)
}
