// Raw request directory parser for version-hunter
// Uses walkdir to collect .http/.req files holding one raw HTTP request each

use super::{split_host_header, split_url, TrafficParser};
use crate::models::{HttpRequest, HttpService};
use tracing::warn;
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["http", "req"];

/// Reads request dumps; the target comes from an absolute-form request line or the Host header
pub struct RawRequestParser {
    /// Scheme for origin-form requests (absolute-form carries its own)
    pub secure: bool,
}

impl TrafficParser for RawRequestParser {
    fn parse(&self, dir_path: &str) -> Result<Vec<HttpRequest>, String> {
        let mut requests = Vec::new();
        for entry in WalkDir::new(dir_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let is_request = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| EXTENSIONS.contains(&ext));
            if !is_request {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())
                .map_err(|e| format!("Failed to read {:?}: {}", entry.path(), e))?;
            match self.parse_request(&content) {
                Ok(request) => requests.push(request),
                Err(reason) => warn!(file = ?entry.path(), %reason, "skipping raw request"),
            }
        }
        Ok(requests)
    }
}

impl RawRequestParser {
    pub fn parse_request(&self, content: &str) -> Result<HttpRequest, String> {
        let default_port = if self.secure { 443 } else { 80 };
        let placeholder = HttpService::new(String::new(), default_port, self.secure);
        let mut request = HttpRequest::from_wire_text(placeholder, content).map_err(|e| e.to_string())?;

        if request.path.starts_with("http://") || request.path.starts_with("https://") {
            let (service, target) = split_url(&request.path)
                .ok_or_else(|| format!("invalid absolute URL {}", request.path))?;
            request.service = service;
            request.path = target;
            return Ok(request);
        }

        let (host, port) = request
            .header("Host")
            .and_then(split_host_header)
            .ok_or_else(|| "missing or invalid Host header".to_string())?;
        request.service.host = host;
        request.service.port = port.unwrap_or(default_port);
        Ok(request)
    }
}
