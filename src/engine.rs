// Async HTTP engine for version-hunter
// Replays intercepted requests and probes with reqwest

use crate::config::HunterConfig;
use crate::error::TransportError;
use crate::models::{HttpRequest, HttpResponse, HttpSender};
use async_trait::async_trait;
use reqwest::{redirect, Client};
use std::time::Duration;
use url::Url;

/// Hop-by-hop and framing headers reqwest computes itself
const SKIPPED_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

pub struct ReplayEngine {
    client: Client,
    timeout_secs: u64,
}

impl ReplayEngine {
    pub fn new(config: &HunterConfig) -> Result<Self, TransportError> {
        let redirects = if config.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(redirects)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self {
            client,
            timeout_secs: config.request_timeout_secs,
        })
    }
}

#[async_trait]
impl HttpSender for ReplayEngine {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let raw_url = request.url();
        let url = Url::parse(&raw_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", raw_url, e)))?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.to_string()))?;

        let mut req = self.client.request(method, url);
        for (name, value) in &request.headers {
            if SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            req = req.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                TransportError::Refused(request.service.base_url())
            } else {
                TransportError::Request(e)
            }
        })?;

        let status = resp.status();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = resp.bytes().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.to_vec(),
        })
    }
}
