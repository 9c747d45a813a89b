// Shared test doubles for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use version_hunter::{HttpRequest, HttpResponse, HttpSender, HttpService, Method, TransportError};

/// In-memory sender: records every request and answers from a simple script
///
/// - paths containing `/v1/` (or ending in `/v1`) answer 200, others 404
/// - OPTIONS answers 204
/// - configured (method, path) pairs fail with a transport error
pub struct ScriptedSender {
    sent: Mutex<Vec<HttpRequest>>,
    failures: Vec<(Method, String)>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Vec::new(),
            delay: Duration::ZERO,
            gate: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, method: Method, path: &str) -> Self {
        self.failures.push((method, path.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Responses wait for a permit on `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpSender for ScriptedSender {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .failures
            .iter()
            .any(|(m, p)| *m == request.method && *p == request.path)
        {
            return Err(TransportError::Refused(request.service.base_url()));
        }

        let status = if request.method == Method::OPTIONS {
            204
        } else if request.path.contains("/v1/") || request.path.ends_with("/v1") {
            200
        } else {
            404
        };
        let mut response = HttpResponse::new(status, format!("{} {}", request.method, request.path));
        response.reason = if status == 200 { "OK" } else { "" }.to_string();
        Ok(response)
    }
}

pub fn service() -> HttpService {
    HttpService::new("api.example.com", 443, true)
}

pub fn get(path: &str) -> HttpRequest {
    HttpRequest::new(service(), Method::GET, path)
        .with_header("Host", "api.example.com")
        .with_header("Authorization", "Bearer attacker")
}

/// Poll until `cond` holds or a second passes
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
