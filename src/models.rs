// Core data models and traits for version-hunter

use crate::error::{TransportError, WireError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// HTTP methods seen in traffic or issued by probes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    HEAD,
    /// Any other token, kept verbatim (e.g. PROPFIND)
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("'{}' is not a valid HTTP method token", s));
        }
        Ok(match token.to_ascii_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "PATCH" => Method::PATCH,
            "OPTIONS" => Method::OPTIONS,
            "HEAD" => Method::HEAD,
            other => Method::Other(other.to_string()),
        })
    }
}

impl From<Method> for String {
    fn from(method: Method) -> Self {
        method.as_str().to_string()
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Target service of a request (where it is sent)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpService {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl HttpService {
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }

    /// `scheme://host[:port]`, omitting the port when it is the scheme default
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            format!("{}://{}", scheme, host)
        } else {
            format!("{}://{}:{}", scheme, host, self.port)
        }
    }
}

/// An HTTP request as seen by the interception layer.
///
/// `path` is the request target as it appears on the request line,
/// including any query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub service: HttpService,
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    pub fn new(service: HttpService, method: Method, path: impl Into<String>) -> Self {
        Self {
            service,
            method,
            path: path.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Copy of this request targeting another path; headers and body carried over
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Copy of this request using another method; headers and body carried over
    pub fn with_method(&self, method: Method) -> Self {
        Self {
            method,
            ..self.clone()
        }
    }

    pub fn host(&self) -> &str {
        &self.service.host
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.service.base_url(), self.path)
    }

    /// First header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Raw HTTP/1.1 rendering: request line, headers, blank line, body
    pub fn to_wire_text(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.path);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }

    /// Parse raw request text sent to `service`
    pub fn from_wire_text(service: HttpService, text: &str) -> Result<Self, WireError> {
        let (head, body) = split_message(text);
        let mut lines = head.into_iter();
        let request_line = lines.next().filter(|l| !l.trim().is_empty()).ok_or(WireError::Empty)?;

        let mut parts = request_line.split_whitespace();
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(m), Some(p)) => (m, p),
            _ => return Err(WireError::RequestLine(request_line.to_string())),
        };
        let method = method
            .parse::<Method>()
            .map_err(|_| WireError::RequestLine(request_line.to_string()))?;

        Ok(Self {
            service,
            method,
            path: path.to_string(),
            headers: parse_headers(lines)?,
            body: body.to_string(),
        })
    }
}

/// An HTTP response captured for a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    /// Raw body bytes as received
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: String::new(),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Body size in bytes
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Body as text; invalid UTF-8 is replaced
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn to_wire_text(&self) -> String {
        let mut out = if self.reason.is_empty() {
            format!("HTTP/1.1 {}\r\n", self.status)
        } else {
            format!("HTTP/1.1 {} {}\r\n", self.status, self.reason)
        };
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        out.push_str(&self.body_text());
        out
    }

    /// Parse raw response text; the body is taken as the UTF-8 bytes of the text
    pub fn from_wire_text(text: &str) -> Result<Self, WireError> {
        let (head, body) = split_message(text);
        let mut lines = head.into_iter();
        let status_line = lines.next().filter(|l| !l.trim().is_empty()).ok_or(WireError::Empty)?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(WireError::StatusLine(status_line.to_string()));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| WireError::StatusLine(status_line.to_string()))?;
        let reason = parts.next().unwrap_or_default().to_string();

        Ok(Self {
            status,
            reason,
            headers: parse_headers(lines)?,
            body: body.as_bytes().to_vec(),
        })
    }
}

/// Split a raw message into head lines and body at the first blank line
fn split_message(text: &str) -> (Vec<&str>, &str) {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    let (head, body) = match split {
        Some((idx, sep)) => (&text[..idx], &text[idx + sep..]),
        None => (text, ""),
    };
    let lines = head
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    (lines, body)
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<(String, String)>, WireError> {
    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WireError::Header(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(WireError::Header(line.to_string()));
        }
        // Only the separator space is dropped; the value is kept verbatim.
        let value = value.strip_prefix(' ').unwrap_or(value);
        headers.push((name.to_string(), value.to_string()));
    }
    Ok(headers)
}

/// Identity of a logical versioned endpoint, independent of the concrete version seen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    host: String,
    normalized_path: String,
}

impl EndpointKey {
    /// Query string and fragment are not part of the endpoint identity
    pub fn new(host: impl Into<String>, normalized_path: &str) -> Self {
        let end = normalized_path
            .find(|c| c == '?' || c == '#')
            .unwrap_or(normalized_path.len());
        Self {
            host: host.into(),
            normalized_path: normalized_path[..end].to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.host, self.normalized_path)
    }
}

/// Whether an outcome came from replaying the observed request or from fuzzing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeKind {
    Original,
    Fuzz,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Original => write!(f, "Original"),
            ProbeKind::Fuzz => write!(f, "Fuzz"),
        }
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Original" => Ok(ProbeKind::Original),
            "Fuzz" => Ok(ProbeKind::Fuzz),
            other => Err(format!("unknown probe kind '{}'", other)),
        }
    }
}

/// One probe that received a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub kind: ProbeKind,
    pub version: String,
    pub method: Method,
    pub path: String,
    pub status_code: u16,
    pub body_length: usize,
    pub request: HttpRequest,
    pub response: HttpResponse,
}

impl ProbeOutcome {
    pub fn new(kind: ProbeKind, version: impl Into<String>, request: HttpRequest, response: HttpResponse) -> Self {
        Self {
            kind,
            version: version.into(),
            method: request.method.clone(),
            path: request.path.clone(),
            status_code: response.status,
            body_length: response.body_len(),
            request,
            response,
        }
    }

    pub fn result_key(&self) -> ResultKey {
        ResultKey {
            method: self.method.clone(),
            path: self.path.clone(),
            version: self.version.clone(),
        }
    }
}

/// Uniqueness key of an outcome within a host's result set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub method: Method,
    pub path: String,
    pub version: String,
}

/// Capability to send a request and wait for its response
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}
