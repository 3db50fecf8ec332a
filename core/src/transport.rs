//! The seam between a request and the HTTP client that performs its I/O.
//!
//! # Design
//! A `Transport` receives outbound calls (`open`, `write`, `end`, `abort`)
//! and produces inbound `TransportEvent`s. Events reach the request one at a
//! time, either because the host calls `Request::handle` itself (push style,
//! see `HostTransport`) or because `Request::run` pulls them from
//! `next_event` (pull style, see `UreqTransport`). Either way dispatch is
//! serialized through `&mut Request`.

use std::time::Duration;

use bytes::Bytes;

use crate::options::Method;

#[cfg(feature = "ureq")]
mod blocking;

#[cfg(feature = "ureq")]
pub use self::blocking::UreqTransport;

/// Everything a transport needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// Path including any query string.
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    /// `None` disables keep-alive.
    pub keep_alive: Option<Duration>,
}

impl ConnectParams {
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Absolute URL; the port is omitted when it is the scheme default.
    pub fn url(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            format!("{}://{}{}", self.scheme(), self.host, self.path)
        } else {
            format!("{}://{}:{}{}", self.scheme(), self.host, self.port, self.path)
        }
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

/// A signal from the transport. A well-behaved transport emits at most one
/// `Response`, then `Data` in order, then one `End`; or a single `Error` in
/// place of the response or mid-body. Nothing follows `abort()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Response(ResponseHead),
    Data(Bytes),
    End,
    Error(String),
}

pub trait Transport {
    /// Obtain a live request handle for `params`.
    fn open(&mut self, params: &ConnectParams);

    fn write(&mut self, body: &[u8]);

    /// Close the request side; the response may now arrive.
    fn end(&mut self);

    /// Cancel the in-flight exchange and stop emitting events.
    fn abort(&mut self);

    /// Next pending signal for pull-style transports. Push-style transports
    /// keep the default and deliver events through `Request::handle`.
    fn next_event(&mut self) -> Option<TransportEvent> {
        None
    }
}

/// Push-style transport for hosts that perform the I/O themselves.
///
/// Records the outbound request so the host can execute it, then the host
/// feeds the response back with `Request::handle`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTransport {
    pub params: Option<ConnectParams>,
    pub body: Vec<u8>,
    pub writes: usize,
    pub ended: bool,
    pub aborted: bool,
}

impl HostTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for HostTransport {
    fn open(&mut self, params: &ConnectParams) {
        self.params = Some(params.clone());
    }

    fn write(&mut self, body: &[u8]) {
        self.writes += 1;
        self.body.extend_from_slice(body);
    }

    fn end(&mut self) {
        self.ended = true;
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
