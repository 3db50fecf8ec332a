//! Blocking transport backed by a `ureq` agent.
//!
//! `end()` only marks the buffered request as ready. The exchange runs on
//! the first `next_event` call, so `submit` never waits on the network and an
//! `abort()` before that call means nothing is sent. The body is then read
//! lazily, one fragment per `next_event` call.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace};
use ureq::http;
use ureq::{Agent, Body, BodyReader};

use super::{ConnectParams, ResponseHead, Transport, TransportEvent};

const READ_CHUNK: usize = 8 * 1024;

pub struct UreqTransport {
    agent: Agent,
    params: Option<ConnectParams>,
    /// Ended and waiting for the first `next_event` to run the exchange.
    ready: Option<ConnectParams>,
    body: Vec<u8>,
    queue: VecDeque<TransportEvent>,
    reader: Option<BodyReader<'static>>,
    aborted: bool,
}

impl UreqTransport {
    /// 4xx/5xx responses are delivered as responses, not transport errors.
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self::with_agent(agent)
    }

    /// Use a preconfigured agent. It should have `http_status_as_error`
    /// disabled, otherwise error statuses surface as transport errors.
    pub fn with_agent(agent: Agent) -> Self {
        Self {
            agent,
            params: None,
            ready: None,
            body: Vec::new(),
            queue: VecDeque::new(),
            reader: None,
            aborted: false,
        }
    }

    fn exchange(&self, params: &ConnectParams) -> Result<http::Response<Body>, String> {
        let mut builder = http::Request::builder()
            .method(params.method.as_str())
            .uri(params.url());
        for (name, value) in &params.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        for (name, value) in connection_headers(params.keep_alive) {
            builder = builder.header(name, value);
        }

        if self.body.is_empty() {
            let request = builder.body(()).map_err(|e| e.to_string())?;
            self.agent.run(request).map_err(|e| e.to_string())
        } else {
            let request = builder.body(self.body.clone()).map_err(|e| e.to_string())?;
            self.agent.run(request).map_err(|e| e.to_string())
        }
    }

    /// Run the exchange and return the response head, keeping the body
    /// reader for later calls.
    fn perform(&mut self, params: &ConnectParams) -> TransportEvent {
        debug!("{} {}", params.method, params.url());
        let result = self.exchange(params);
        self.body.clear();
        match result {
            Ok(response) => {
                let status = response.status();
                let headers = response
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                        (name.as_str().to_string(), value)
                    })
                    .collect();
                self.reader = Some(response.into_body().into_reader());
                TransportEvent::Response(ResponseHead {
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or_default().to_string(),
                    headers,
                })
            }
            Err(e) => TransportEvent::Error(e),
        }
    }

    fn read_fragment(&mut self) -> Option<TransportEvent> {
        let reader = self.reader.as_mut()?;
        let mut buf = vec![0; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    self.reader = None;
                    return Some(TransportEvent::End);
                }
                Ok(n) => {
                    buf.truncate(n);
                    trace!("read {n} body bytes");
                    return Some(TransportEvent::Data(Bytes::from(buf)));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.reader = None;
                    return Some(TransportEvent::Error(e.to_string()));
                }
            }
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn open(&mut self, params: &ConnectParams) {
        self.params = Some(params.clone());
        self.ready = None;
        self.body.clear();
        self.queue.clear();
        self.reader = None;
    }

    fn write(&mut self, body: &[u8]) {
        self.body.extend_from_slice(body);
    }

    fn end(&mut self) {
        if self.aborted {
            return;
        }
        match self.params.take() {
            Some(params) => self.ready = Some(params),
            None => self
                .queue
                .push_back(TransportEvent::Error("request ended before it was opened".to_string())),
        }
    }

    fn abort(&mut self) {
        self.aborted = true;
        self.ready = None;
        self.queue.clear();
        self.reader = None;
    }

    fn next_event(&mut self) -> Option<TransportEvent> {
        if self.aborted {
            return None;
        }
        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }
        if let Some(params) = self.ready.take() {
            return Some(self.perform(&params));
        }
        self.read_fragment()
    }
}

/// `None` asks the server to close the connection after the response.
/// Intervals are sent in whole seconds, never below one.
fn connection_headers(keep_alive: Option<Duration>) -> Vec<(&'static str, String)> {
    match keep_alive {
        Some(interval) => vec![
            ("connection", "keep-alive".to_string()),
            ("keep-alive", format!("timeout={}", interval.as_secs().max(1))),
        ],
        None => vec![("connection", "close".to_string())],
    }
}
