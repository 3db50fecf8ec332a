//! The request controller: lifecycle state, timestamps and the public
//! `submit` / `abort` surface.
//!
//! # Design
//! `Request` owns its transport, its chunk accumulator, a publisher and a
//! completion resolver. Transport signals enter through `handle`, one at a
//! time, and every state change goes through `transition`, which consults
//! the table in `state.rs` and publishes exactly one `State` notification.
//! Signals that do not fit the current state, including anything after a
//! terminal state, are dropped without touching any field.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use log::{debug, trace, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::chunks::{Chunk, ChunkAccumulator};
use crate::error::{OptionsError, RequestError};
use crate::notify::{Notification, Publisher, SubscriptionId, Topic};
use crate::options::{Options, RequestOptions};
use crate::parse::{self, Payload};
use crate::resolver::{CompletionResolver, Outcome};
use crate::state::RequestState;
use crate::transport::{ResponseHead, Transport, TransportEvent};

/// Outbound request body passed to `submit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    /// Serialized as JSON before transmission.
    Json(serde_json::Value),
}

impl RequestBody {
    fn into_bytes(self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(bytes) => bytes,
            RequestBody::Text(text) => Bytes::from(text),
            RequestBody::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        RequestBody::Empty
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// Points in time at which lifecycle transitions first happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub submit: Option<SystemTime>,
    pub response: Option<SystemTime>,
    /// End of the response body.
    pub data: Option<SystemTime>,
    pub abort: Option<SystemTime>,
}

/// First write wins.
fn stamp(slot: &mut Option<SystemTime>) {
    if slot.is_none() {
        *slot = Some(SystemTime::now());
    }
}

/// A single outbound HTTP request and its lifecycle.
pub struct Request<T> {
    id: Uuid,
    options: Options,
    transport: T,
    state: RequestState,
    chunks: ChunkAccumulator,
    response: Option<ResponseHead>,
    data: Option<Payload>,
    error: Option<RequestError>,
    times: Timestamps,
    publisher: Publisher,
    resolver: CompletionResolver,
}

impl<T: Transport> Request<T> {
    /// Validate `options` and build an idle request.
    pub fn new(options: RequestOptions, transport: T) -> Result<Self, OptionsError> {
        let options = options.normalize()?;
        let id = Uuid::new_v4();
        debug!(
            "request {id} created: {} {}",
            options.method,
            options.connect_params().url()
        );
        Ok(Self {
            id,
            chunks: ChunkAccumulator::new(options.encoding),
            options,
            transport,
            state: RequestState::Idle,
            response: None,
            data: None,
            error: None,
            times: Timestamps::default(),
            publisher: Publisher::new(),
            resolver: CompletionResolver::new(),
        })
    }

    /// A `GET` request for `url` with default options.
    pub fn from_url(url: &str, transport: T) -> Result<Self, OptionsError> {
        Self::new(RequestOptions::new(url), transport)
    }

    /// Build from a loosely typed JSON options document.
    pub fn from_json_options(value: serde_json::Value, transport: T) -> Result<Self, OptionsError> {
        Self::new(RequestOptions::from_value(value)?, transport)
    }

    /// Set the completion continuation. It runs exactly once; if the request
    /// has already settled it runs immediately.
    pub fn on_complete<F>(&mut self, continuation: F) -> &mut Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.resolver.set_continuation(Box::new(continuation));
        self
    }

    pub fn subscribe<F>(&mut self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_>) + Send + 'static,
    {
        self.publisher.subscribe(topic, callback)
    }

    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_>) + Send + 'static,
    {
        self.publisher.subscribe_all(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Send the request. Only valid from `Idle`; any later call is a no-op.
    ///
    /// The body is dropped for methods that do not carry one.
    pub fn submit(&mut self, body: impl Into<RequestBody>) -> &mut Self {
        if self.state != RequestState::Idle {
            debug!("request {}: submit ignored in state {}", self.id, self.state);
            return self;
        }

        let body = body.into();
        let mut params = self.options.connect_params();
        let payload = if self.options.method.allows_body() {
            if matches!(body, RequestBody::Json(_)) && params.header("content-type").is_none() {
                params
                    .headers
                    .push(("content-type".to_string(), "application/json".to_string()));
            }
            body.into_bytes()
        } else {
            if body != RequestBody::Empty {
                debug!("request {}: dropping body for {}", self.id, self.options.method);
            }
            Bytes::new()
        };

        self.transport.open(&params);
        stamp(&mut self.times.submit);
        self.transition(RequestState::Pending);
        if !payload.is_empty() {
            self.transport.write(&payload);
        }
        self.transport.end();
        self
    }

    /// Serialize `value` as JSON and submit it. Serialization errors are
    /// returned before anything is sent, leaving the request idle.
    pub fn submit_json<S: Serialize>(&mut self, value: &S) -> Result<&mut Self, RequestError> {
        let value = serde_json::to_value(value).map_err(|e| RequestError::Encode(e.to_string()))?;
        Ok(self.submit(RequestBody::Json(value)))
    }

    /// Cancel the request. A no-op once the request is terminal.
    pub fn abort(&mut self) -> &mut Self {
        if self.state.is_terminal() {
            return self;
        }
        if self.state != RequestState::Idle {
            self.transport.abort();
        }
        self.chunks.discard_pending();
        stamp(&mut self.times.abort);
        self.transition(RequestState::Aborted);

        self.publisher.publish(&Notification::Error(&RequestError::Aborted));
        self.resolver.settle(Err(RequestError::Aborted));
        self
    }

    /// Dispatch one transport signal.
    pub fn handle(&mut self, event: TransportEvent) -> &mut Self {
        match event {
            TransportEvent::Response(head) => self.on_response(head),
            TransportEvent::Data(fragment) => self.on_data(fragment),
            TransportEvent::End => self.on_end(),
            TransportEvent::Error(message) => self.on_error(message),
        }
        self
    }

    /// Pull events from the transport until it has none left or the request
    /// is terminal.
    pub fn run(&mut self) -> &mut Self {
        while !self.state.is_terminal() {
            match self.transport.next_event() {
                Some(event) => {
                    self.handle(event);
                }
                None => break,
            }
        }
        self
    }

    fn on_response(&mut self, head: ResponseHead) {
        if self.state != RequestState::Pending {
            self.ignore("response");
            return;
        }
        stamp(&mut self.times.response);
        debug!("request {}: response {} {}", self.id, head.status, head.reason);
        self.response = Some(head);
        self.transition(RequestState::Receiving);
        if let Some(head) = &self.response {
            self.publisher.publish(&Notification::Response(head));
        }
    }

    fn on_data(&mut self, fragment: Bytes) {
        if self.state != RequestState::Receiving {
            self.ignore("data");
            return;
        }
        trace!("request {}: {} byte fragment", self.id, fragment.len());
        if let Some(chunk) = self.chunks.push(fragment) {
            self.publisher.publish(&Notification::Chunk(chunk));
        }
    }

    fn on_end(&mut self) {
        if self.state != RequestState::Receiving {
            self.ignore("end");
            return;
        }
        if let Some(tail) = self.chunks.seal() {
            self.publisher.publish(&Notification::Chunk(tail));
        }
        stamp(&mut self.times.data);

        let body = self.chunks.assemble();
        let outcome = match &self.response {
            Some(head) => parse::parse_response(head, body, self.options.data_type),
            None => Err(RequestError::Transport("end of stream without a response".to_string())),
        };
        self.complete(outcome);
    }

    fn on_error(&mut self, message: String) {
        if !matches!(self.state, RequestState::Pending | RequestState::Receiving) {
            self.ignore("error");
            return;
        }
        self.chunks.discard_pending();
        self.complete(Err(RequestError::Transport(message)));
    }

    fn complete(&mut self, outcome: Outcome) {
        let next = if outcome.is_ok() {
            RequestState::Received
        } else {
            RequestState::Failed
        };
        if !self.transition(next) {
            return;
        }
        match &outcome {
            Ok(payload) => {
                self.data = Some(payload.clone());
                self.publisher.publish(&Notification::Data(payload));
            }
            Err(err) => {
                debug!("request {} failed: {err}", self.id);
                self.error = Some(err.clone());
                self.publisher.publish(&Notification::Error(err));
            }
        }
        self.resolver.settle(outcome);
    }

    fn transition(&mut self, next: RequestState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!("request {}: rejected transition {} -> {next}", self.id, self.state);
            return false;
        }
        debug!("request {}: {} -> {next}", self.id, self.state);
        self.state = next;
        self.publisher.publish(&Notification::State(next));
        true
    }

    fn ignore(&self, signal: &str) {
        if self.state.is_terminal() {
            trace!("request {}: {signal} after {} ignored", self.id, self.state);
        } else {
            warn!("request {}: unexpected {signal} in state {}", self.id, self.state);
        }
    }
}

impl<T> Request<T> {
    /// Correlation id for log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn chunks(&self) -> &[Chunk] {
        self.chunks.chunks()
    }

    /// Decoded payload, set only on successful completion.
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Failure, set only when the request ends `Failed`.
    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn status_message(&self) -> Option<&str> {
        self.response.as_ref().map(|r| r.reason.as_str())
    }

    pub fn response_headers(&self) -> Option<&[(String, String)]> {
        self.response.as_ref().map(|r| r.headers.as_slice())
    }

    pub fn timestamps(&self) -> &Timestamps {
        &self.times
    }

    pub fn time_submit(&self) -> Option<SystemTime> {
        self.times.submit
    }

    pub fn time_response(&self) -> Option<SystemTime> {
        self.times.response
    }

    pub fn time_data(&self) -> Option<SystemTime> {
        self.times.data
    }

    pub fn time_abort(&self) -> Option<SystemTime> {
        self.times.abort
    }

    pub fn is_settled(&self) -> bool {
        self.resolver.is_settled()
    }

    /// Buffered outcome, for callers that did not register a continuation.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.resolver.outcome()
    }

    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.resolver.take_outcome()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Direct access for hosts that drive a pull-style transport by hand.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("response", &self.response)
            .field("chunks", &self.chunks.chunks().len())
            .field("data", &self.data)
            .field("error", &self.error)
            .field("times", &self.times)
            .finish_non_exhaustive()
    }
}
