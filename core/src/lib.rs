//! Lifecycle of a single outbound HTTP request.
//!
//! # Overview
//! A `Request` is built from validated options, sent once with `submit`,
//! fed transport signals one at a time, and settles exactly once with
//! either a decoded payload or a `RequestError`. Observers can follow every
//! transition through topic subscriptions.
//!
//! # Design
//! - The transport is a trait seam. Hosts that do their own I/O use
//!   `HostTransport` and call `Request::handle`; the `ureq` feature adds a
//!   blocking `UreqTransport` driven by `Request::run`.
//! - States move only along the edges in `state.rs`; terminal states are
//!   final and later signals are ignored.
//! - Completion is exactly-once. Without a continuation the outcome is
//!   buffered on the request rather than dropped.

pub mod chunks;
pub mod error;
pub mod notify;
pub mod options;
pub mod parse;
pub mod request;
pub mod resolver;
pub mod state;
pub mod transport;

pub use bytes::Bytes;
pub use chunks::{Chunk, Encoding};
pub use error::{OptionsError, RequestError};
pub use notify::{Notification, Publisher, SubscriptionId, Topic};
pub use options::{Method, Options, RequestOptions};
pub use parse::{DataType, Payload};
pub use request::{Request, RequestBody, Timestamps};
pub use resolver::Outcome;
pub use state::RequestState;
pub use transport::{ConnectParams, HostTransport, ResponseHead, Transport, TransportEvent};

#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
