//! Topic-based publish/subscribe for request observers.
//!
//! # Design
//! `Request` embeds a `Publisher` and calls `publish` once per transition
//! or event. Notifications borrow from the request, so observers that need
//! to keep a value clone it.

use std::fmt;

use crate::chunks::Chunk;
use crate::error::RequestError;
use crate::parse::Payload;
use crate::state::RequestState;
use crate::transport::ResponseHead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    State,
    /// One notification per decoded unit. In binary mode that is each
    /// fragment; in text mode a fragment that completes no character
    /// publishes nothing, and its bytes arrive with a later chunk.
    Chunk,
    Response,
    Data,
    /// Failure notifications. Also published as the aborted outcome.
    Error,
}

/// A single published event.
#[derive(Debug, Clone, Copy)]
pub enum Notification<'a> {
    State(RequestState),
    /// The chunk just appended to the accumulator, not the raw fragment.
    Chunk(&'a Chunk),
    Response(&'a ResponseHead),
    Data(&'a Payload),
    Error(&'a RequestError),
}

impl Notification<'_> {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::State(_) => Topic::State,
            Notification::Chunk(_) => Topic::Chunk,
            Notification::Response(_) => Topic::Response,
            Notification::Data(_) => Topic::Data,
            Notification::Error(_) => Topic::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Notification<'_>) + Send>;

struct Subscription {
    id: SubscriptionId,
    topic: Option<Topic>,
    callback: Subscriber,
}

#[derive(Default)]
pub struct Publisher {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for one topic.
    pub fn subscribe<F>(&mut self, topic: Topic, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_>) + Send + 'static,
    {
        self.insert(Some(topic), Box::new(callback))
    }

    /// Register `callback` for every topic.
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification<'_>) + Send + 'static,
    {
        self.insert(None, Box::new(callback))
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver `notification` to matching subscribers in registration order.
    pub fn publish(&mut self, notification: &Notification<'_>) {
        let topic = notification.topic();
        for sub in &mut self.subscriptions {
            if sub.topic.map_or(true, |t| t == topic) {
                (sub.callback)(notification);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    fn insert(&mut self, topic: Option<Topic>, callback: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, topic, callback });
        id
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
