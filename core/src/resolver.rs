//! Exactly-once settlement of a request's outcome.
//!
//! # Design
//! The first call to `settle` wins and every later call is ignored. The
//! continuation is optional: without one the outcome is buffered, and a
//! continuation registered afterwards fires immediately with a copy of it.
//! A failure nobody looked at is logged when the resolver is dropped. An
//! abort is the caller's own doing and is not logged.

use std::cell::Cell;
use std::fmt;

use log::{debug, warn};

use crate::error::RequestError;
use crate::parse::Payload;

pub type Outcome = Result<Payload, RequestError>;

/// Caller-supplied completion callback.
pub type Continuation = Box<dyn FnOnce(Outcome) + Send>;

#[derive(Default)]
pub struct CompletionResolver {
    continuation: Option<Continuation>,
    outcome: Option<Outcome>,
    settled: bool,
    observed: Cell<bool>,
}

impl CompletionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the completion callback, replacing any earlier one. Fires
    /// immediately when the outcome is already known and still buffered.
    pub fn set_continuation(&mut self, continuation: Continuation) {
        if self.settled {
            match &self.outcome {
                Some(outcome) => {
                    self.observed.set(true);
                    continuation(outcome.clone());
                }
                None => debug!("outcome already taken; continuation not called"),
            }
            return;
        }
        if self.continuation.replace(continuation).is_some() {
            debug!("replaced an earlier completion continuation");
        }
    }

    /// Record the outcome. Returns `false`, and does nothing, if an outcome
    /// was already recorded.
    pub fn settle(&mut self, outcome: Outcome) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        match self.continuation.take() {
            Some(continuation) => {
                self.observed.set(true);
                self.outcome = Some(outcome.clone());
                continuation(outcome);
            }
            None => self.outcome = Some(outcome),
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        if self.outcome.is_some() {
            self.observed.set(true);
        }
        self.outcome.as_ref()
    }

    /// Move the buffered outcome out. Settlement is still permanent.
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        let outcome = self.outcome.take();
        if outcome.is_some() {
            self.observed.set(true);
        }
        outcome
    }

    /// The buffered failure, if nobody has looked at it yet.
    fn unobserved_failure(&self) -> Option<&RequestError> {
        if self.observed.get() {
            return None;
        }
        match &self.outcome {
            Some(Err(RequestError::Aborted)) => None,
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }
}

impl Drop for CompletionResolver {
    fn drop(&mut self) {
        if let Some(err) = self.unobserved_failure() {
            warn!("request failed and the outcome was never observed: {err}");
        }
    }
}

impl fmt::Debug for CompletionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionResolver")
            .field("has_continuation", &self.continuation.is_some())
            .field("settled", &self.settled)
            .field("outcome", &self.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<Outcome>>>, Continuation) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, Box::new(move |o| sink.lock().unwrap().push(o)))
    }

    #[test]
    fn first_settlement_wins() {
        let (calls, continuation) = recorder();
        let mut resolver = CompletionResolver::new();
        resolver.set_continuation(continuation);

        assert!(resolver.settle(Ok(Payload::Text("first".into()))));
        assert!(!resolver.settle(Err(RequestError::Aborted)));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], Ok(Payload::Text("first".into())));
        assert_eq!(resolver.outcome(), Some(&Ok(Payload::Text("first".into()))));
    }

    #[test]
    fn outcome_is_buffered_without_continuation() {
        let mut resolver = CompletionResolver::new();
        resolver.settle(Err(RequestError::Transport("refused".into())));
        assert!(resolver.is_settled());
        assert_eq!(
            resolver.take_outcome(),
            Some(Err(RequestError::Transport("refused".into())))
        );
        assert!(resolver.take_outcome().is_none());
        assert!(!resolver.settle(Ok(Payload::Text(String::new()))));
    }

    #[test]
    fn late_continuation_fires_with_buffered_outcome() {
        let mut resolver = CompletionResolver::new();
        resolver.settle(Err(RequestError::Aborted));

        let (calls, continuation) = recorder();
        resolver.set_continuation(continuation);
        assert_eq!(*calls.lock().unwrap(), vec![Err(RequestError::Aborted)]);
    }

    #[test]
    fn aborted_outcome_is_not_reported_as_unobserved() {
        let mut resolver = CompletionResolver::new();
        resolver.settle(Err(RequestError::Aborted));
        assert!(resolver.unobserved_failure().is_none());
    }

    #[test]
    fn unobserved_failure_until_read() {
        let mut resolver = CompletionResolver::new();
        resolver.settle(Err(RequestError::Transport("reset".into())));
        assert_eq!(
            resolver.unobserved_failure(),
            Some(&RequestError::Transport("reset".into()))
        );

        assert!(resolver.outcome().is_some());
        assert!(resolver.unobserved_failure().is_none());
    }

    #[test]
    fn success_is_never_reported() {
        let mut resolver = CompletionResolver::new();
        resolver.settle(Ok(Payload::Text("ok".into())));
        assert!(resolver.unobserved_failure().is_none());
    }
}
