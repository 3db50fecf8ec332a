//! Lifecycle states of a request and the edges between them.
//!
//! # Design
//! The transition table is the single authority on which moves are legal.
//! `Request` asks `can_transition_to` before every change, so an illegal
//! move (including any move out of a terminal state) is a no-op rather than
//! a panic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Constructed, nothing sent yet.
    Idle,
    /// Request written, waiting for the response head.
    Pending,
    /// Response head received, body fragments arriving.
    Receiving,
    /// Body complete and decoded successfully.
    Received,
    /// Transport error, status >= 400, or decode failure.
    Failed,
    /// Cancelled by the caller.
    Aborted,
}

impl RequestState {
    /// `Received`, `Failed` and `Aborted` have no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Received | Self::Failed | Self::Aborted)
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;

        matches!(
            (self, next),
            (Idle, Pending)
                | (Pending, Receiving)
                | (Receiving, Received)
                | (Pending | Receiving, Failed)
                | (Idle | Pending | Receiving, Aborted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Receiving => "receiving",
            Self::Received => "received",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::RequestState::{self, *};

    const ALL: [RequestState; 6] = [Idle, Pending, Receiving, Received, Failed, Aborted];

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn abort_reachable_from_every_non_terminal_state() {
        for from in ALL.iter().copied().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(Aborted), "{from} -> aborted");
        }
    }

    #[test]
    fn received_only_through_receiving() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Received), from == Receiving);
        }
    }

    #[test]
    fn idle_cannot_skip_pending() {
        assert!(!Idle.can_transition_to(Receiving));
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Received));
    }

    #[test]
    fn no_self_loops() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state} -> {state}");
        }
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_value(Receiving).unwrap(), "receiving");
        let back: RequestState = serde_json::from_str(r#""aborted""#).unwrap();
        assert_eq!(back, Aborted);
    }
}
