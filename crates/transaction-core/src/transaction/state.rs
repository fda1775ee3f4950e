use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::transaction::TransactionKind;

/// State of a SIP transaction, per the RFC 3261 §17 state machines with the
/// RFC 6026 Accepted state added to both INVITE machines.
///
/// Which states a transaction passes through depends on its
/// [`TransactionKind`]; [`AtomicTransactionState::validate_transition`]
/// holds the allowed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created, nothing sent or received yet
    Initial,
    /// INVITE client: request sent, no response yet
    Calling,
    /// Non-INVITE client and server: request sent or received, no response yet
    Trying,
    /// A provisional response was received (client) or sent (server).
    /// INVITE server transactions start here.
    Proceeding,
    /// A final response was received (client) or sent (server); waiting out
    /// retransmissions. For INVITE, only non-2xx finals lead here.
    Completed,
    /// INVITE only: a 2xx was received or sent (RFC 6026)
    Accepted,
    /// INVITE server: the ACK for a non-2xx final arrived
    Confirmed,
    /// Finished. Absorbing.
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateValue {
    Initial = 0,
    Calling = 1,
    Trying = 2,
    Proceeding = 3,
    Completed = 4,
    Accepted = 5,
    Confirmed = 6,
    Terminated = 7,
}

impl From<TransactionState> for StateValue {
    fn from(state: TransactionState) -> Self {
        match state {
            TransactionState::Initial => StateValue::Initial,
            TransactionState::Calling => StateValue::Calling,
            TransactionState::Trying => StateValue::Trying,
            TransactionState::Proceeding => StateValue::Proceeding,
            TransactionState::Completed => StateValue::Completed,
            TransactionState::Accepted => StateValue::Accepted,
            TransactionState::Confirmed => StateValue::Confirmed,
            TransactionState::Terminated => StateValue::Terminated,
        }
    }
}

impl From<u8> for TransactionState {
    fn from(value: u8) -> Self {
        match value {
            0 => TransactionState::Initial,
            1 => TransactionState::Calling,
            2 => TransactionState::Trying,
            3 => TransactionState::Proceeding,
            4 => TransactionState::Completed,
            5 => TransactionState::Accepted,
            6 => TransactionState::Confirmed,
            // Unknown values read as finished
            _ => TransactionState::Terminated,
        }
    }
}

/// A `TransactionState` that can be read from any task.
///
/// Only the transaction's own command loop writes it; the provider and the
/// TU read it through [`get`](Self::get).
#[derive(Debug)]
pub struct AtomicTransactionState {
    value: AtomicU8,
}

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        Self {
            value: AtomicU8::new(StateValue::from(state) as u8),
        }
    }

    pub fn get(&self) -> TransactionState {
        TransactionState::from(self.value.load(Ordering::Acquire))
    }

    /// Stores `new_state`, returning the previous state.
    pub fn set(&self, new_state: TransactionState) -> TransactionState {
        let previous = self.value.swap(StateValue::from(new_state) as u8, Ordering::AcqRel);
        TransactionState::from(previous)
    }

    /// Moves from `current_state` to `new_state` if the state still is
    /// `current_state`. Termination always succeeds.
    pub fn transition_if(&self, current_state: TransactionState, new_state: TransactionState) -> bool {
        let current = StateValue::from(current_state) as u8;
        let new = StateValue::from(new_state) as u8;
        match self
            .value
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(actual) if actual == new => true,
            Err(_) if new_state.is_terminated() => {
                self.value.store(new, Ordering::Release);
                true
            }
            Err(_) => false,
        }
    }

    /// Checks a transition against the state machine for `kind`.
    ///
    /// Staying in the same state and moving to Terminated are always allowed,
    /// except out of Terminated itself.
    pub fn validate_transition(
        kind: TransactionKind,
        current_state: TransactionState,
        new_state: TransactionState,
    ) -> std::result::Result<(), String> {
        use TransactionState::*;

        if current_state == Terminated && new_state != Terminated {
            return Err("Cannot transition from Terminated state".to_string());
        }
        if current_state == new_state || new_state == Terminated {
            return Ok(());
        }

        let allowed = match kind {
            TransactionKind::InviteClient => matches!(
                (current_state, new_state),
                (Initial, Calling)
                    | (Calling, Proceeding)
                    | (Calling | Proceeding, Completed)
                    | (Calling | Proceeding, Accepted)
            ),
            TransactionKind::NonInviteClient => matches!(
                (current_state, new_state),
                (Initial, Trying) | (Trying, Proceeding) | (Trying | Proceeding, Completed)
            ),
            TransactionKind::InviteServer => matches!(
                (current_state, new_state),
                (Initial, Proceeding)
                    | (Proceeding, Completed)
                    | (Proceeding, Accepted)
                    | (Completed, Confirmed)
            ),
            TransactionKind::NonInviteServer => matches!(
                (current_state, new_state),
                (Initial, Trying) | (Trying, Proceeding) | (Trying | Proceeding, Completed)
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition for {:?}: {:?} -> {:?}",
                kind, current_state, new_state
            ))
        }
    }
}
