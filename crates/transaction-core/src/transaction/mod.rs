//! Types shared by client and server transactions: keys, states, events,
//! the command loop and the logic trait each state machine implements.

pub mod key;
pub mod logic;
pub mod runner;
pub mod state;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use sigstack_sip_core::{Message, Method, Request, Response};
use sigstack_sip_transport::Transport;

use crate::timer::{TimerSettings, TimerType};

pub use key::TransactionKey;
pub use logic::TransactionLogic;
pub use state::{AtomicTransactionState, TransactionState};

/// The four RFC 3261 transaction state machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// ICT, RFC 3261 §17.1.1
    InviteClient,
    /// NICT, RFC 3261 §17.1.2
    NonInviteClient,
    /// IST, RFC 3261 §17.2.1
    InviteServer,
    /// NIST, RFC 3261 §17.2.2
    NonInviteServer,
}

impl TransactionKind {
    pub fn for_method(method: &Method, is_server: bool) -> Self {
        match (method.is_invite(), is_server) {
            (true, false) => TransactionKind::InviteClient,
            (false, false) => TransactionKind::NonInviteClient,
            (true, true) => TransactionKind::InviteServer,
            (false, true) => TransactionKind::NonInviteServer,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, TransactionKind::InviteServer | TransactionKind::NonInviteServer)
    }

    /// State entered when the request is sent (client) or received (server).
    pub fn active_state(&self) -> TransactionState {
        match self {
            TransactionKind::InviteClient => TransactionState::Calling,
            TransactionKind::NonInviteClient | TransactionKind::NonInviteServer => TransactionState::Trying,
            TransactionKind::InviteServer => TransactionState::Proceeding,
        }
    }
}

/// Events reported to the transaction user
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    StateChanged {
        transaction_id: TransactionKey,
        previous_state: TransactionState,
        new_state: TransactionState,
    },

    /// Client: a 1xx arrived
    ProvisionalResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    /// Client: a 2xx arrived. For INVITE, retransmitted 2xx in Accepted are
    /// reported too.
    SuccessResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    /// Client: a final response ≥ 300 arrived
    FailureResponse {
        transaction_id: TransactionKey,
        response: Response,
    },

    /// Server: a request created a new server transaction
    NewRequest {
        transaction_id: TransactionKey,
        request: Request,
        source: SocketAddr,
    },

    /// Server: an ACK for a 2xx reached an INVITE transaction in Accepted
    AckReceived {
        transaction_id: TransactionKey,
        request: Request,
    },

    /// Server: a CANCEL matched a pending INVITE server transaction
    CancelReceived {
        /// The CANCEL's own server transaction
        transaction_id: TransactionKey,
        invite_transaction_id: TransactionKey,
        cancel_request: Request,
    },

    /// Timer B, F or H expired
    TransactionTimeout { transaction_id: TransactionKey },

    /// The transport failed to send or resolve for this transaction
    TransportError { transaction_id: TransactionKey },

    /// The transaction reached Terminated and has been released
    TransactionTerminated {
        transaction_id: TransactionKey,
        is_server: bool,
    },

    /// A message no transaction claimed
    UnmatchedMessage { message: Message, source: SocketAddr },

    Error {
        transaction_id: Option<TransactionKey>,
        error: String,
    },
}

impl TransactionEvent {
    /// The transaction this event concerns, if any
    pub fn transaction_id(&self) -> Option<&TransactionKey> {
        match self {
            TransactionEvent::StateChanged { transaction_id, .. }
            | TransactionEvent::ProvisionalResponse { transaction_id, .. }
            | TransactionEvent::SuccessResponse { transaction_id, .. }
            | TransactionEvent::FailureResponse { transaction_id, .. }
            | TransactionEvent::NewRequest { transaction_id, .. }
            | TransactionEvent::AckReceived { transaction_id, .. }
            | TransactionEvent::CancelReceived { transaction_id, .. }
            | TransactionEvent::TransactionTimeout { transaction_id }
            | TransactionEvent::TransportError { transaction_id }
            | TransactionEvent::TransactionTerminated { transaction_id, .. } => Some(transaction_id),
            TransactionEvent::Error { transaction_id, .. } => transaction_id.as_ref(),
            TransactionEvent::UnmatchedMessage { .. } => None,
        }
    }
}

/// Commands processed by a transaction's command loop
#[derive(Debug)]
pub enum InternalTransactionCommand {
    /// Move to a state (start, or a transition decided elsewhere)
    TransitionTo(TransactionState),
    /// Client: an incoming response. Server: an incoming request, or a
    /// response from the TU to send.
    ProcessMessage(Message),
    /// A timer fired
    Timer(TimerType),
    /// A send or resolve failed
    TransportError,
    /// Stop immediately
    Terminate,
}

/// What every transaction is created with
#[derive(Clone)]
pub struct TransactionContext {
    pub transport: Arc<dyn Transport>,
    /// Where the transaction reports its events
    pub events_tx: mpsc::Sender<TransactionEvent>,
    pub timer_settings: TimerSettings,
    pub command_channel_capacity: usize,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("transport", &self.transport)
            .field("timer_settings", &self.timer_settings)
            .finish()
    }
}

/// Read access to a running transaction, as held by the provider
pub trait Transaction: fmt::Debug + Send + Sync {
    fn id(&self) -> &TransactionKey;

    fn kind(&self) -> TransactionKind;

    fn state(&self) -> TransactionState;

    /// The request that created the transaction
    fn original_request(&self) -> &Request;

    /// Peer address, once known. Clients learn it when the request is sent.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Sender into the transaction's command loop
    fn command_sender(&self) -> mpsc::Sender<InternalTransactionCommand>;
}
