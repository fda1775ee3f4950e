use thiserror::Error;
use tokio::sync::mpsc;

use crate::transaction::TransactionKey;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Message construction or inspection failed
    #[error("SIP error: {0}")]
    SipCore(#[from] sigstack_sip_core::Error),

    /// Transport failure; terminal for the transaction that hit it
    #[error("Transport error: {0}")]
    Transport(#[from] sigstack_sip_transport::Error),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    #[error("Transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    /// The state machine does not allow this transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The operation is not valid in the transaction's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transaction timed out: {0}")]
    TransactionTimeout(TransactionKey),

    /// A transaction's command or event channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
