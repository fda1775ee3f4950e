use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transport operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Could not bind the local address
    #[error("Failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, #[source] io::Error),

    /// The transport has been closed
    #[error("Transport closed")]
    TransportClosed,

    /// A message could not be sent
    #[error("Failed to send message to {destination}: {reason}")]
    SendFailed { destination: SocketAddr, reason: String },

    /// A destination host could not be resolved
    #[error("Failed to resolve {0}")]
    ResolveFailed(String),

    /// No transport handles the requested protocol
    #[error("No transport for {0}")]
    NoMatchingTransport(String),
}
