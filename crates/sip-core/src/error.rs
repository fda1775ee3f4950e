use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP message and URI handling
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid SIP or generic URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Invalid header value
    #[error("Invalid SIP header: {0}")]
    InvalidHeader(String),

    /// Message could not be built or is structurally wrong
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Input did not match the message grammar
    #[error("Parse error after {consumed} bytes")]
    Parse { consumed: usize },

    /// Content-Length announces more body than the input holds
    #[error("Incomplete body: expected {expected} bytes, {available} available")]
    IncompleteBody { expected: usize, available: usize },

    /// A header required for the operation is missing
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// Grammar engine failure
    #[error("Grammar error: {0}")]
    Grammar(#[from] sigstack_abnf_core::Error),
}
