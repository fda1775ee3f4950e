//! SIP message and URI model for sigstack
//!
//! This crate defines the SIP types the transaction layer works with and
//! parses them through the grammar engine in `sigstack-abnf-core`.

pub mod error;
pub mod parser;
pub mod types;

mod escape;

// Re-export key public items
pub use error::{Error, Result};
pub use parser::{parse_generic_uri, parse_message, parse_message_partial, parse_message_with_length, parse_uri};
pub use types::{
    Address, CSeq, GenericUri, Header, HeaderAccess, Message, Method, Param, Request, Response, SipUri, StatusCode,
    Uri, Via, BRANCH_MAGIC_COOKIE,
};

/// Re-export of common types and functions
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::parser::{parse_message, parse_uri};
    pub use crate::types::{
        Address, CSeq, Header, HeaderAccess, Message, Method, Request, Response, SipUri, StatusCode, Uri, Via,
        BRANCH_MAGIC_COOKIE,
    };
}
