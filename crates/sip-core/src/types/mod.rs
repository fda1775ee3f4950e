//! # SIP Protocol Types
//!
//! Plain owned values for everything the parser produces and the
//! transaction layer consumes:
//!
//! - [`Message`], [`Request`], [`Response`]: SIP messages
//! - [`SipUri`], [`GenericUri`], [`Uri`]: URIs
//! - [`Header`] and its typed values [`Via`], [`Address`], [`CSeq`]
//! - [`Method`], [`StatusCode`]
//!
//! All types are `Clone + Send + Sync` and render their wire form through
//! `Display`.

pub mod address;
pub mod generic_uri;
pub mod header;
pub mod method;
pub mod param;
pub mod sip_message;
pub mod status;
pub mod uri;
pub mod via;

pub use address::Address;
pub use generic_uri::GenericUri;
pub use header::{canonical_name, CSeq, Header};
pub use method::Method;
pub use param::Param;
pub use sip_message::{HeaderAccess, Message, Request, Response, SIP_VERSION};
pub use status::StatusCode;
pub use uri::{SipUri, Uri, UriHeader, DEFAULT_SIPS_PORT, DEFAULT_SIP_PORT};
pub use via::{Via, BRANCH_MAGIC_COOKIE};
