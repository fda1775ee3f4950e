//! ABNF grammar engine and collector-driven parser runtime for sigstack
//!
//! This crate compiles ABNF (RFC 5234) grammar text into an immutable
//! recognizer graph and matches input against it with ordered-choice
//! recursive descent. Registered handlers and collectors turn matches into
//! application objects, bottom-up, as rules close.
//!
//! The two halves are:
//!
//! - [`grammar`]: [`Grammar`], the core rules, and the ABNF loader
//! - [`parser`]: [`Parser`], handlers, and [`Collector`]s
//!
//! A compiled grammar is read-only and is meant to be built once and shared
//! through an `Arc`; each `parse_input` call keeps its own state.

pub mod error;
pub mod grammar;
pub mod parser;

pub use error::{Error, Result};
pub use grammar::{core_rules, load_grammar, Grammar, Node, NodeId, RuleId};
pub use parser::{Collector, CollectorKind, Element, HandlerBuilder, Parser, ParserHandler};

/// Re-export of common types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::grammar::{load_grammar, Grammar, RuleId};
    pub use crate::parser::{Collector, Element, Parser};
}
