//! SIP transaction layer for sigstack
//!
//! Implements the four RFC 3261 §17 transaction state machines on top of a
//! [`Transport`](sigstack_sip_transport::Transport). A [`TransactionProvider`]
//! matches incoming messages to transactions, drives their timers and
//! retransmissions, and reports everything the transaction user needs as
//! [`TransactionEvent`]s.
//!
//! ```text
//!  INVITE client:      Initial → Calling → Proceeding → Completed | Accepted → Terminated
//!  non-INVITE client:  Initial → Trying → Proceeding → Completed → Terminated
//!  INVITE server:      Initial → Proceeding → Completed → Confirmed → Terminated
//!                                          ↘ Accepted → Terminated
//!  non-INVITE server:  Initial → Trying → Proceeding → Completed → Terminated
//! ```
//!
//! 2xx responses to INVITE follow RFC 6026: the client moves to Accepted
//! and keeps passing retransmitted 2xx up, the server stays in Accepted
//! until Timer L so it can absorb the ACK.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod server;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use config::ProviderConfig;
pub use error::{Error, Result};
pub use logging::{init_logging, LoggingConfig};
pub use provider::{ApplicationData, TransactionProvider};
pub use timer::{TimerSettings, TimerType};
pub use transaction::{TransactionEvent, TransactionKey, TransactionKind, TransactionState};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::utils::{create_response, generate_branch, generate_tag};
    pub use crate::{
        Error, ProviderConfig, Result, TimerSettings, TransactionEvent, TransactionKey, TransactionKind,
        TransactionProvider, TransactionState,
    };
}
