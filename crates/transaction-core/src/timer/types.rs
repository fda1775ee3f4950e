//! Timer names and durations for the RFC 3261 transaction state machines.
//!
//! - **Retransmission timers** resend a message over unreliable transports (A, E, G)
//! - **Transaction timeouts** bound a transaction's lifetime (B, F, H)
//! - **Wait timers** keep a finished transaction around to absorb retransmissions (D, I, J, K)
//! - **RFC 6026 timers** hold INVITE transactions in Accepted (L, M)
//!
//! Retransmission intervals start at T1 and double up to T2.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One of the RFC 3261 / RFC 6026 transaction timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerType {
    /// INVITE client retransmission
    A,
    /// INVITE client timeout
    B,
    /// INVITE client wait after a non-2xx final response
    D,
    /// Non-INVITE client retransmission
    E,
    /// Non-INVITE client timeout
    F,
    /// INVITE server response retransmission
    G,
    /// INVITE server wait for ACK
    H,
    /// INVITE server wait in Confirmed
    I,
    /// Non-INVITE server wait in Completed
    J,
    /// Non-INVITE client wait in Completed
    K,
    /// INVITE server wait in Accepted
    L,
    /// INVITE client wait in Accepted
    M,
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
            TimerType::L => "L",
            TimerType::M => "M",
        };
        f.write_str(name)
    }
}

/// Timer durations.
///
/// Defaults follow RFC 3261 §17: T1 = 500ms, T2 = 4s, T4 = 5s, and the
/// transaction timeout (Timers B, F, H, J, L, M) = 64·T1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// RTT estimate, the initial retransmission interval
    pub t1: Duration,
    /// Retransmission interval cap
    pub t2: Duration,
    /// Maximum time a message stays in the network
    pub t4: Duration,
    /// 64·T1 family
    pub transaction_timeout: Duration,
    /// Timer D on unreliable transports
    pub wait_time_d: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            transaction_timeout: Duration::from_secs(32),
            wait_time_d: Duration::from_secs(32),
        }
    }
}

impl TimerSettings {
    /// Settings for custom base timers, deriving the transaction timeout as 64·T1.
    ///
    /// Timer D keeps its 32s floor for unreliable transports.
    pub fn from_t1_t2_t4(t1: Duration, t2: Duration, t4: Duration) -> Self {
        let transaction_timeout = t1 * 64;
        Self {
            t1,
            t2,
            t4,
            transaction_timeout,
            wait_time_d: transaction_timeout.max(Duration::from_secs(32)),
        }
    }

    /// Next retransmission interval after `current`: doubled, capped at T2.
    pub fn next_interval(&self, current: Duration) -> Duration {
        (current * 2).min(self.t2)
    }
}
