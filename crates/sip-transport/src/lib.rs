//! SIP transport layer for sigstack
//!
//! A [`Transport`] sends marshalled SIP messages and reports received ones
//! as [`TransportEvent`]s on a channel handed out at bind time.

mod error;
pub mod transport;

pub use error::{Error, Result};
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent};

/// Simplified bind function for UdpTransport
pub async fn bind_udp(addr: std::net::SocketAddr) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use super::{bind_udp, Error, Result, Transport, TransportEvent, UdpTransport};
}
