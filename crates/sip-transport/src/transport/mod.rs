pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use sigstack_sip_core::Message;

use crate::error::Result;

/// Events emitted by a transport's receive side
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete SIP message arrived
    MessageReceived {
        message: Message,
        source: SocketAddr,
        destination: SocketAddr,
    },

    /// A receive or parse failure; the transport keeps running
    Error { error: String },

    /// The transport stopped receiving
    Closed,
}

/// A way of moving SIP messages to and from the network.
///
/// Received messages are not returned from a method; each implementation
/// hands out a `mpsc::Receiver<TransportEvent>` when it is created.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Marshals `message` and sends it to `destination`.
    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()>;

    /// Stops receiving; later sends fail with `TransportClosed`.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Whether the transport delivers reliably (TCP, TLS). Retransmission
    /// timers only run on unreliable transports.
    fn is_reliable(&self) -> bool {
        false
    }

    /// Protocol name as written in a Via header (`UDP`, `TCP`, ...)
    fn name(&self) -> &'static str;

    /// Whether this transport can carry a message over protocol `name` to
    /// `destination`.
    fn matches(&self, name: &str, destination: SocketAddr) -> bool {
        let same_family = self
            .local_addr()
            .map(|local| local.is_ipv4() == destination.is_ipv4())
            .unwrap_or(false);
        !self.is_closed() && same_family && name.eq_ignore_ascii_case(self.name())
    }
}
