use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, OnceCell};
use tracing::trace;

use sigstack_sip_core::{Message, Request, Response};
use sigstack_sip_transport::{Error as TransportError, Transport};

use crate::error::Result;
use crate::timer::TimerSettings;
use crate::transaction::runner::{AsRefKey, AsRefState, HasCommandSender, HasTransactionEvents};
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionEvent, TransactionKey, TransactionKind,
};
use crate::utils::{resolve_destination, via_transport};

/// State shared between a client transaction's command loop and its owner
pub struct ClientTransactionData {
    pub id: TransactionKey,
    pub kind: TransactionKind,
    pub state: Arc<AtomicTransactionState>,
    /// The request as sent, branch included
    pub request: Request,
    /// Host and port from the Request-URI
    pub destination: (String, u16),
    /// Resolved once, on first send
    pub remote_addr: OnceCell<SocketAddr>,
    /// Last response received
    pub last_response: Mutex<Option<Response>>,
    /// INVITE only: the ACK for a non-2xx final, re-sent on retransmitted finals
    pub ack: Mutex<Option<Request>>,
    pub transport: Arc<dyn Transport>,
    pub events_tx: mpsc::Sender<TransactionEvent>,
    pub cmd_tx: mpsc::Sender<InternalTransactionCommand>,
    pub timer_config: TimerSettings,
}

impl ClientTransactionData {
    pub fn is_reliable(&self) -> bool {
        self.transport.is_reliable()
    }

    /// Resolves the destination on first use and checks that the transport
    /// can reach it with the protocol the top Via names.
    pub async fn remote_address(&self) -> Result<SocketAddr> {
        let (host, port) = &self.destination;
        let addr = *self
            .remote_addr
            .get_or_try_init(|| resolve_destination(host, *port))
            .await?;

        let protocol = via_transport(&self.request);
        if !self.transport.matches(protocol, addr) {
            return Err(TransportError::NoMatchingTransport(format!("{} to {}", protocol, addr)).into());
        }
        Ok(addr)
    }

    /// Sends (or re-sends) the original request.
    pub async fn send_request(&self) -> Result<()> {
        self.send(Message::Request(self.request.clone())).await
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        let destination = self.remote_address().await?;
        trace!(id=%self.id, %destination, "Sending {}", message.short_description());
        self.transport.send_message(message, destination).await?;
        Ok(())
    }

    pub async fn report(&self, event: TransactionEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

impl fmt::Debug for ClientTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransactionData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("destination", &self.destination)
            .field("remote_addr", &self.remote_addr.get())
            .finish()
    }
}

impl AsRefState for ClientTransactionData {
    fn as_ref_state(&self) -> &Arc<AtomicTransactionState> {
        &self.state
    }
}

impl AsRefKey for ClientTransactionData {
    fn as_ref_key(&self) -> &TransactionKey {
        &self.id
    }
}

impl HasTransactionEvents for ClientTransactionData {
    fn get_tu_event_sender(&self) -> mpsc::Sender<TransactionEvent> {
        self.events_tx.clone()
    }
}

impl HasCommandSender for ClientTransactionData {
    fn get_self_command_sender(&self) -> mpsc::Sender<InternalTransactionCommand> {
        self.cmd_tx.clone()
    }
}
