use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use sigstack_sip_core::{HeaderAccess, Message, Request, Response};
use sigstack_sip_transport::Transport;

use crate::error::Result;
use crate::timer::TimerSettings;
use crate::transaction::runner::{AsRefKey, AsRefState, HasCommandSender, HasTransactionEvents};
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionEvent, TransactionKey, TransactionKind,
};

/// State shared between a server transaction's command loop and its owner
pub struct ServerTransactionData {
    pub id: TransactionKey,
    pub kind: TransactionKind,
    pub state: Arc<AtomicTransactionState>,
    /// The request that created the transaction
    pub request: Request,
    /// Where the request came from; responses go back there
    pub remote_addr: SocketAddr,
    /// To tag added to responses that lack one
    pub to_tag: String,
    /// Last response sent, replayed on request retransmissions
    pub last_response: Mutex<Option<Response>>,
    pub transport: Arc<dyn Transport>,
    pub events_tx: mpsc::Sender<TransactionEvent>,
    pub cmd_tx: mpsc::Sender<InternalTransactionCommand>,
    pub timer_config: TimerSettings,
}

impl ServerTransactionData {
    pub fn is_reliable(&self) -> bool {
        self.transport.is_reliable()
    }

    /// Sends a response from the TU, tagging it first, and remembers it for
    /// retransmission.
    pub async fn send_response(&self, mut response: Response) -> Result<()> {
        if response.status_code() != 100 {
            if let Some(to) = response.to_mut() {
                if to.tag().is_none() {
                    to.set_tag(self.to_tag.clone());
                }
            }
        }
        *self.last_response.lock().await = Some(response.clone());
        trace!(id=%self.id, destination=%self.remote_addr, "Sending {} response", response.status);
        self.transport
            .send_message(Message::Response(response), self.remote_addr)
            .await?;
        Ok(())
    }

    /// Re-sends the last response, if there is one.
    pub async fn retransmit_last_response(&self) -> Result<()> {
        let response = self.last_response.lock().await.clone();
        if let Some(response) = response {
            debug!(id=%self.id, "Retransmitting {} response", response.status);
            self.transport
                .send_message(Message::Response(response), self.remote_addr)
                .await?;
        }
        Ok(())
    }

    pub async fn report(&self, event: TransactionEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

impl fmt::Debug for ServerTransactionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTransactionData")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state.get())
            .field("remote_addr", &self.remote_addr)
            .field("to_tag", &self.to_tag)
            .finish()
    }
}

impl AsRefState for ServerTransactionData {
    fn as_ref_state(&self) -> &Arc<AtomicTransactionState> {
        &self.state
    }
}

impl AsRefKey for ServerTransactionData {
    fn as_ref_key(&self) -> &TransactionKey {
        &self.id
    }
}

impl HasTransactionEvents for ServerTransactionData {
    fn get_tu_event_sender(&self) -> mpsc::Sender<TransactionEvent> {
        self.events_tx.clone()
    }
}

impl HasCommandSender for ServerTransactionData {
    fn get_self_command_sender(&self) -> mpsc::Sender<InternalTransactionCommand> {
        self.cmd_tx.clone()
    }
}
