//! Client transactions: the INVITE (ICT) and non-INVITE (NICT) state machines.

pub mod data;
mod invite;
mod non_invite;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;

use sigstack_sip_core::{Method, Request};

use crate::error::{Error, Result};
use crate::transaction::runner::run_transaction_loop;
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, Transaction, TransactionContext, TransactionKey,
    TransactionKind, TransactionLogic, TransactionState,
};
use crate::utils::request_destination;

pub use data::ClientTransactionData;

use invite::{ClientInviteLogic, ClientInviteTimerHandles};
use non_invite::{ClientNonInviteLogic, ClientNonInviteTimerHandles};

/// A client transaction and the task running it.
///
/// Nothing is sent until the loop receives
/// `TransitionTo(Calling | Trying)`. Dropping the transaction stops its loop.
#[derive(Debug)]
pub struct ClientTransaction {
    data: Arc<ClientTransactionData>,
    event_loop_handle: JoinHandle<()>,
}

impl ClientTransaction {
    /// Creates the transaction for `request`, whose top Via must already carry
    /// the branch in `id`.
    pub fn new(id: TransactionKey, request: Request, context: &TransactionContext) -> Result<Self> {
        if request.method == Method::Ack {
            return Err(Error::Other("ACK is not sent in a client transaction".to_string()));
        }
        let kind = TransactionKind::for_method(&request.method, false);
        let destination = request_destination(&request)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(context.command_channel_capacity);

        let data = Arc::new(ClientTransactionData {
            id,
            kind,
            state: Arc::new(AtomicTransactionState::new(TransactionState::Initial)),
            request,
            destination,
            remote_addr: OnceCell::new(),
            last_response: Mutex::new(None),
            ack: Mutex::new(None),
            transport: context.transport.clone(),
            events_tx: context.events_tx.clone(),
            cmd_tx,
            timer_config: context.timer_settings.clone(),
        });

        let event_loop_handle = match kind {
            TransactionKind::InviteClient => {
                spawn_loop::<ClientInviteTimerHandles, _>(data.clone(), ClientInviteLogic, cmd_rx)
            }
            _ => spawn_loop::<ClientNonInviteTimerHandles, _>(data.clone(), ClientNonInviteLogic, cmd_rx),
        };

        Ok(Self {
            data,
            event_loop_handle,
        })
    }

    pub fn data(&self) -> &Arc<ClientTransactionData> {
        &self.data
    }
}

fn spawn_loop<TH, L>(
    data: Arc<ClientTransactionData>,
    logic: L,
    cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) -> JoinHandle<()>
where
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<ClientTransactionData, TH> + Send + Sync + 'static,
{
    tokio::spawn(run_transaction_loop::<_, TH, _>(data, Arc::new(logic), cmd_rx))
}

impl Transaction for ClientTransaction {
    fn id(&self) -> &TransactionKey {
        &self.data.id
    }

    fn kind(&self) -> TransactionKind {
        self.data.kind
    }

    fn state(&self) -> TransactionState {
        self.data.state.get()
    }

    fn original_request(&self) -> &Request {
        &self.data.request
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.data.remote_addr.get().copied()
    }

    fn command_sender(&self) -> mpsc::Sender<InternalTransactionCommand> {
        self.data.cmd_tx.clone()
    }
}

impl Drop for ClientTransaction {
    fn drop(&mut self) {
        self.event_loop_handle.abort();
    }
}
