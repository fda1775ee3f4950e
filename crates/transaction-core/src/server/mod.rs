//! Server transactions: the INVITE (IST) and non-INVITE (NIST) state machines.

pub mod data;
mod invite;
mod non_invite;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use sigstack_sip_core::Request;

use crate::transaction::runner::run_transaction_loop;
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, Transaction, TransactionContext, TransactionKey,
    TransactionKind, TransactionLogic, TransactionState,
};
use crate::utils::generate_tag;

pub use data::ServerTransactionData;

use invite::{ServerInviteLogic, ServerInviteTimerHandles};
use non_invite::{ServerNonInviteLogic, ServerNonInviteTimerHandles};

/// A server transaction and the task running it.
///
/// The owner moves it to its active state with
/// `TransitionTo(Proceeding | Trying)` right after creation.
#[derive(Debug)]
pub struct ServerTransaction {
    data: Arc<ServerTransactionData>,
    event_loop_handle: JoinHandle<()>,
}

impl ServerTransaction {
    /// Creates the transaction for a request received from `source`.
    pub fn new(id: TransactionKey, request: Request, source: SocketAddr, context: &TransactionContext) -> Self {
        let kind = TransactionKind::for_method(&request.method, true);
        let (cmd_tx, cmd_rx) = mpsc::channel(context.command_channel_capacity);

        let data = Arc::new(ServerTransactionData {
            id,
            kind,
            state: Arc::new(AtomicTransactionState::new(TransactionState::Initial)),
            request,
            remote_addr: source,
            to_tag: generate_tag(),
            last_response: Mutex::new(None),
            transport: context.transport.clone(),
            events_tx: context.events_tx.clone(),
            cmd_tx,
            timer_config: context.timer_settings.clone(),
        });

        let event_loop_handle = match kind {
            TransactionKind::InviteServer => {
                spawn_loop::<ServerInviteTimerHandles, _>(data.clone(), ServerInviteLogic, cmd_rx)
            }
            _ => spawn_loop::<ServerNonInviteTimerHandles, _>(data.clone(), ServerNonInviteLogic, cmd_rx),
        };

        Self {
            data,
            event_loop_handle,
        }
    }

    pub fn data(&self) -> &Arc<ServerTransactionData> {
        &self.data
    }
}

fn spawn_loop<TH, L>(
    data: Arc<ServerTransactionData>,
    logic: L,
    cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) -> JoinHandle<()>
where
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<ServerTransactionData, TH> + Send + Sync + 'static,
{
    tokio::spawn(run_transaction_loop::<_, TH, _>(data, Arc::new(logic), cmd_rx))
}

impl Transaction for ServerTransaction {
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
        Some(self.data.remote_addr)
    }

    fn command_sender(&self) -> mpsc::Sender<InternalTransactionCommand> {
        self.data.cmd_tx.clone()
    }
}

impl Drop for ServerTransaction {
    fn drop(&mut self) {
        self.event_loop_handle.abort();
    }
}
