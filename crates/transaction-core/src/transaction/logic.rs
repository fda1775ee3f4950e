use std::sync::Arc;

use tokio::sync::mpsc;

use sigstack_sip_core::Message;

use crate::error::Result;
use crate::timer::TimerType;
use crate::transaction::{InternalTransactionCommand, TransactionKind, TransactionState};

/// The state-specific half of a transaction.
///
/// A generic command loop ([`run_transaction_loop`](super::runner::run_transaction_loop))
/// owns the timers and applies transitions; implementors decide what a
/// message or a timer means in a given state.
///
/// - `D` is the transaction data shared with the provider.
/// - `TH` holds the `JoinHandle`s of the timers this kind uses.
#[async_trait::async_trait]
pub trait TransactionLogic<D, TH>
where
    D: Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
{
    /// Used to validate transitions.
    fn kind(&self) -> TransactionKind;

    fn initial_state(&self) -> TransactionState {
        TransactionState::Initial
    }

    /// Handles an incoming message (or, for servers, a response from the TU)
    /// in `current_state`.
    ///
    /// Returns the state to move to, if any. A transport error returned here
    /// terminates the transaction.
    async fn process_message(
        &self,
        data: &Arc<D>,
        message: Message,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>>;

    /// Handles a fired timer. Retransmission timers re-arm themselves in
    /// `timer_handles`.
    async fn handle_timer(
        &self,
        data: &Arc<D>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut TH,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>>;

    /// Runs the entry actions of `new_state`: sends and timer starts.
    ///
    /// All timers have been cancelled when this is called. Returns a state
    /// to move on to immediately, e.g. Terminated where a wait timer is zero
    /// on reliable transports.
    async fn on_enter_state(
        &self,
        data: &Arc<D>,
        new_state: TransactionState,
        previous_state: TransactionState,
        timer_handles: &mut TH,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>>;

    /// Aborts every running timer in `timer_handles`.
    fn cancel_all_specific_timers(&self, timer_handles: &mut TH);
}
