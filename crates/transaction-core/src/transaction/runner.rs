//! The command loop shared by all four transaction state machines.
//!
//! Each transaction runs one task executing [`run_transaction_loop`]. All of
//! its state changes happen here, in command order:
//!
//! 1. A command arrives (message, timer, explicit transition)
//! 2. The [`TransactionLogic`] decides what it means in the current state
//! 3. On a transition, running timers are aborted, the state is stored and
//!    reported, and the new state's entry actions run
//!
//! The loop exits once the state is Terminated and reports
//! [`TransactionEvent::TransactionTerminated`] as its last event.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::error::Result;
use crate::transaction::logic::TransactionLogic;
use crate::transaction::{
    AtomicTransactionState, InternalTransactionCommand, TransactionEvent, TransactionKey,
    TransactionState,
};

/// Access to the transaction's shared state
pub trait AsRefState {
    fn as_ref_state(&self) -> &Arc<AtomicTransactionState>;
}

/// Access to the transaction's key
pub trait AsRefKey {
    fn as_ref_key(&self) -> &TransactionKey;
}

/// Access to the channel events are reported on
pub trait HasTransactionEvents {
    fn get_tu_event_sender(&self) -> mpsc::Sender<TransactionEvent>;
}

/// Access to the transaction's own command channel, for timers
pub trait HasCommandSender {
    fn get_self_command_sender(&self) -> mpsc::Sender<InternalTransactionCommand>;
}

/// Runs a transaction until it terminates.
///
/// Transport errors, whether reported by the logic or posted as
/// [`InternalTransactionCommand::TransportError`], produce a
/// [`TransactionEvent::TransportError`] and terminate the transaction.
/// Other errors are reported as [`TransactionEvent::Error`] and leave the
/// state alone.
pub async fn run_transaction_loop<D, TH, L>(
    data: Arc<D>,
    logic: Arc<L>,
    mut cmd_rx: mpsc::Receiver<InternalTransactionCommand>,
) where
    D: AsRefState + AsRefKey + HasTransactionEvents + HasCommandSender + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH> + Send + Sync + 'static,
{
    let mut timer_handles = TH::default();
    let tx_id = data.as_ref_key().clone();
    let events_tx = data.get_tu_event_sender();

    debug!(id=%tx_id, kind=?logic.kind(), "Transaction loop starting");

    while let Some(command) = cmd_rx.recv().await {
        let current_state = data.as_ref_state().get();
        trace!(id=%tx_id, ?command, state=?current_state, "Transaction received command");

        let mut outcome: Result<Option<TransactionState>> = match command {
            InternalTransactionCommand::TransitionTo(new_state) => Ok(Some(new_state)),
            InternalTransactionCommand::ProcessMessage(message) => {
                logic.process_message(&data, message, current_state).await
            }
            InternalTransactionCommand::Timer(timer) => {
                logic
                    .handle_timer(
                        &data,
                        timer,
                        current_state,
                        &mut timer_handles,
                        data.get_self_command_sender(),
                    )
                    .await
            }
            InternalTransactionCommand::TransportError => {
                report_transport_error(&tx_id, &events_tx).await;
                Ok(Some(TransactionState::Terminated))
            }
            InternalTransactionCommand::Terminate => {
                debug!(id=%tx_id, "Terminate requested");
                Ok(Some(TransactionState::Terminated))
            }
        };

        // A transition's entry actions may ask for a further transition
        loop {
            outcome = match outcome {
                Ok(Some(next)) => apply_transition(&data, &*logic, &mut timer_handles, next).await,
                Ok(None) => break,
                Err(e) if e.is_transport() => {
                    warn!(id=%tx_id, error=%e, "Transport failure");
                    report_transport_error(&tx_id, &events_tx).await;
                    Ok(Some(TransactionState::Terminated))
                }
                Err(e) => {
                    warn!(id=%tx_id, error=%e, "Transaction error");
                    let _ = events_tx
                        .send(TransactionEvent::Error {
                            transaction_id: Some(tx_id.clone()),
                            error: e.to_string(),
                        })
                        .await;
                    break;
                }
            };
        }

        if data.as_ref_state().get().is_terminated() {
            break;
        }
    }

    logic.cancel_all_specific_timers(&mut timer_handles);
    data.as_ref_state().set(TransactionState::Terminated);

    debug!(id=%tx_id, "Transaction loop ended");
    let _ = events_tx
        .send(TransactionEvent::TransactionTerminated {
            transaction_id: tx_id.clone(),
            is_server: tx_id.is_server(),
        })
        .await;
}

/// Moves to `new_state` and runs its entry actions, returning any follow-up
/// state the entry actions asked for.
async fn apply_transition<D, TH, L>(
    data: &Arc<D>,
    logic: &L,
    timer_handles: &mut TH,
    new_state: TransactionState,
) -> Result<Option<TransactionState>>
where
    D: AsRefState + AsRefKey + HasTransactionEvents + HasCommandSender + Send + Sync + 'static,
    TH: Default + Send + Sync + 'static,
    L: TransactionLogic<D, TH> + Send + Sync + 'static,
{
    let tx_id = data.as_ref_key();
    let current_state = data.as_ref_state().get();

    if current_state == new_state {
        trace!(id=%tx_id, state=?current_state, "Already in requested state");
        return Ok(None);
    }

    if let Err(e) = AtomicTransactionState::validate_transition(logic.kind(), current_state, new_state) {
        error!(id=%tx_id, error=%e, "Rejected state transition");
        let _ = data
            .get_tu_event_sender()
            .send(TransactionEvent::Error {
                transaction_id: Some(tx_id.clone()),
                error: e,
            })
            .await;
        return Ok(None);
    }

    logic.cancel_all_specific_timers(timer_handles);
    let previous_state = data.as_ref_state().set(new_state);
    debug!(id=%tx_id, "State {:?} -> {:?}", previous_state, new_state);

    let _ = data
        .get_tu_event_sender()
        .send(TransactionEvent::StateChanged {
            transaction_id: tx_id.clone(),
            previous_state,
            new_state,
        })
        .await;

    if new_state.is_terminated() {
        return Ok(None);
    }

    logic
        .on_enter_state(
            data,
            new_state,
            previous_state,
            timer_handles,
            data.get_self_command_sender(),
        )
        .await
}

async fn report_transport_error(tx_id: &TransactionKey, events_tx: &mpsc::Sender<TransactionEvent>) {
    let _ = events_tx
        .send(TransactionEvent::TransportError {
            transaction_id: tx_id.clone(),
        })
        .await;
}
