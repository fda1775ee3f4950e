//! Non-INVITE server transaction (RFC 3261 §17.2.2).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use sigstack_sip_core::{Message, Response};

use crate::error::{Error, Result};
use crate::server::data::ServerTransactionData;
use crate::timer::{cancel_timer, start_timer, TimerType};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::{InternalTransactionCommand, TransactionKind, TransactionState};

#[derive(Default, Debug)]
pub(crate) struct ServerNonInviteTimerHandles {
    timer_j: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ServerNonInviteLogic;

impl ServerNonInviteLogic {
    async fn send_response(
        &self,
        data: &Arc<ServerTransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let status = response.status();
        if !matches!(current_state, TransactionState::Trying | TransactionState::Proceeding) {
            return Err(Error::InvalidState(format!(
                "cannot send {} from server transaction {} in state {:?}",
                status, data.id, current_state
            )));
        }

        data.send_response(response).await?;
        if status.is_final() {
            Ok(Some(TransactionState::Completed))
        } else {
            Ok((current_state == TransactionState::Trying).then_some(TransactionState::Proceeding))
        }
    }
}

#[async_trait]
impl TransactionLogic<ServerTransactionData, ServerNonInviteTimerHandles> for ServerNonInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteServer
    }

    async fn process_message(
        &self,
        data: &Arc<ServerTransactionData>,
        message: Message,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.send_response(data, response, current_state).await,
            Message::Request(request) => {
                match current_state {
                    TransactionState::Proceeding | TransactionState::Completed => {
                        data.retransmit_last_response().await?;
                    }
                    _ => trace!(id=%data.id, state=?current_state, "Absorbing retransmitted {}", request.method),
                }
                Ok(None)
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ServerTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        _timer_handles: &mut ServerNonInviteTimerHandles,
        _command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        match (timer, current_state) {
            (TimerType::J, TransactionState::Completed) => Ok(Some(TransactionState::Terminated)),
            _ => {
                trace!(id=%data.id, state=?current_state, "Ignoring stale timer {}", timer);
                Ok(None)
            }
        }
    }

    async fn on_enter_state(
        &self,
        data: &Arc<ServerTransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ServerNonInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        if new_state == TransactionState::Completed {
            if data.is_reliable() {
                return Ok(Some(TransactionState::Terminated));
            }
            timer_handles.timer_j = Some(start_timer(
                &data.id,
                TimerType::J,
                data.timer_config.transaction_timeout,
                command_tx,
            ));
        }
        Ok(None)
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ServerNonInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_j);
    }
}
