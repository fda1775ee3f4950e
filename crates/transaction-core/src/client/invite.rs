//! INVITE client transaction (RFC 3261 §17.1.1, RFC 6026 §7.2).
//!
//! ```text
//!            send INVITE
//!                 |
//!              Calling --Timer A: resend, Timer B: timeout
//!            1xx  |  \
//!                 v   \
//!            Proceeding  \  2xx
//!   300-699 /      \ 2xx  \
//!          v        v      v
//!   Completed      Accepted --Timer M
//!     | Timer D       |
//!     v               v
//!           Terminated
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use sigstack_sip_core::{Message, Response};

use crate::client::data::ClientTransactionData;
use crate::error::Result;
use crate::timer::{cancel_timer, start_timer, start_timer_at, TimerType};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::{InternalTransactionCommand, TransactionEvent, TransactionKind, TransactionState};
use crate::utils::create_ack_for_error_response;

#[derive(Default, Debug)]
pub(crate) struct ClientInviteTimerHandles {
    timer_a: Option<JoinHandle<()>>,
    current_timer_a_interval: Option<Duration>,
    timer_b: Option<JoinHandle<()>>,
    // B spans Calling and Proceeding; re-armed at the same deadline
    timer_b_deadline: Option<Instant>,
    timer_d: Option<JoinHandle<()>>,
    timer_m: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ClientInviteLogic;

impl ClientInviteLogic {
    async fn handle_response(
        &self,
        data: &Arc<ClientTransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let id = data.id.clone();
        let status = response.status();

        match current_state {
            TransactionState::Calling | TransactionState::Proceeding => {
                if status.is_provisional() {
                    data.report(TransactionEvent::ProvisionalResponse {
                        transaction_id: id,
                        response,
                    })
                    .await;
                    return Ok((current_state == TransactionState::Calling).then_some(TransactionState::Proceeding));
                }

                *data.last_response.lock().await = Some(response.clone());
                if status.is_success() {
                    data.report(TransactionEvent::SuccessResponse {
                        transaction_id: id,
                        response,
                    })
                    .await;
                    Ok(Some(TransactionState::Accepted))
                } else {
                    data.report(TransactionEvent::FailureResponse {
                        transaction_id: id,
                        response,
                    })
                    .await;
                    Ok(Some(TransactionState::Completed))
                }
            }
            TransactionState::Completed if status.is_error() => {
                // Retransmitted final: our ACK got lost
                let ack = data.ack.lock().await.clone();
                if let Some(ack) = ack {
                    debug!(id=%id, "Re-sending ACK for retransmitted {}", status);
                    data.send(Message::Request(ack)).await?;
                }
                Ok(None)
            }
            TransactionState::Accepted if status.is_success() => {
                data.report(TransactionEvent::SuccessResponse {
                    transaction_id: id,
                    response,
                })
                .await;
                Ok(None)
            }
            _ => {
                trace!(id=%id, state=?current_state, "Ignoring {} response", status);
                Ok(None)
            }
        }
    }

    async fn send_ack(&self, data: &Arc<ClientTransactionData>) -> Result<()> {
        let response = data.last_response.lock().await.clone();
        let Some(response) = response else {
            warn!(id=%data.id, "Completed without a final response, no ACK sent");
            return Ok(());
        };
        let ack = create_ack_for_error_response(&data.request, &response)?;
        *data.ack.lock().await = Some(ack.clone());
        data.send(Message::Request(ack)).await
    }
}

#[async_trait]
impl TransactionLogic<ClientTransactionData, ClientInviteTimerHandles> for ClientInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteClient
    }

    async fn process_message(
        &self,
        data: &Arc<ClientTransactionData>,
        message: Message,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.handle_response(data, response, current_state).await,
            Message::Request(request) => {
                warn!(id=%data.id, "Client transaction received a {} request", request.method);
                Ok(None)
            }
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ClientTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut ClientInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        match (timer, current_state) {
            (TimerType::A, TransactionState::Calling) => {
                let interval = timer_handles.current_timer_a_interval.unwrap_or(data.timer_config.t1);
                let next = data.timer_config.next_interval(interval);
                debug!(id=%data.id, "Timer A fired, retransmitting INVITE (next in {:?})", next);
                data.send_request().await?;
                timer_handles.current_timer_a_interval = Some(next);
                timer_handles.timer_a = Some(start_timer(&data.id, TimerType::A, next, command_tx));
                Ok(None)
            }
            (TimerType::B, TransactionState::Calling | TransactionState::Proceeding) => {
                debug!(id=%data.id, "Timer B fired, transaction timed out");
                data.report(TransactionEvent::TransactionTimeout {
                    transaction_id: data.id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::D, TransactionState::Completed) | (TimerType::M, TransactionState::Accepted) => {
                trace!(id=%data.id, "Timer {} fired", timer);
                Ok(Some(TransactionState::Terminated))
            }
            _ => {
                trace!(id=%data.id, state=?current_state, "Ignoring stale timer {}", timer);
                Ok(None)
            }
        }
    }

    async fn on_enter_state(
        &self,
        data: &Arc<ClientTransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ClientInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        let settings = &data.timer_config;
        match new_state {
            TransactionState::Calling => {
                data.send_request().await?;
                if !data.is_reliable() {
                    timer_handles.current_timer_a_interval = Some(settings.t1);
                    timer_handles.timer_a =
                        Some(start_timer(&data.id, TimerType::A, settings.t1, command_tx.clone()));
                }
                let deadline = Instant::now() + settings.transaction_timeout;
                timer_handles.timer_b_deadline = Some(deadline);
                timer_handles.timer_b = Some(start_timer_at(&data.id, TimerType::B, deadline, command_tx));
            }
            TransactionState::Proceeding => {
                if let Some(deadline) = timer_handles.timer_b_deadline {
                    timer_handles.timer_b = Some(start_timer_at(&data.id, TimerType::B, deadline, command_tx));
                }
            }
            TransactionState::Completed => {
                self.send_ack(data).await?;
                if data.is_reliable() {
                    return Ok(Some(TransactionState::Terminated));
                }
                timer_handles.timer_d =
                    Some(start_timer(&data.id, TimerType::D, settings.wait_time_d, command_tx));
            }
            TransactionState::Accepted => {
                timer_handles.timer_m = Some(start_timer(
                    &data.id,
                    TimerType::M,
                    settings.transaction_timeout,
                    command_tx,
                ));
            }
            _ => {}
        }
        Ok(None)
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ClientInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_a);
        cancel_timer(&mut timer_handles.timer_b);
        cancel_timer(&mut timer_handles.timer_d);
        cancel_timer(&mut timer_handles.timer_m);
    }
}
