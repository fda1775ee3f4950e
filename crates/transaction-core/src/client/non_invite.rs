//! Non-INVITE client transaction (RFC 3261 §17.1.2).

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

#[derive(Default, Debug)]
pub(crate) struct ClientNonInviteTimerHandles {
    timer_e: Option<JoinHandle<()>>,
    current_timer_e_interval: Option<Duration>,
    timer_e_deadline: Option<Instant>,
    timer_f: Option<JoinHandle<()>>,
    timer_f_deadline: Option<Instant>,
    timer_k: Option<JoinHandle<()>>,
}

impl ClientNonInviteTimerHandles {
    fn arm_e(&mut self, data: &ClientTransactionData, interval: Duration, cmd_tx: mpsc::Sender<InternalTransactionCommand>) {
        let deadline = Instant::now() + interval;
        self.current_timer_e_interval = Some(interval);
        self.timer_e_deadline = Some(deadline);
        self.timer_e = Some(start_timer_at(&data.id, TimerType::E, deadline, cmd_tx));
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ClientNonInviteLogic;

impl ClientNonInviteLogic {
    async fn handle_response(
        &self,
        data: &Arc<ClientTransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let id = data.id.clone();
        let status = response.status();

        if !matches!(current_state, TransactionState::Trying | TransactionState::Proceeding) {
            trace!(id=%id, state=?current_state, "Absorbing {} response", status);
            return Ok(None);
        }

        if status.is_provisional() {
            data.report(TransactionEvent::ProvisionalResponse {
                transaction_id: id,
                response,
            })
            .await;
            return Ok((current_state == TransactionState::Trying).then_some(TransactionState::Proceeding));
        }

        *data.last_response.lock().await = Some(response.clone());
        let event = if status.is_success() {
            TransactionEvent::SuccessResponse {
                transaction_id: id,
                response,
            }
        } else {
            TransactionEvent::FailureResponse {
                transaction_id: id,
                response,
            }
        };
        data.report(event).await;
        Ok(Some(TransactionState::Completed))
    }
}

#[async_trait]
impl TransactionLogic<ClientTransactionData, ClientNonInviteTimerHandles> for ClientNonInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::NonInviteClient
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
        timer_handles: &mut ClientNonInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        let settings = &data.timer_config;
        match (timer, current_state) {
            (TimerType::E, TransactionState::Trying | TransactionState::Proceeding) => {
                let next = if current_state == TransactionState::Trying {
                    settings.next_interval(timer_handles.current_timer_e_interval.unwrap_or(settings.t1))
                } else {
                    settings.t2
                };
                debug!(id=%data.id, "Timer E fired, retransmitting {} (next in {:?})", data.request.method, next);
                data.send_request().await?;
                timer_handles.arm_e(data, next, command_tx);
                Ok(None)
            }
            (TimerType::F, TransactionState::Trying | TransactionState::Proceeding) => {
                debug!(id=%data.id, "Timer F fired, transaction timed out");
                data.report(TransactionEvent::TransactionTimeout {
                    transaction_id: data.id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::K, TransactionState::Completed) => Ok(Some(TransactionState::Terminated)),
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
        timer_handles: &mut ClientNonInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        let settings = &data.timer_config;
        match new_state {
            TransactionState::Trying => {
                data.send_request().await?;
                if !data.is_reliable() {
                    timer_handles.arm_e(data, settings.t1, command_tx.clone());
                }
                let deadline = Instant::now() + settings.transaction_timeout;
                timer_handles.timer_f_deadline = Some(deadline);
                timer_handles.timer_f = Some(start_timer_at(&data.id, TimerType::F, deadline, command_tx));
            }
            TransactionState::Proceeding => {
                // E and F keep running across the 1xx
                if let Some(deadline) = timer_handles.timer_e_deadline {
                    timer_handles.timer_e =
                        Some(start_timer_at(&data.id, TimerType::E, deadline, command_tx.clone()));
                }
                if let Some(deadline) = timer_handles.timer_f_deadline {
                    timer_handles.timer_f = Some(start_timer_at(&data.id, TimerType::F, deadline, command_tx));
                }
            }
            TransactionState::Completed => {
                if data.is_reliable() {
                    return Ok(Some(TransactionState::Terminated));
                }
                timer_handles.timer_k = Some(start_timer(&data.id, TimerType::K, settings.t4, command_tx));
            }
            _ => {}
        }
        Ok(None)
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ClientNonInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_e);
        cancel_timer(&mut timer_handles.timer_f);
        cancel_timer(&mut timer_handles.timer_k);
    }
}
