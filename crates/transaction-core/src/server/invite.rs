//! INVITE server transaction (RFC 3261 §17.2.1, RFC 6026 §7.1).
//!
//! Responses come from the TU as `ProcessMessage(Response)`; requests are
//! retransmitted INVITEs and ACKs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use sigstack_sip_core::{Message, Method, Request, Response};

use crate::error::{Error, Result};
use crate::server::data::ServerTransactionData;
use crate::timer::{cancel_timer, start_timer, TimerType};
use crate::transaction::logic::TransactionLogic;
use crate::transaction::{InternalTransactionCommand, TransactionEvent, TransactionKind, TransactionState};

#[derive(Default, Debug)]
pub(crate) struct ServerInviteTimerHandles {
    timer_g: Option<JoinHandle<()>>,
    current_timer_g_interval: Option<Duration>,
    timer_h: Option<JoinHandle<()>>,
    timer_i: Option<JoinHandle<()>>,
    timer_l: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ServerInviteLogic;

impl ServerInviteLogic {
    async fn send_response(
        &self,
        data: &Arc<ServerTransactionData>,
        response: Response,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        let status = response.status();
        match current_state {
            TransactionState::Proceeding => {
                data.send_response(response).await?;
                if status.is_provisional() {
                    Ok(None)
                } else if status.is_success() {
                    Ok(Some(TransactionState::Accepted))
                } else {
                    Ok(Some(TransactionState::Completed))
                }
            }
            // The TU retransmits its own 2xx while waiting for the ACK
            TransactionState::Accepted if status.is_success() => {
                data.send_response(response).await?;
                Ok(None)
            }
            _ => Err(Error::InvalidState(format!(
                "cannot send {} from INVITE server transaction {} in state {:?}",
                status, data.id, current_state
            ))),
        }
    }

    async fn handle_request(
        &self,
        data: &Arc<ServerTransactionData>,
        request: Request,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        match (&request.method, current_state) {
            (Method::Ack, TransactionState::Completed) => {
                debug!(id=%data.id, "ACK received for final response");
                Ok(Some(TransactionState::Confirmed))
            }
            (Method::Ack, TransactionState::Accepted) => {
                data.report(TransactionEvent::AckReceived {
                    transaction_id: data.id.clone(),
                    request,
                })
                .await;
                Ok(None)
            }
            (Method::Invite, TransactionState::Proceeding | TransactionState::Completed) => {
                data.retransmit_last_response().await?;
                Ok(None)
            }
            (method, state) => {
                trace!(id=%data.id, ?state, "Absorbing {} request", method);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl TransactionLogic<ServerTransactionData, ServerInviteTimerHandles> for ServerInviteLogic {
    fn kind(&self) -> TransactionKind {
        TransactionKind::InviteServer
    }

    async fn process_message(
        &self,
        data: &Arc<ServerTransactionData>,
        message: Message,
        current_state: TransactionState,
    ) -> Result<Option<TransactionState>> {
        match message {
            Message::Response(response) => self.send_response(data, response, current_state).await,
            Message::Request(request) => self.handle_request(data, request, current_state).await,
        }
    }

    async fn handle_timer(
        &self,
        data: &Arc<ServerTransactionData>,
        timer: TimerType,
        current_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        match (timer, current_state) {
            (TimerType::G, TransactionState::Completed) => {
                let interval = timer_handles.current_timer_g_interval.unwrap_or(data.timer_config.t1);
                let next = data.timer_config.next_interval(interval);
                debug!(id=%data.id, "Timer G fired (next in {:?})", next);
                data.retransmit_last_response().await?;
                timer_handles.current_timer_g_interval = Some(next);
                timer_handles.timer_g = Some(start_timer(&data.id, TimerType::G, next, command_tx));
                Ok(None)
            }
            (TimerType::H, TransactionState::Completed) => {
                warn!(id=%data.id, "Timer H fired, no ACK received");
                data.report(TransactionEvent::TransactionTimeout {
                    transaction_id: data.id.clone(),
                })
                .await;
                Ok(Some(TransactionState::Terminated))
            }
            (TimerType::I, TransactionState::Confirmed) | (TimerType::L, TransactionState::Accepted) => {
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
        data: &Arc<ServerTransactionData>,
        new_state: TransactionState,
        _previous_state: TransactionState,
        timer_handles: &mut ServerInviteTimerHandles,
        command_tx: mpsc::Sender<InternalTransactionCommand>,
    ) -> Result<Option<TransactionState>> {
        let settings = &data.timer_config;
        match new_state {
            TransactionState::Completed => {
                if !data.is_reliable() {
                    timer_handles.current_timer_g_interval = Some(settings.t1);
                    timer_handles.timer_g =
                        Some(start_timer(&data.id, TimerType::G, settings.t1, command_tx.clone()));
                }
                timer_handles.timer_h = Some(start_timer(
                    &data.id,
                    TimerType::H,
                    settings.transaction_timeout,
                    command_tx,
                ));
            }
            TransactionState::Confirmed => {
                if data.is_reliable() {
                    return Ok(Some(TransactionState::Terminated));
                }
                timer_handles.timer_i = Some(start_timer(&data.id, TimerType::I, settings.t4, command_tx));
            }
            TransactionState::Accepted => {
                timer_handles.timer_l = Some(start_timer(
                    &data.id,
                    TimerType::L,
                    settings.transaction_timeout,
                    command_tx,
                ));
            }
            _ => {}
        }
        Ok(None)
    }

    fn cancel_all_specific_timers(&self, timer_handles: &mut ServerInviteTimerHandles) {
        cancel_timer(&mut timer_handles.timer_g);
        cancel_timer(&mut timer_handles.timer_h);
        cancel_timer(&mut timer_handles.timer_i);
        cancel_timer(&mut timer_handles.timer_l);
    }
}
