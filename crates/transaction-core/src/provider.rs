//! The transaction provider: owns every transaction, routes transport
//! events to them, and relays their events to the transaction user (TU).
//!
//! ```text
//!  Transport ──TransportEvent──▶ message loop ──commands──▶ transactions
//!                                     │                          │
//!                                     └──────TransactionEvent────┴──▶ relay ──▶ TU
//! ```
//!
//! The relay is the only place transactions are removed: it drops a
//! transaction from the map when it sees its `TransactionTerminated` event.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use sigstack_sip_core::{HeaderAccess, Message, Method, Request, Response};
use sigstack_sip_transport::{Transport, TransportEvent};

use crate::client::ClientTransaction;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::server::ServerTransaction;
use crate::transaction::{
    InternalTransactionCommand, Transaction, TransactionContext, TransactionEvent, TransactionKey,
    TransactionKind, TransactionState,
};
use crate::utils::{create_cancel_request, ensure_branch, stamp_received};

/// Opaque per-transaction data attached by the TU
pub type ApplicationData = Arc<dyn Any + Send + Sync>;

struct TransactionEntry {
    transaction: Box<dyn Transaction>,
    application_data: Option<ApplicationData>,
}

impl TransactionEntry {
    fn new(transaction: Box<dyn Transaction>) -> Self {
        Self {
            transaction,
            application_data: None,
        }
    }
}

type TransactionMap = Arc<Mutex<HashMap<TransactionKey, TransactionEntry>>>;

/// Creates, drives and releases SIP transactions over one transport.
///
/// ```no_run
/// use std::sync::Arc;
/// use sigstack_sip_transport::bind_udp;
/// use sigstack_transaction_core::{ProviderConfig, TransactionProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (transport, transport_rx) = bind_udp("127.0.0.1:5060".parse()?).await?;
/// let (provider, mut events) =
///     TransactionProvider::new(Arc::new(transport), transport_rx, ProviderConfig::default());
///
/// while let Some(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TransactionProvider {
    transport: Arc<dyn Transport>,
    config: ProviderConfig,
    transactions: TransactionMap,
    /// Transactions and the message loop report here; the relay drains it
    internal_tx: mpsc::Sender<TransactionEvent>,
    running: Arc<AtomicBool>,
    message_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TransactionProvider {
    /// Starts a provider reading `transport_rx`.
    ///
    /// Returns the provider and the receiver for [`TransactionEvent`]s. Must
    /// be called from within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
        config: ProviderConfig,
    ) -> (Self, mpsc::Receiver<TransactionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(config.event_channel_capacity);
        let transactions: TransactionMap = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(relay_events(internal_rx, transactions.clone(), events_tx));

        let running = Arc::new(AtomicBool::new(true));
        let router = MessageRouter {
            transactions: transactions.clone(),
            context: TransactionContext {
                transport: transport.clone(),
                events_tx: internal_tx.clone(),
                timer_settings: config.timers.clone(),
                command_channel_capacity: config.command_channel_capacity,
            },
            report_unmatched_messages: config.report_unmatched_messages,
        };
        let message_loop = tokio::spawn(router.run(transport_rx, running.clone()));

        let provider = TransactionProvider {
            transport,
            config,
            transactions,
            internal_tx,
            running,
            message_loop: Arc::new(Mutex::new(Some(message_loop))),
        };

        (provider, events_rx)
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn context(&self) -> TransactionContext {
        TransactionContext {
            transport: self.transport.clone(),
            events_tx: self.internal_tx.clone(),
            timer_settings: self.config.timers.clone(),
            command_channel_capacity: self.config.command_channel_capacity,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::InvalidState("transaction provider is shut down".to_string()))
        }
    }

    async fn lookup<T>(&self, key: &TransactionKey, f: impl FnOnce(&dyn Transaction) -> T) -> Result<T> {
        let transactions = self.transactions.lock().await;
        transactions
            .get(key)
            .map(|entry| f(entry.transaction.as_ref()))
            .ok_or_else(|| Error::TransactionNotFound(key.clone()))
    }

    /// Creates a client transaction for `request` without sending it.
    ///
    /// The top Via gets a fresh branch unless it already has an RFC 3261
    /// one. The request needs a Via and a CSeq matching its method, and a
    /// SIP Request-URI with a host.
    pub async fn create_client_transaction(&self, mut request: Request) -> Result<TransactionKey> {
        self.ensure_running()?;

        let cseq = request
            .cseq()
            .ok_or(sigstack_sip_core::Error::MissingHeader("CSeq"))?;
        if cseq.method != request.method {
            return Err(sigstack_sip_core::Error::InvalidMessage(format!(
                "CSeq method {} does not match request method {}",
                cseq.method, request.method
            ))
            .into());
        }

        let branch = ensure_branch(&mut request)?;
        let key = TransactionKey::new(branch, request.method.clone(), false);

        let mut transactions = self.transactions.lock().await;
        if transactions.contains_key(&key) {
            return Err(Error::TransactionExists(key));
        }
        let transaction = ClientTransaction::new(key.clone(), request, &self.context())?;
        transactions.insert(key.clone(), TransactionEntry::new(Box::new(transaction)));

        debug!(id=%key, "Created client transaction");
        Ok(key)
    }

    /// Sends the request of a client transaction created with
    /// [`create_client_transaction`](Self::create_client_transaction).
    pub async fn send_request(&self, key: &TransactionKey) -> Result<()> {
        self.ensure_running()?;
        let (kind, state, cmd_tx) = self
            .lookup(key, |tx| (tx.kind(), tx.state(), tx.command_sender()))
            .await?;

        if kind.is_server() {
            return Err(Error::InvalidState(format!("{} is a server transaction", key)));
        }
        if state != TransactionState::Initial {
            return Err(Error::InvalidState(format!("{} already sent (state {:?})", key, state)));
        }

        cmd_tx
            .send(InternalTransactionCommand::TransitionTo(kind.active_state()))
            .await?;
        Ok(())
    }

    /// Sends `response` on the server transaction `key`.
    ///
    /// Fails with `InvalidState` once the transaction has sent its final
    /// response; in Accepted only 2xx retransmissions go through.
    pub async fn send_response(&self, key: &TransactionKey, response: Response) -> Result<()> {
        self.ensure_running()?;
        let (kind, state, cmd_tx) = self
            .lookup(key, |tx| (tx.kind(), tx.state(), tx.command_sender()))
            .await?;

        if !kind.is_server() {
            return Err(Error::InvalidState(format!("{} is a client transaction", key)));
        }
        let allowed = match state {
            TransactionState::Initial | TransactionState::Trying | TransactionState::Proceeding => true,
            TransactionState::Accepted => response.status().is_success(),
            _ => false,
        };
        if !allowed {
            return Err(Error::InvalidState(format!(
                "cannot send {} on {} in state {:?}",
                response.status(),
                key,
                state
            )));
        }

        cmd_tx
            .send(InternalTransactionCommand::ProcessMessage(Message::Response(response)))
            .await?;
        Ok(())
    }

    /// Cancels the pending INVITE client transaction `invite_key`.
    ///
    /// The CANCEL goes out on its own non-INVITE client transaction, whose
    /// key is returned. The INVITE transaction stays alive until its final
    /// response (normally 487) arrives.
    pub async fn cancel(&self, invite_key: &TransactionKey) -> Result<TransactionKey> {
        self.ensure_running()?;
        let (kind, state, invite) = self
            .lookup(invite_key, |tx| (tx.kind(), tx.state(), tx.original_request().clone()))
            .await?;

        if kind != TransactionKind::InviteClient {
            return Err(Error::InvalidState(format!("{} is not an INVITE client transaction", invite_key)));
        }
        if !matches!(state, TransactionState::Calling | TransactionState::Proceeding) {
            return Err(Error::InvalidState(format!(
                "cannot cancel {} in state {:?}",
                invite_key, state
            )));
        }

        let cancel = create_cancel_request(&invite)?;
        let cancel_key = self.create_client_transaction(cancel).await?;
        self.send_request(&cancel_key).await?;
        info!(id=%invite_key, cancel=%cancel_key, "Sent CANCEL");
        Ok(cancel_key)
    }

    pub async fn set_application_data(&self, key: &TransactionKey, data: ApplicationData) -> Result<()> {
        let mut transactions = self.transactions.lock().await;
        let entry = transactions
            .get_mut(key)
            .ok_or_else(|| Error::TransactionNotFound(key.clone()))?;
        entry.application_data = Some(data);
        Ok(())
    }

    /// Data attached with [`set_application_data`](Self::set_application_data)
    pub async fn application_data(&self, key: &TransactionKey) -> Option<ApplicationData> {
        let transactions = self.transactions.lock().await;
        transactions.get(key).and_then(|entry| entry.application_data.clone())
    }

    pub async fn transaction_state(&self, key: &TransactionKey) -> Result<TransactionState> {
        self.lookup(key, |tx| tx.state()).await
    }

    pub async fn transaction_kind(&self, key: &TransactionKey) -> Result<TransactionKind> {
        self.lookup(key, |tx| tx.kind()).await
    }

    /// The request that created the transaction
    pub async fn original_request(&self, key: &TransactionKey) -> Result<Request> {
        self.lookup(key, |tx| tx.original_request().clone()).await
    }

    pub async fn remote_addr(&self, key: &TransactionKey) -> Result<Option<SocketAddr>> {
        self.lookup(key, |tx| tx.remote_addr()).await
    }

    /// Keys of every transaction not yet released
    pub async fn active_transactions(&self) -> Vec<TransactionKey> {
        self.transactions.lock().await.keys().cloned().collect()
    }

    /// Terminates every transaction, stops routing and closes the transport.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let senders: Vec<_> = {
            let transactions = self.transactions.lock().await;
            transactions
                .values()
                .map(|entry| entry.transaction.command_sender())
                .collect()
        };
        debug!("Terminating {} transactions", senders.len());
        for cmd_tx in senders {
            let _ = cmd_tx.send(InternalTransactionCommand::Terminate).await;
        }

        if let Some(handle) = self.message_loop.lock().await.take() {
            handle.abort();
        }
        self.transport.close().await?;
        info!("Transaction provider shut down");
        Ok(())
    }
}

impl fmt::Debug for TransactionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionProvider")
            .field("transport", &self.transport)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

/// Forwards transaction events to the TU, releasing terminated transactions.
async fn relay_events(
    mut internal_rx: mpsc::Receiver<TransactionEvent>,
    transactions: TransactionMap,
    events_tx: mpsc::Sender<TransactionEvent>,
) {
    while let Some(event) = internal_rx.recv().await {
        if let TransactionEvent::TransactionTerminated { transaction_id, .. } = &event {
            let removed = transactions.lock().await.remove(transaction_id);
            if removed.is_some() {
                debug!(id=%transaction_id, "Released terminated transaction");
            }
        }
        if events_tx.send(event).await.is_err() {
            trace!("Transaction event receiver dropped");
        }
    }
    debug!("Transaction event relay stopped");
}

/// The inbound half of the provider
struct MessageRouter {
    transactions: TransactionMap,
    context: TransactionContext,
    report_unmatched_messages: bool,
}

impl MessageRouter {
    async fn run(self, mut transport_rx: mpsc::Receiver<TransportEvent>, running: Arc<AtomicBool>) {
        debug!("Starting transaction message loop");

        while let Some(event) = transport_rx.recv().await {
            if !running.load(Ordering::Acquire) {
                break;
            }
            match event {
                TransportEvent::MessageReceived { message, source, .. } => match message {
                    Message::Request(request) => self.route_request(request, source).await,
                    Message::Response(response) => self.route_response(response, source).await,
                },
                TransportEvent::Error { error } => {
                    warn!("Transport error: {}", error);
                    self.report(TransactionEvent::Error {
                        transaction_id: None,
                        error,
                    })
                    .await;
                }
                TransportEvent::Closed => {
                    info!("Transport closed");
                    break;
                }
            }
        }

        debug!("Transaction message loop stopped");
    }

    async fn report(&self, event: TransactionEvent) {
        let _ = self.context.events_tx.send(event).await;
    }

    async fn command_sender(&self, key: &TransactionKey) -> Option<mpsc::Sender<InternalTransactionCommand>> {
        let transactions = self.transactions.lock().await;
        transactions.get(key).map(|entry| entry.transaction.command_sender())
    }

    async fn deliver(&self, key: &TransactionKey, cmd_tx: mpsc::Sender<InternalTransactionCommand>, message: Message) {
        if cmd_tx
            .send(InternalTransactionCommand::ProcessMessage(message))
            .await
            .is_err()
        {
            debug!(id=%key, "Transaction ended before the message was delivered");
        }
    }

    async fn route_response(&self, response: Response, source: SocketAddr) {
        let key = TransactionKey::from_response(&response);
        let cmd_tx = match &key {
            Some(key) => self.command_sender(key).await,
            None => None,
        };

        match (key, cmd_tx) {
            (Some(key), Some(cmd_tx)) => {
                trace!(id=%key, "Routing {} response", response.status());
                self.deliver(&key, cmd_tx, Message::Response(response)).await;
            }
            (key, _) => {
                debug!(?key, %source, "Dropping unmatched {} response", response.status());
                if self.report_unmatched_messages {
                    self.report(TransactionEvent::UnmatchedMessage {
                        message: Message::Response(response),
                        source,
                    })
                    .await;
                }
            }
        }
    }

    async fn route_request(&self, mut request: Request, source: SocketAddr) {
        stamp_received(&mut request, source);

        let Some(key) = TransactionKey::from_request(&request) else {
            warn!(%source, "{} request without a Via branch", request.method);
            self.report_unmatched(request, source).await;
            return;
        };

        // ACKs never create transactions; one for a 2xx has its own branch
        // and ends up unmatched.
        if request.method == Method::Ack {
            let invite_key = key.with_method(Method::Invite);
            match self.command_sender(&invite_key).await {
                Some(cmd_tx) => self.deliver(&invite_key, cmd_tx, Message::Request(request)).await,
                None => self.report_unmatched(request, source).await,
            }
            return;
        }

        if let Some(cmd_tx) = self.command_sender(&key).await {
            trace!(id=%key, "Request retransmission");
            self.deliver(&key, cmd_tx, Message::Request(request)).await;
            return;
        }

        let transaction = ServerTransaction::new(key.clone(), request.clone(), source, &self.context);
        let kind = transaction.kind();
        if let Err(e) = transaction
            .command_sender()
            .send(InternalTransactionCommand::TransitionTo(kind.active_state()))
            .await
        {
            warn!(id=%key, "Failed to start server transaction: {}", e);
            return;
        }

        let pending_invite = {
            let mut transactions = self.transactions.lock().await;
            transactions.insert(key.clone(), TransactionEntry::new(Box::new(transaction)));

            if request.method == Method::Cancel {
                let invite_key = key.with_method(Method::Invite);
                transactions
                    .get(&invite_key)
                    .filter(|entry| entry.transaction.state() == TransactionState::Proceeding)
                    .map(|_| invite_key)
            } else {
                None
            }
        };

        debug!(id=%key, %source, "New server transaction for {}", request.method);
        let event = match pending_invite {
            Some(invite_transaction_id) => TransactionEvent::CancelReceived {
                transaction_id: key,
                invite_transaction_id,
                cancel_request: request,
            },
            None => TransactionEvent::NewRequest {
                transaction_id: key,
                request,
                source,
            },
        };
        self.report(event).await;
    }

    async fn report_unmatched(&self, request: Request, source: SocketAddr) {
        debug!(%source, "Unmatched {} request", request.method);
        self.report(TransactionEvent::UnmatchedMessage {
            message: Message::Request(request),
            source,
        })
        .await;
    }
}
