use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use sigstack_sip_core::{parse_message, Message};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

// Maximum UDP payload
const MAX_UDP_PACKET_SIZE: usize = 65_507;
// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// UDP transport for SIP messages
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    closed: AtomicBool,
    shutdown: Notify,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address
    pub async fn bind(
        addr: SocketAddr,
        channel_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = socket.local_addr()?;
        info!("SIP UDP transport bound to {}", local_addr);

        let capacity = channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(capacity);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                events_tx,
            }),
        };

        transport.spawn_receive_loop(local_addr);

        Ok((transport, events_rx))
    }

    // Spawns a task to receive datagrams until the transport is closed
    fn spawn_receive_loop(&self, local_addr: SocketAddr) {
        let transport = self.clone();
        tokio::spawn(async move {
            let inner = &transport.inner;
            let mut buffer = vec![0u8; MAX_UDP_PACKET_SIZE];

            while !inner.closed.load(Ordering::Acquire) {
                let received = tokio::select! {
                    _ = inner.shutdown.notified() => break,
                    received = inner.socket.recv_from(&mut buffer) => received,
                };

                let (len, src) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        if inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        error!("Error receiving UDP packet: {}", e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error receiving packet: {}", e),
                            })
                            .await;
                        continue;
                    }
                };

                let packet = Bytes::copy_from_slice(&buffer[..len]);
                trace!("Received {} bytes from {}", len, src);

                // Keep-alive CRLFs carry no message
                if packet.iter().all(|b| matches!(b, b'\r' | b'\n')) {
                    continue;
                }

                match parse_message(&packet) {
                    Ok(message) => {
                        debug!(source = %src, "Received SIP {}", message.short_description());
                        let event = TransportEvent::MessageReceived {
                            message,
                            source: src,
                            destination: local_addr,
                        };
                        if let Err(e) = inner.events_tx.send(event).await {
                            error!("Error sending event: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(source = %src, "Dropping malformed datagram: {}", e);
                        let _ = inner
                            .events_tx
                            .send(TransportEvent::Error {
                                error: format!("Error parsing SIP message from {}: {}", src, e),
                            })
                            .await;
                    }
                }
            }

            let _ = inner.events_tx.send(TransportEvent::Closed).await;
            debug!("UDP receive loop on {} terminated", local_addr);
        });
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.socket.local_addr().map_err(Error::from)
    }

    async fn send_message(&self, message: Message, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }

        let bytes = message.to_bytes();
        if bytes.len() > MAX_UDP_PACKET_SIZE {
            return Err(Error::SendFailed {
                destination,
                reason: format!("message of {} bytes exceeds UDP limit", bytes.len()),
            });
        }

        debug!(
            "Sending {} ({} bytes) to {}",
            message.short_description(),
            bytes.len(),
            destination
        );

        let sent = self
            .inner
            .socket
            .send_to(&bytes, destination)
            .await
            .map_err(|e| Error::SendFailed {
                destination,
                reason: e.to_string(),
            })?;
        if sent != bytes.len() {
            return Err(Error::SendFailed {
                destination,
                reason: format!("short write: {} of {} bytes", sent, bytes.len()),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.shutdown.notify_one();
            info!("UDP transport closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(addr) = self.inner.socket.local_addr() {
            write!(f, "UdpTransport({})", addr)
        } else {
            write!(f, "UdpTransport(<e>)")
        }
    }
}
