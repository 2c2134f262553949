//! Datagram listener for raw-protocol adapters (CoAP and similar).
//!
//! # Responsibilities
//! - Receive datagrams and hand each to a [`PacketHandler`] on its own task
//! - Bound concurrent handlers via semaphore (backpressure)
//! - Send the handler's reply, if any, back to the peer
//! - On stop: stop receiving, then drain in-flight handlers within the timeout
//!
//! # Design Decisions
//! - The receive call is raced against the shutdown latch, so stop never
//!   waits on a quiet socket
//! - Handler wire formats live with the adapter, not here

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;

use crate::lifecycle::{ErrorSink, GracefulListener, ServeError, Shutdown, StopError};
use crate::net::bound::BoundAddr;
use crate::net::inflight::InFlight;

/// Largest datagram accepted.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Default limit on concurrently running handlers.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1_024;

/// Protocol logic for one datagram.
#[async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    /// Handle a datagram from `peer`. A returned payload is sent back to `peer`.
    async fn handle(&self, peer: SocketAddr, packet: Vec<u8>) -> Option<Vec<u8>>;
}

/// A gracefully stoppable UDP server.
pub struct UdpListener {
    name: String,
    addr: SocketAddr,
    handler: Arc<dyn PacketHandler>,
    max_in_flight: usize,
    in_flight: InFlight,
    started: AtomicBool,
    bound: BoundAddr,
    shutdown: Shutdown,
    receiving: Shutdown,
}

impl UdpListener {
    pub fn new(name: impl Into<String>, addr: SocketAddr, handler: Arc<dyn PacketHandler>) -> Self {
        Self {
            name: name.into(),
            addr,
            handler,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: InFlight::new(),
            started: AtomicBool::new(false),
            bound: BoundAddr::new(),
            shutdown: Shutdown::new(),
            receiving: Shutdown::new(),
        }
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handlers currently running.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.active_count()
    }

    /// Wait until the socket is bound. Returns `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.bound.wait().await
    }

    /// Start the receive loop on a background task.
    pub fn start(&self, errs: ErrorSink) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(listener = %self.name, "UDP listener already started");
            return;
        }

        let name = self.name.clone();
        let addr = self.addr;
        let handler = Arc::clone(&self.handler);
        let limit = Arc::new(Semaphore::new(self.max_in_flight));
        let in_flight = self.in_flight.clone();
        let bound = self.bound.clone();
        let mut shutdown = self.shutdown.subscribe();
        let receiving = self.receiving.clone();

        tokio::spawn(async move {
            let socket = match UdpSocket::bind(addr).await {
                Ok(socket) => Arc::new(socket),
                Err(source) => {
                    bound.fail();
                    receiving.trigger();
                    errs.report(ServeError::Io { listener: name, addr, source });
                    return;
                }
            };
            let local_addr = socket.local_addr().unwrap_or(addr);
            bound.set(local_addr);
            tracing::info!(listener = %name, address = %local_addr, "UDP service started");

            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, peer) = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok(received) => received,
                        Err(e) => {
                            // ICMP errors from earlier sends surface here; the socket is still usable.
                            tracing::debug!(listener = %name, error = %e, "UDP receive failed");
                            continue;
                        }
                    },
                };

                // Acquire permit first (backpressure)
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    permit = Arc::clone(&limit).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let guard = in_flight.track();
                tracing::trace!(listener = %name, work = %guard.id(), peer = %peer, bytes = len, "Datagram received");
                let packet = buf[..len].to_vec();
                let handler = Arc::clone(&handler);
                let socket = Arc::clone(&socket);
                let name = name.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    if let Some(reply) = handler.handle(peer, packet).await {
                        if let Err(e) = socket.send_to(&reply, peer).await {
                            tracing::warn!(listener = %name, peer = %peer, error = %e, "Failed to send UDP reply");
                        }
                    }
                });
            }

            receiving.trigger();
            tracing::info!(listener = %name, "UDP receive loop exited");
        });
    }
}

#[async_trait]
impl GracefulListener for UdpListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self, timeout: Duration) -> Result<(), StopError> {
        tracing::info!(listener = %self.name, address = %self.addr, "Stopping UDP server");
        if !self.started.load(Ordering::SeqCst) {
            tracing::info!(listener = %self.name, "UDP server was never started");
            return Ok(());
        }

        self.shutdown.trigger();

        let mut receiving = self.receiving.subscribe();
        let drain = async {
            receiving.recv().await;
            self.in_flight.wait_idle().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                listener = %self.name,
                in_flight = self.in_flight.active_count(),
                "UDP shutdown timeout - handlers are still running"
            );
            return Ok(());
        }

        tracing::info!(listener = %self.name, "UDP server stopped");
        Ok(())
    }
}
