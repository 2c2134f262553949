//! gRPC listener built on tonic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tonic::transport::server::{Router, TcpIncoming};
use tonic::transport::{Server, ServerTlsConfig};

use crate::config::TlsConfig;
use crate::lifecycle::{ErrorSink, GracefulListener, ServeError, Shutdown, StopError};
use crate::net::bound::BoundAddr;
use crate::net::tls::{load_grpc_identity, TlsError};

/// Hook that binds the service implementations to the server.
pub type RegisterFn = Box<dyn FnOnce(&mut Server) -> Router + Send>;

/// A gracefully stoppable gRPC server.
pub struct GrpcListener {
    name: String,
    addr: SocketAddr,
    tls: Option<TlsConfig>,
    started: AtomicBool,
    bound: BoundAddr,
    shutdown: Shutdown,
    drained: Shutdown,
}

impl GrpcListener {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
            tls: None,
            started: AtomicBool::new(false),
            bound: BoundAddr::new(),
            shutdown: Shutdown::new(),
            drained: Shutdown::new(),
        }
    }

    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait until the server is bound. Returns `None` if it never bound.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.bound.wait().await
    }

    /// Start serving on a background task.
    ///
    /// A missing `register` hook is reported on `errs` immediately, without binding.
    pub fn start(&self, errs: ErrorSink, register: Option<RegisterFn>) {
        let Some(register) = register else {
            self.bound.fail();
            errs.report(ServeError::MissingRegistration {
                listener: self.name.clone(),
            });
            return;
        };

        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(listener = %self.name, "gRPC listener already started");
            return;
        }

        let name = self.name.clone();
        let addr = self.addr;
        let tls = self.tls.clone();
        let bound = self.bound.clone();
        let mut shutdown = self.shutdown.subscribe();
        let drained = self.drained.clone();

        tokio::spawn(async move {
            let result = async {
                let mut builder = Server::builder();
                if let Some(tls) = &tls {
                    let identity = load_grpc_identity(tls)
                        .await
                        .map_err(|source| ServeError::Tls { listener: name.clone(), source })?;
                    builder = builder
                        .tls_config(ServerTlsConfig::new().identity(identity))
                        .map_err(|e| ServeError::Tls {
                            listener: name.clone(),
                            source: TlsError::Invalid(e.to_string()),
                        })?;
                    tracing::info!(listener = %name, cert = %tls.cert_path, key = %tls.key_path, "gRPC service using TLS");
                }

                let router = register(&mut builder);

                let listener = TcpListener::bind(addr).await.map_err(|source| ServeError::Io {
                    listener: name.clone(),
                    addr,
                    source,
                })?;
                let local_addr = listener.local_addr().map_err(|source| ServeError::Io {
                    listener: name.clone(),
                    addr,
                    source,
                })?;
                let incoming = TcpIncoming::from_listener(listener, true, None).map_err(|e| {
                    ServeError::Serve {
                        listener: name.clone(),
                        message: e.to_string(),
                    }
                })?;

                bound.set(local_addr);
                tracing::info!(listener = %name, address = %local_addr, "gRPC service started");

                router
                    .serve_with_incoming_shutdown(incoming, async move { shutdown.recv().await })
                    .await
                    .map_err(|e| ServeError::Serve {
                        listener: name.clone(),
                        message: e.to_string(),
                    })
            }
            .await;

            bound.fail();
            drained.trigger();
            match result {
                Ok(()) => tracing::info!(listener = %name, "gRPC server stopped"),
                Err(e) => errs.report(e),
            }
        });
    }
}

#[async_trait]
impl GracefulListener for GrpcListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self, timeout: Duration) -> Result<(), StopError> {
        tracing::info!(listener = %self.name, address = %self.addr, "Stopping gRPC server");
        if !self.started.load(Ordering::SeqCst) {
            tracing::info!(listener = %self.name, "gRPC server was never started");
            return Ok(());
        }

        self.shutdown.trigger();

        let mut drained = self.drained.subscribe();
        if tokio::time::timeout(timeout, drained.recv()).await.is_err() {
            tracing::error!(
                listener = %self.name,
                timeout = ?timeout,
                "Stop timeout exceeded - some calls are still active"
            );
        }

        tracing::info!(listener = %self.name, address = %self.addr, "gRPC server stopped");
        Ok(())
    }
}
