//! HTTP listener built on axum and axum-server.
//!
//! # Responsibilities
//! - Wrap a service's axum `Router` with the shared middleware stack
//! - Serve plain HTTP, or HTTPS when a certificate/key pair is configured
//! - Report bind/serve failures on the error-report channel
//! - Drain connections on stop, bounded by the caller's timeout

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_server::Handle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::TlsConfig;
use crate::lifecycle::{ErrorSink, GracefulListener, ServeError, Shutdown, StopError};
use crate::net::tls::load_tls_config;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A gracefully stoppable HTTP(S) server.
pub struct HttpListener {
    name: String,
    addr: SocketAddr,
    router: Router,
    tls: Option<TlsConfig>,
    request_timeout: Duration,
    handle: Handle,
    started: AtomicBool,
    drained: Shutdown,
}

impl HttpListener {
    pub fn new(name: impl Into<String>, addr: SocketAddr, router: Router) -> Self {
        Self {
            name: name.into(),
            addr,
            router,
            tls: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            handle: Handle::new(),
            started: AtomicBool::new(false),
            drained: Shutdown::new(),
        }
    }

    /// Serve HTTPS with the given certificate and key.
    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Wait until the server is bound. Returns `None` if binding failed.
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    /// Build the router with all middleware layers.
    #[allow(deprecated)]
    fn app(&self) -> Router {
        self.router
            .clone()
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Start serving on a background task.
    ///
    /// A fatal bind, TLS or serve error is reported once on `errs`.
    pub fn start(&self, errs: ErrorSink) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(listener = %self.name, "HTTP listener already started");
            return;
        }

        let name = self.name.clone();
        let addr = self.addr;
        let tls = self.tls.clone();
        let handle = self.handle.clone();
        let drained = self.drained.clone();
        let app = self.app().into_make_service();

        tokio::spawn(async move {
            let result = match tls {
                Some(tls) => match load_tls_config(&tls).await {
                    Ok(rustls) => {
                        tracing::info!(
                            listener = %name,
                            address = %addr,
                            cert = %tls.cert_path,
                            key = %tls.key_path,
                            "HTTPS service starting"
                        );
                        axum_server::bind_rustls(addr, rustls)
                            .handle(handle)
                            .serve(app)
                            .await
                    }
                    Err(source) => {
                        drained.trigger();
                        errs.report(ServeError::Tls { listener: name, source });
                        return;
                    }
                },
                None => {
                    tracing::info!(listener = %name, address = %addr, "HTTP service starting");
                    axum_server::bind(addr).handle(handle).serve(app).await
                }
            };

            drained.trigger();
            match result {
                Ok(()) => tracing::info!(listener = %name, "HTTP server stopped"),
                Err(source) => errs.report(ServeError::Io {
                    listener: name,
                    addr,
                    source,
                }),
            }
        });
    }
}

#[async_trait]
impl GracefulListener for HttpListener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stop(&self, timeout: Duration) -> Result<(), StopError> {
        tracing::info!(listener = %self.name, address = %self.addr, "Stopping http server");
        if !self.started.load(Ordering::SeqCst) {
            tracing::info!(listener = %self.name, "HTTP server was never started");
            return Ok(());
        }

        self.handle.graceful_shutdown(Some(timeout));

        let mut drained = self.drained.subscribe();
        if tokio::time::timeout(timeout, drained.recv()).await.is_err() {
            tracing::warn!(
                listener = %self.name,
                connections = self.handle.connection_count(),
                "HTTP shutdown timeout - existing connections are not completed yet"
            );
            return Ok(());
        }

        tracing::info!(listener = %self.name, address = %self.addr, "HTTP server stopped");
        Ok(())
    }
}
