//! Bound-address publication for listeners that bind inside their serve task.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    Pending,
    Bound(SocketAddr),
    Failed,
}

/// Publishes the local address once the serve task has bound its socket.
///
/// Lets callers that asked for port 0 discover the real port.
#[derive(Debug, Clone)]
pub struct BoundAddr {
    tx: Arc<watch::Sender<BindState>>,
}

impl BoundAddr {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BindState::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, addr: SocketAddr) {
        self.tx.send_replace(BindState::Bound(addr));
    }

    pub fn fail(&self) {
        self.tx.send_replace(BindState::Failed);
    }

    /// Current address, if bound.
    pub fn get(&self) -> Option<SocketAddr> {
        match *self.tx.borrow() {
            BindState::Bound(addr) => Some(addr),
            _ => None,
        }
    }

    /// Wait until the socket is bound. Returns `None` if binding failed.
    pub async fn wait(&self) -> Option<SocketAddr> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|s| *s != BindState::Pending)
            .await
            .map(|s| *s)
            .unwrap_or(BindState::Failed);
        match state {
            BindState::Bound(addr) => Some(addr),
            _ => None,
        }
    }
}

impl Default for BoundAddr {
    fn default() -> Self {
        Self::new()
    }
}
