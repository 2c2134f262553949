//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! start(errs)
//!     → tls.rs (optional: validate PEM pair, build rustls / tonic identity)
//!     → http.rs | grpc.rs | udp.rs (bind, spawn serve task)
//!     → bound.rs (publish local address)
//!     → fatal error → ErrorSink
//!
//! stop(timeout)
//!     → stop accepting → inflight.rs / server drain → bounded wait
//! ```
//!
//! # Design Decisions
//! - Every listener owns its resources; composition, no listener hierarchy
//! - TLS is optional and enabled only when both certificate and key are given
//! - A stop deadline elapsing with work outstanding is a warning, not an error

pub mod bound;
pub mod grpc;
pub mod http;
pub mod inflight;
pub mod tls;
pub mod udp;

pub use grpc::{GrpcListener, RegisterFn};
pub use http::HttpListener;
pub use udp::{PacketHandler, UdpListener};
