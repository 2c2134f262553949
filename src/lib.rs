//! devicehub: bootstrap configuration sync and graceful listener lifecycle.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                       DEVICEHUB                          │
//!                  │                                                          │
//!   Redis Streams  │  ┌──────────────┐   ┌──────────────┐   ┌─────────────┐  │
//!  ────────────────┼─▶│    events    │──▶│  dispatcher  │──▶│  provision  │  │
//!   thing/channel  │  │   consumer   │   │ decode+route │   │ ConfigStore │  │
//!   events         │  └──────┬───────┘   └──────────────┘   └──────┬──────┘  │
//!                  │         │ ack                                  │         │
//!   HTTP clients   │  ┌──────┴───────┐                      ┌───────┴──────┐  │
//!  ────────────────┼─▶│  net::http   │─────────────────────▶│ provision::  │  │
//!                  │  │  net::grpc   │                      │     api      │  │
//!                  │  │  net::udp    │                      └──────────────┘  │
//!                  │  └──────┬───────┘                                        │
//!                  │         │ GracefulListener                               │
//!                  │  ┌──────┴────────────────────────────────────────────┐  │
//!                  │  │ lifecycle: ServiceMonitor, signals, error fan-in   │  │
//!                  │  └───────────────────────────────────────────────────┘  │
//!                  │  ┌───────────┐ ┌───────────────┐ ┌──────────────────┐   │
//!                  │  │  config   │ │ observability │ │    resilience    │   │
//!                  │  └───────────┘ └───────────────┘ └──────────────────┘   │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod events;
pub mod net;
pub mod provision;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::ServiceConfig;
pub use events::StreamConsumer;
pub use lifecycle::{GracefulListener, ServiceMonitor};
