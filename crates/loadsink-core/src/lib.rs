//! # loadsink - a deliberately flaky HTTP/1.1 load target
//!
//! A minimal concurrent responder for benchmarking clients, proxies and
//! load balancers under controlled fault conditions. There is no routing
//! and no request parsing beyond detecting a complete header block; the
//! value is the dispatch skeleton and the reproducible fault behavior.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Dispatcher                            │
//! │      accept → set non-blocking → round-robin handoff        │
//! └─────────────────────────────────────────────────────────────┘
//!                │                │                │
//!                ▼                ▼                ▼
//!          ┌───────────┐   ┌───────────┐    ┌───────────┐
//!          │  Worker 0 │   │  Worker 1 │ …  │ Worker N-1│
//!          │  (epoll)  │   │  (epoll)  │    │  (epoll)  │
//!          └───────────┘   └───────────┘    └───────────┘
//!                │                │                │
//!                └────────────────┼────────────────┘
//!                                 ▼
//!          ┌─────────────────────────────────────────┐
//!          │   FaultInjector · ResponseTable · Stats │
//!          │   every Nth request gets a canned error │
//!          └─────────────────────────────────────────┘
//! ```
//!
//! Each accepted connection is pinned to one worker for its whole life.
//! Workers multiplex their sockets on a private epoll instance in
//! edge-triggered mode and answer every complete request with either the
//! canned success response or, every Nth request, the next entry of a
//! fixed error-response table. An optional artificial delay stalls the
//! worker before each response to model server-side latency.
//!
//! The process runs until externally terminated; there is no graceful
//! shutdown path.

pub mod config;
pub mod dispatcher;
pub mod env;
pub mod fault;
pub mod registry;
pub mod response;
pub mod server;
pub mod sprint;
pub mod stats;
pub mod worker;

pub use config::{ConfigError, ServerConfig};
pub use dispatcher::Dispatcher;
pub use fault::{cycle_from_rate, FaultInjector, Verdict};
pub use registry::{ConnectionRegistry, LiveConnections};
pub use response::{has_complete_request, ResponseTable, ERROR_RESPONSE_COUNT};
pub use server::Server;
pub use stats::ServerStats;
pub use worker::Worker;

pub use env::{env_get, env_get_bool};
pub use sprint::LogLevel;
