//! # pihub-server: threaded multi-client TCP server
//!
//! The connection core of the PiHub daemon. A listener task accepts
//! TCP clients and spawns one worker task per connection; workers
//! watch their socket and a per-client wake descriptor through a
//! kernel readiness multiplexor and report activity to the
//! application through the [`ServerEvents`] callbacks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        pihub-server                        │
//! │  ┌──────────┐   ┌───────────────────┐   ┌──────────────┐   │
//! │  │ Listener │ → │  Client Registry  │ ← │ Worker / conn │  │
//! │  │ (accept) │   │ (ordered handles) │   │ (poll + wake) │  │
//! │  └────┬─────┘   └───────────────────┘   └──────┬────────┘  │
//! │       └──────────────► ServerEvents ◄──────────┘           │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Explicit control flow without an async runtime: every blocking
//! wait is a `mio::Poll` readiness wait or a mutex acquisition, and
//! cross-task wakeups (forced disconnect, shutdown) are `mio::Waker`
//! signals.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use pihub_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::new("0.0.0.0:65002".parse()?);
//! let server = Server::init(config, Arc::new(MyEvents))?;
//! server.run()?;
//! // ... later:
//! server.shutdown()?;
//! server.deinit()?;
//! ```

mod client;
mod config;
mod error;
mod events;
mod gate;
mod registry;
mod server;

pub use client::{ClientHandle, ClientInfo, ClientKey};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use events::ServerEvents;
pub use server::Server;
