//! Line-oriented TCP Chat Relay Library
//!
//! Clients connect over TCP, identify themselves as a passive viewer or a
//! named messenger, and the relay fans their messages out.
//!
//! # Protocol
//! Client → server, one command per line:
//! - `viewer` / `name:<N>`: handshake, first line only
//! - `<sender>:listusers`, `<sender>:help`, `<sender>:?`
//! - `<sender>:chat:<body>`: broadcast
//! - `<sender>:chat:<recipient>:<body>`: private message
//!
//! The `<sender>:` prefix is optional; commands are always attributed to the
//! messenger's registered name.
//!
//! # Architecture
//! A single [`ChatServer`] task owns all state and runs a fixed tick:
//! accept one connection, drop disconnected sessions, decode inbound lines
//! into [`Intent`]s, then flush the deliveries the router computed.
//! No locks needed - nothing else touches the registry.
//!
//! # Example
//! ```ignore
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(&ServerConfig::default()).await.unwrap();
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.unwrap();
//!         shutdown.shutdown();
//!     });
//!
//!     server.run().await;
//! }
//! ```

pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod handler;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use codec::{Handshake, Intent};
pub use config::ServerConfig;
pub use error::AppError;
pub use registry::Registry;
pub use router::Delivery;
pub use server::{start, ChatServer, ShutdownHandle};
pub use session::{Role, Session};
pub use types::SessionId;
