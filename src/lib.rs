//! Channel-routed WebSocket messaging
//!
//! Accepts WebSocket connections, routes each inbound JSON frame to the
//! handler registered for its channel, and lets handlers push messages
//! back to one client, a group, a specific id, or everyone else.
//!
//! # Architecture
//! - `Registry` holds live `Connection`s behind a read/write lock
//! - Each connection has a read loop submitting into a bounded `DispatchQueue`
//!   and a writer task draining the connection's outbound channel
//! - A single `Dispatcher` task runs handlers one at a time in arrival order
//! - Handlers talk back through the `Router` fan-out API
//!
//! # Wire format
//! - Inbound: `{"Channel": "...", "Message": "..."}`
//! - Outbound: `{"channel": "...", "message": "..."}`
//!
//! # Example
//! ```ignore
//! use socket_router::{FrameType, ServerConfig, SocketServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = SocketServer::new(ServerConfig::default());
//!
//!     server.on("chat", |router, conn, frame_type, message| {
//!         router.broadcast(conn, frame_type, "chat", &message);
//!     });
//!
//!     server.listen_and_serve().await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use connection::Connection;
pub use dispatcher::{DispatchQueue, Dispatcher, Handler, HandlerTable};
pub use error::{AppError, SendError};
pub use handler::{handle_connection, ConnectionContext};
pub use message::{Envelope, InboundMessage, OutMessage};
pub use registry::Registry;
pub use router::Router;
pub use server::SocketServer;
pub use types::{ConnectionId, FrameType};
