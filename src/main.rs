//! Socket router demo server - Entry Point
//!
//! Registers a handful of example channels and serves forever.

use std::env;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use socket_router::{ConnectionId, ServerConfig, SocketServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=socket_router=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("socket_router=info")),
        )
        .init();

    // SOCKET_* env vars, then an optional listen address argument
    let mut config = ServerConfig::from_env()?;
    if let Some(addr) = env::args().nth(1) {
        config = config.with_addr(addr);
    }

    let server = SocketServer::new(config);

    server.on("echo", |router, conn, frame_type, message| {
        router.emit(conn, frame_type, "echo", &message);
    });

    server.on("whoami", |router, conn, frame_type, _| {
        router.emit(conn, frame_type, "whoami", &conn.id.to_string());
    });

    server.on("join", |router, conn, frame_type, group| {
        router.join_group(conn, &group);
        router.emit(conn, frame_type, "join", &group);
    });

    server.on("leave", |router, conn, frame_type, group| {
        router.leave_group(conn, &group);
        router.emit(conn, frame_type, "leave", &group);
    });

    server.on("broadcast", |router, conn, frame_type, message| {
        router.broadcast(conn, frame_type, "broadcast", &message);
    });

    // "group:text"
    server.on("group", |router, conn, frame_type, message| {
        if let Some((group, text)) = message.split_once(':') {
            router.emit_to_group(conn, frame_type, group, "group", text);
        }
    });

    // "target_id:text"
    server.on("whisper", |router, conn, frame_type, message| {
        let Some((target, text)) = message.split_once(':') else {
            return;
        };
        match target.parse::<ConnectionId>() {
            Ok(target) => {
                router.emit_to_target(conn, frame_type, &target, "whisper", text);
            }
            Err(e) => warn!("Bad whisper target from {}: {}", conn.id, e),
        }
    });

    server.listen_and_serve().await?;

    Ok(())
}
