//! Top-level server instance
//!
//! `SocketServer` owns one registry, one handler table and one dispatch
//! queue. Nothing is global, so several servers can run in one process.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::dispatcher::{DispatchQueue, Dispatcher};
use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionContext};
use crate::registry::Registry;
use crate::router::Router;
use crate::types::FrameType;

pub struct SocketServer {
    config: ServerConfig,
    router: Router,
}

impl SocketServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            config,
            router: Router::new(registry),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Router handle for emitting outside of handlers
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(self.router.registry())
    }

    /// Register the handler for a channel (last registration wins)
    pub fn on<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(&Router, &Arc<Connection>, FrameType, String) + Send + Sync + 'static,
    {
        self.router.on(channel, handler);
    }

    /// Bind the configured address and serve forever
    ///
    /// Only a bind failure returns an error.
    pub async fn listen_and_serve(self) -> Result<(), AppError> {
        self.config.validate()?;
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Socket server listening on ws://{}{}", addr, self.config.path);
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), AppError> {
        let (queue, receiver) = DispatchQueue::channel(self.config.queue_capacity);
        tokio::spawn(Dispatcher::new(receiver, self.router.clone()).run());

        let ctx = ConnectionContext {
            registry: Arc::clone(self.router.registry()),
            queue,
            path: self.config.path.clone(),
            outbound_buffer: self.config.outbound_buffer,
        };

        // Connection accept loop
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let ctx = ctx.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servers_do_not_share_state() {
        let a = SocketServer::new(ServerConfig::default());
        let b = SocketServer::new(ServerConfig::default());

        a.on("chat", |_, _, _, _| {});

        assert!(a.router().handlers().contains("chat"));
        assert!(!b.router().handlers().contains("chat"));
        assert!(!Arc::ptr_eq(&a.registry(), &b.registry()));
    }

    #[tokio::test]
    async fn test_bind_failure_is_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let server = SocketServer::new(ServerConfig::default().with_addr(addr));
        let result = server.listen_and_serve().await;

        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_bind() {
        let config = ServerConfig {
            queue_capacity: 0,
            ..ServerConfig::default()
        };
        let result = SocketServer::new(config).listen_and_serve().await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
