//! WebSocket connection handler
//!
//! Performs the upgrade on the configured path, registers the connection,
//! runs the read loop feeding the dispatch queue, and owns the writer task
//! that drains the connection's outbound channel into the socket.

use std::sync::Arc;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::dispatcher::DispatchQueue;
use crate::error::AppError;
use crate::registry::Registry;
use crate::types::FrameType;

/// Shared state every connection task needs
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub registry: Arc<Registry>,
    pub queue: DispatchQueue,
    /// Upgrade path, e.g. `/echo`
    pub path: String,
    pub outbound_buffer: usize,
}

/// Handle a new TCP connection
///
/// Returns once the client is gone. Upgrade failures are returned as
/// errors; everything after the upgrade is cleaned up here and only logged.
pub async fn handle_connection(stream: TcpStream, ctx: ConnectionContext) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, any origin accepted
    let path = ctx.path.clone();
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == path {
            Ok(resp)
        } else {
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_path).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Register with a fresh outbound channel
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(ctx.outbound_buffer);
    let connection = ctx.registry.add(msg_tx);
    let conn_id = connection.id;
    info!("Connection {} established from {}", conn_id, peer_addr);

    // Spawn write task (outbound channel -> WebSocket)
    let (close_tx, mut close_rx) = oneshot::channel::<()>();
    let mut write_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = msg_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = ws_sender.send(frame).await {
                        debug!("WebSocket send failed for {}: {}", conn_id, e);
                        break;
                    }
                }
                _ = &mut close_rx => break,
            }
        }

        // Send close frame when done
        let _ = ws_sender.close().await;
        debug!("Write task ended for {}", conn_id);
    });

    // Wait for either side to finish
    tokio::select! {
        _ = read_loop(&mut ws_receiver, &connection, &ctx.queue) => {
            debug!("Read loop completed for {}", conn_id);
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", conn_id);
        }
    }

    ctx.registry.remove(&conn_id);
    let _ = close_tx.send(());

    info!("Connection {} closed", conn_id);

    Ok(())
}

/// Feed inbound data frames to the dispatch queue until the stream ends
///
/// Ends on a close frame, a read error, or a stopped dispatcher.
pub async fn read_loop<S>(receiver: &mut S, connection: &Arc<Connection>, queue: &DispatchQueue)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = receiver.next().await {
        let submitted = match msg_result {
            Ok(Message::Text(text)) => {
                queue
                    .submit(connection, FrameType::Text, text.as_bytes())
                    .await
            }
            Ok(Message::Binary(data)) => queue.submit(connection, FrameType::Binary, &data).await,
            Ok(Message::Close(_)) => {
                debug!("Connection {} sent close frame", connection.id);
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite
                debug!("Ping from {}", connection.id);
                continue;
            }
            Ok(Message::Pong(_)) => {
                debug!("Pong from {}", connection.id);
                continue;
            }
            Ok(Message::Frame(_)) => continue,
            Err(e) => {
                warn!("Read error for {}: {}", connection.id, e);
                break;
            }
        };

        if let Err(e) = submitted {
            error!("Ending read loop for {}: {}", connection.id, e);
            break;
        }
    }
}
