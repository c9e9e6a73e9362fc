//! Inbound dispatch
//!
//! Read loops submit decoded envelopes into a bounded mpsc queue; a single
//! `Dispatcher` task drains it and calls the handler registered for each
//! envelope's channel. Handlers therefore never run concurrently, and a
//! slow handler delays every channel behind it.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{Envelope, InboundMessage};
use crate::router::Router;
use crate::types::FrameType;

/// Channel handler: `(router, sender connection, frame type, message)`
pub type Handler = Arc<dyn Fn(&Router, &Arc<Connection>, FrameType, String) + Send + Sync>;

/// Channel name → handler, shared between registration and the dispatcher
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the channel
    ///
    /// Returns true if an existing handler was replaced.
    pub fn register(&self, channel: impl Into<String>, handler: Handler) -> bool {
        let channel = channel.into();
        let replaced = self.handlers.write().insert(channel.clone(), handler).is_some();
        if replaced {
            debug!("Handler for channel '{}' replaced", channel);
        }
        replaced
    }

    pub fn get(&self, channel: &str) -> Option<Handler> {
        self.handlers.read().get(channel).cloned()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.read().contains_key(channel)
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        let mut channels: Vec<&String> = handlers.keys().collect();
        channels.sort();
        f.debug_struct("HandlerTable")
            .field("channels", &channels)
            .finish()
    }
}

/// Producer side of the dispatch queue, cloned into every read loop
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::Sender<Envelope>,
}

impl DispatchQueue {
    /// Create a bounded queue and its receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Decode a raw frame and enqueue it
    ///
    /// Malformed payloads are logged and dropped (`Ok`). Waits for capacity
    /// when the queue is full. Fails only once the dispatcher has stopped.
    pub async fn submit(
        &self,
        connection: &Arc<Connection>,
        frame_type: FrameType,
        raw: &[u8],
    ) -> Result<(), AppError> {
        let inbound = match InboundMessage::parse(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Invalid JSON from {}: {}", connection.id, e);
                return Ok(());
            }
        };

        debug!(
            "Queued '{}' {} frame from {}",
            inbound.channel, frame_type, connection.id
        );

        self.sender
            .send(Envelope::new(inbound, frame_type, Arc::clone(connection)))
            .await
            .map_err(|_| AppError::DispatcherClosed)
    }
}

/// Single consumer of the dispatch queue
pub struct Dispatcher {
    receiver: mpsc::Receiver<Envelope>,
    router: Router,
}

impl Dispatcher {
    pub fn new(receiver: mpsc::Receiver<Envelope>, router: Router) -> Self {
        Self { receiver, router }
    }

    /// Run the dispatch loop
    ///
    /// Processes envelopes in arrival order until every `DispatchQueue` clone
    /// has been dropped.
    pub async fn run(mut self) {
        info!("Dispatcher started");

        while let Some(envelope) = self.receiver.recv().await {
            self.dispatch(envelope);
        }

        info!("Dispatcher shutting down");
    }

    /// Invoke the handler for one envelope, if any
    fn dispatch(&self, envelope: Envelope) {
        let Some(handler) = self.router.handlers().get(&envelope.channel) else {
            debug!(
                "No handler for channel '{}' from {}",
                envelope.channel, envelope.connection.id
            );
            return;
        };

        let Envelope {
            channel,
            message,
            frame_type,
            connection,
        } = envelope;

        // A panicking handler must not take the consumer loop down with it
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handler(&self.router, &connection, frame_type, message)
        }));

        if let Err(payload) = result {
            error!(
                "Handler for channel '{}' panicked on frame from {}: {}",
                channel,
                connection.id,
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
