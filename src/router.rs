//! Router and fan-out API
//!
//! The surface handler code works against: register channel handlers,
//! change group membership and emit `{channel, message}` frames to one
//! connection, everyone but the sender, a group, or a specific id.
//!
//! Every emit is best-effort. Failures are logged per recipient and never
//! returned to the caller; the return values only report how many frames
//! were queued.

use std::sync::Arc;

use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::dispatcher::HandlerTable;
use crate::message::OutMessage;
use crate::registry::Registry;
use crate::types::{ConnectionId, FrameType};

#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    handlers: HandlerTable,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            handlers: HandlerTable::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Register the handler for a channel (last registration wins)
    pub fn on<F>(&self, channel: impl Into<String>, handler: F)
    where
        F: Fn(&Router, &Arc<Connection>, FrameType, String) + Send + Sync + 'static,
    {
        self.handlers.register(channel, Arc::new(handler));
    }

    pub fn join_group(&self, connection: &Connection, name: &str) {
        if connection.join_group(name) {
            debug!("{} joined group '{}'", connection.id, name);
        }
    }

    pub fn leave_group(&self, connection: &Connection, name: &str) {
        if connection.leave_group(name) {
            debug!("{} left group '{}'", connection.id, name);
        }
    }

    /// Send to exactly this connection
    pub fn emit(
        &self,
        connection: &Connection,
        frame_type: FrameType,
        channel: &str,
        message: &str,
    ) -> bool {
        match encode(frame_type, channel, message) {
            Some(frame) => deliver(connection, frame),
            None => false,
        }
    }

    /// Send to every registered connection except `origin`
    pub fn broadcast(
        &self,
        origin: &Connection,
        frame_type: FrameType,
        channel: &str,
        message: &str,
    ) -> usize {
        let Some(frame) = encode(frame_type, channel, message) else {
            return 0;
        };

        let mut delivered = 0;
        self.registry.for_each(|conn| {
            if conn.id != origin.id && deliver(conn, frame.clone()) {
                delivered += 1;
            }
        });
        debug!(
            "Broadcast '{}' from {} reached {} connections",
            channel, origin.id, delivered
        );
        delivered
    }

    /// Send to every member of `group`, including `origin` if it is one
    pub fn emit_to_group(
        &self,
        origin: &Connection,
        frame_type: FrameType,
        group: &str,
        channel: &str,
        message: &str,
    ) -> usize {
        let Some(frame) = encode(frame_type, channel, message) else {
            return 0;
        };

        let mut delivered = 0;
        self.registry.for_each(|conn| {
            if conn.in_group(group) && deliver(conn, frame.clone()) {
                delivered += 1;
            }
        });
        debug!(
            "Group '{}' emit '{}' from {} reached {} connections",
            group, channel, origin.id, delivered
        );
        delivered
    }

    /// Send to the connection with `target`, if it is still registered
    pub fn emit_to_target(
        &self,
        origin: &Connection,
        frame_type: FrameType,
        target: &ConnectionId,
        channel: &str,
        message: &str,
    ) -> bool {
        let Some(conn) = self.registry.get(target) else {
            return false;
        };

        if conn.id == origin.id {
            warn!("{} targeted itself; use emit to reply to the sender", origin.id);
        }

        self.emit(&conn, frame_type, channel, message)
    }
}

fn encode(frame_type: FrameType, channel: &str, message: &str) -> Option<Message> {
    match OutMessage::new(channel, message).to_frame(frame_type) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!("Failed to serialize message for channel '{}': {}", channel, e);
            None
        }
    }
}

fn deliver(connection: &Connection, frame: Message) -> bool {
    match connection.send(frame) {
        Ok(()) => true,
        Err(e) => {
            warn!("Emit to {} failed: {}", connection.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tokio::sync::mpsc;

    fn setup(n: usize) -> (Router, Vec<(Arc<Connection>, mpsc::Receiver<Message>)>) {
        let registry = Arc::new(Registry::new());
        let conns = (0..n)
            .map(|_| {
                let (tx, rx) = mpsc::channel(16);
                (registry.add(tx), rx)
            })
            .collect();
        (Router::new(registry), conns)
    }

    fn received(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame.into_text().unwrap().to_string());
        }
        out
    }

    const HI: &str = r#"{"channel":"chat","message":"hi"}"#;

    #[test]
    fn test_emit_reaches_only_target_connection() {
        let (router, mut conns) = setup(2);

        assert!(router.emit(&conns[0].0, FrameType::Text, "chat", "hi"));

        assert_eq!(received(&mut conns[0].1), vec![HI]);
        assert!(received(&mut conns[1].1).is_empty());
    }

    #[test]
    fn test_emit_binary_frame() {
        let (router, mut conns) = setup(1);

        router.emit(&conns[0].0, FrameType::Binary, "chat", "hi");

        let frame = conns[0].1.try_recv().unwrap();
        assert!(frame.is_binary());
        assert_eq!(&frame.into_data()[..], HI.as_bytes());
    }

    #[test]
    fn test_broadcast_excludes_origin() {
        let (router, mut conns) = setup(3);
        let origin = Arc::clone(&conns[0].0);

        assert_eq!(router.broadcast(&origin, FrameType::Text, "chat", "hi"), 2);

        assert!(received(&mut conns[0].1).is_empty());
        assert_eq!(received(&mut conns[1].1), vec![HI]);
        assert_eq!(received(&mut conns[2].1), vec![HI]);
    }

    #[test]
    fn test_group_emit_includes_origin_member() {
        let (router, mut conns) = setup(3);
        let origin = Arc::clone(&conns[0].0);
        router.join_group(&origin, "g");
        router.join_group(&conns[1].0, "g");

        assert_eq!(
            router.emit_to_group(&origin, FrameType::Text, "g", "chat", "hi"),
            2
        );

        assert_eq!(received(&mut conns[0].1), vec![HI]);
        assert_eq!(received(&mut conns[1].1), vec![HI]);
        assert!(received(&mut conns[2].1).is_empty());
    }

    #[test]
    fn test_group_emit_from_non_member() {
        let (router, mut conns) = setup(2);
        router.join_group(&conns[1].0, "g");
        let origin = Arc::clone(&conns[0].0);

        router.emit_to_group(&origin, FrameType::Text, "g", "chat", "hi");

        assert!(received(&mut conns[0].1).is_empty());
        assert_eq!(received(&mut conns[1].1), vec![HI]);
    }

    #[test]
    fn test_group_emit_after_leave() {
        let (router, mut conns) = setup(2);
        let origin = Arc::clone(&conns[0].0);
        router.join_group(&conns[1].0, "g");
        router.leave_group(&conns[1].0, "g");

        assert_eq!(
            router.emit_to_group(&origin, FrameType::Text, "g", "chat", "hi"),
            0
        );
        assert!(received(&mut conns[1].1).is_empty());
    }

    #[test]
    fn test_emit_to_target() {
        let (router, mut conns) = setup(3);
        let origin = Arc::clone(&conns[0].0);
        let target = conns[2].0.id;

        assert!(router.emit_to_target(&origin, FrameType::Text, &target, "chat", "hi"));

        assert!(received(&mut conns[0].1).is_empty());
        assert!(received(&mut conns[1].1).is_empty());
        assert_eq!(received(&mut conns[2].1), vec![HI]);
    }

    #[test]
    fn test_emit_to_self_still_delivers() {
        let (router, mut conns) = setup(1);
        let origin = Arc::clone(&conns[0].0);

        assert!(router.emit_to_target(&origin, FrameType::Text, &origin.id, "chat", "hi"));
        assert_eq!(received(&mut conns[0].1), vec![HI]);
    }

    #[test]
    fn test_emit_to_unknown_target_is_noop() {
        let (router, mut conns) = setup(1);
        let origin = Arc::clone(&conns[0].0);

        assert!(!router.emit_to_target(
            &origin,
            FrameType::Text,
            &ConnectionId::new(),
            "chat",
            "hi"
        ));
        assert!(received(&mut conns[0].1).is_empty());
    }

    #[test]
    fn test_broadcast_skips_removed_connection() {
        let (router, mut conns) = setup(3);
        let origin = Arc::clone(&conns[0].0);
        let gone = Arc::clone(&conns[2].0);
        router.registry().remove(&gone.id);

        assert_eq!(router.broadcast(&origin, FrameType::Text, "chat", "hi"), 1);
        assert!(received(&mut conns[2].1).is_empty());
    }

    #[test]
    fn test_broadcast_isolates_failed_recipient() {
        let (router, mut conns) = setup(3);
        let origin = Arc::clone(&conns[0].0);
        let (_, rx) = conns.remove(1);
        drop(rx);
        assert!(router.registry().snapshot().iter().any(|c| c.is_closed()));

        assert_eq!(router.broadcast(&origin, FrameType::Text, "chat", "hi"), 1);
        assert_eq!(received(&mut conns[1].1), vec![HI]);
    }

    #[test]
    fn test_concurrent_add_remove_during_broadcast() {
        let (router, conns) = setup(4);
        let origin = Arc::clone(&conns[0].0);

        let churn: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(router.registry());
                thread::spawn(move || {
                    for _ in 0..200 {
                        let (tx, rx) = mpsc::channel(1);
                        let conn = registry.add(tx);
                        registry.remove(&conn.id);
                        drop(rx);
                        assert!(registry.get(&conn.id).is_none());
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            router.broadcast(&origin, FrameType::Text, "chat", "hi");
        }

        for handle in churn {
            handle.join().unwrap();
        }
        assert_eq!(router.registry().len(), 4);
    }
}
