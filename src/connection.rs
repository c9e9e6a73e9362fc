//! Connection struct definition
//!
//! Represents one connected client: its identity, group membership and the
//! channel feeding its writer task.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SendError;
use crate::types::ConnectionId;

/// Connected client information
///
/// Shared as `Arc<Connection>` between the registry, in-flight envelopes and
/// handler code. All writes go through `sender`, which is drained by a single
/// writer task owning the socket's write half.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Group names, each present at most once
    groups: Mutex<Vec<String>>,
    /// Server → Client frame channel
    sender: mpsc::Sender<Message>,
    /// Frames dropped because the outbound buffer was full
    dropped_frames: AtomicU64,
}

impl Connection {
    /// Create a new connection with a fresh ID
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self {
            id: ConnectionId::new(),
            groups: Mutex::new(Vec::new()),
            sender,
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue a frame for this connection's writer task
    ///
    /// Never waits: a full buffer drops the frame and returns `SendError::Full`.
    pub fn send(&self, frame: Message) -> Result<(), SendError> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Whether the writer task has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Total frames dropped for this connection
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Add a group if not already a member
    ///
    /// Returns true if membership changed.
    pub(crate) fn join_group(&self, name: &str) -> bool {
        let mut groups = self.groups.lock();
        if groups.iter().any(|g| g == name) {
            return false;
        }
        groups.push(name.to_string());
        true
    }

    /// Remove every occurrence of a group
    ///
    /// Returns true if membership changed.
    pub(crate) fn leave_group(&self, name: &str) -> bool {
        let mut groups = self.groups.lock();
        let before = groups.len();
        groups.retain(|g| g != name);
        groups.len() != before
    }

    /// Check group membership
    pub fn in_group(&self, name: &str) -> bool {
        self.groups.lock().iter().any(|g| g == name)
    }

    /// Snapshot of current group names
    pub fn groups(&self) -> Vec<String> {
        self.groups.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn set_groups(&self, groups: &[&str]) {
        *self.groups.lock() = groups.iter().map(|g| g.to_string()).collect();
    }
}
