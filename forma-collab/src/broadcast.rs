//! Fan-out of pre-encoded frames to connected sessions.
//!
//! Each connection owns an unbounded channel drained by its writer task,
//! so a slow or dead recipient never blocks the authority: a failed send
//! (receiver dropped mid-disconnect) is logged and counted, nothing more.

use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Counters for monitoring dispatch health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Routes encoded server messages to session writer tasks.
#[derive(Debug, Default)]
pub struct Broadcaster {
    senders: HashMap<Uuid, mpsc::UnboundedSender<String>>,
    stats: BroadcastStats,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.senders.insert(client_id, sender);
    }

    pub fn unregister(&mut self, client_id: Uuid) {
        self.senders.remove(&client_id);
    }

    /// Send to a single session.
    pub fn send_to(&mut self, client_id: Uuid, message: &ServerMessage) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("failed to encode {message:?}: {e}");
                return;
            }
        };
        self.push(client_id, frame);
    }

    /// Send to every session.
    pub fn broadcast_all(&mut self, message: &ServerMessage) {
        self.fan_out(message, None);
    }

    /// Send to every session except `exclude` (typically the originator).
    pub fn broadcast_except(&mut self, exclude: Uuid, message: &ServerMessage) {
        self.fan_out(message, Some(exclude));
    }

    fn fan_out(&mut self, message: &ServerMessage, exclude: Option<Uuid>) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("failed to encode {message:?}: {e}");
                return;
            }
        };
        let recipients: Vec<Uuid> = self
            .senders
            .keys()
            .copied()
            .filter(|id| Some(*id) != exclude)
            .collect();
        for client_id in recipients {
            self.push(client_id, frame.clone());
        }
    }

    fn push(&mut self, client_id: Uuid, frame: String) {
        match self.senders.get(&client_id) {
            Some(sender) => {
                if sender.send(frame).is_err() {
                    // Writer task gone; disconnect cleanup will unregister.
                    log::warn!("dropping frame for dead connection {client_id}");
                    self.stats.frames_dropped += 1;
                } else {
                    self.stats.frames_sent += 1;
                }
            }
            None => {
                log::warn!("no connection registered for {client_id}");
                self.stats.frames_dropped += 1;
            }
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }

    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }
}
