//! Socket registry: native socket id → active reactor watch.

use std::collections::HashMap;

use crate::engine::SocketId;
use crate::event_loop::SocketWatch;

/// Tracks which native sockets currently have a readiness watch.
///
/// An id present in the map has a live watch registered with the reactor;
/// removing an entry drops the watch, which deregisters the socket. The
/// registry has no locking of its own — callers hold the context's
/// serialization lock.
#[derive(Default)]
pub(crate) struct SocketRegistry {
    map: HashMap<SocketId, Box<dyn SocketWatch>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        SocketRegistry {
            map: HashMap::new(),
        }
    }

    /// Record a new watch. Inserting over a live entry replaces (and drops)
    /// the previous watch; avoiding that is the caller's job.
    pub fn insert(&mut self, socket: SocketId, watch: Box<dyn SocketWatch>) {
        self.map.insert(socket, watch);
    }

    /// Look up the watch for a socket.
    pub fn find(&mut self, socket: SocketId) -> Option<&mut (dyn SocketWatch + 'static)> {
        self.map.get_mut(&socket).map(|w| w.as_mut())
    }

    pub fn contains(&self, socket: SocketId) -> bool {
        self.map.contains_key(&socket)
    }

    /// Remove and drop the watch for a socket. Returns whether an entry
    /// was removed.
    pub fn remove(&mut self, socket: SocketId) -> bool {
        self.map.remove(&socket).is_some()
    }

    /// Drop every watch.
    pub fn drain(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
