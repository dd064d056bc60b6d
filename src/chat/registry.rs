//! Registry of active chat connections using slab allocation.
//!
//! The registry is the single owner of per-connection chat state: the peer
//! address, the mutable display name, and the FIFO queue of outbound wire
//! chunks. It is generic over a scheduler link so the readiness-polling and
//! cooperative-task multiplexers can share it.

use bytes::Bytes;
use std::collections::VecDeque;

/// Identity of a connection inside the registry.
pub type PeerId = usize;

/// Hook the scheduler attaches to each connection so the broadcast path can
/// signal "this peer has pending output".
///
/// The polling event loop recomputes write interest every tick and needs no
/// wakeup; the task variant parks each connection on a `Notify`.
pub trait Link {
    fn wake(&self) {}
}

/// Wakeups are meaningless without a scheduler; used by unit tests.
impl Link for () {}

/// A single connected peer.
pub struct Connection<S> {
    /// Peer address in `"host:port"` form.
    pub addr: String,
    /// Display name; empty until the peer picks one with `/pseudo`.
    name: String,
    /// Pending outbound wire chunks, oldest first.
    outbox: VecDeque<Bytes>,
    /// Scheduler attachment (stream state or wakeup handle).
    pub link: S,
}

impl<S: Link> Connection<S> {
    pub fn new(addr: String, link: S) -> Self {
        Self {
            addr,
            name: String::new(),
            outbox: VecDeque::new(),
            link,
        }
    }

    /// Display name, or the peer address while no name is set.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.addr
        } else {
            &self.name
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Append a wire chunk to the outbound queue and wake the scheduler.
    pub fn enqueue(&mut self, chunk: Bytes) {
        self.outbox.push_back(chunk);
        self.link.wake();
    }

    /// Take the oldest pending chunk, if any.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        self.outbox.pop_front()
    }

    /// Put back the unsent remainder of a partially written chunk.
    pub fn requeue_front(&mut self, chunk: Bytes) {
        self.outbox.push_front(chunk);
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }
}

/// Registry of active connections.
///
/// Provides O(1) insert, lookup, and remove. Every entry corresponds to a
/// currently open socket; callers remove an entry before broadcasting its
/// departure so no broadcast ever references a closed peer.
pub struct ConnectionRegistry<S> {
    connections: slab::Slab<Connection<S>>,
    max_connections: usize,
}

impl<S: Link> ConnectionRegistry<S> {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: slab::Slab::with_capacity(max_connections.min(1024)),
            max_connections,
        }
    }

    /// Insert a new connection.
    ///
    /// Returns `None` when the registry is at capacity.
    pub fn insert(&mut self, conn: Connection<S>) -> Option<PeerId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get(&self, id: PeerId) -> Option<&Connection<S>> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Connection<S>> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Connection<S>> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.connections.contains(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of all current peer ids.
    ///
    /// Broadcast iterates this snapshot and skips any id removed by an
    /// earlier event in the same dispatch cycle.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.connections.iter().map(|(id, _)| id).collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PeerId, &mut Connection<S>)> {
        self.connections.iter_mut()
    }

    /// True when some other connection already holds `name` as display name.
    pub fn name_in_use(&self, name: &str, excluding: PeerId) -> bool {
        self.connections
            .iter()
            .any(|(id, conn)| id != excluding && conn.name() == name)
    }
}
