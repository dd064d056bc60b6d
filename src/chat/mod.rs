//! Chat engine shared by both multiplexer variants.
//!
//! Connection lifecycle, message routing, command dispatch, and broadcast
//! fan-out all live here and operate purely on the [`ConnectionRegistry`];
//! the runtime modules own the sockets and call in on readiness events.

pub mod broadcast;
pub mod command;
pub mod framer;
pub mod registry;

use broadcast::{broadcast_to, send_to};
use command::{dispatch, CommandTable};
use registry::{Connection, ConnectionRegistry, Link, PeerId};
use tracing::{debug, info};

/// A peer just completed its registry insertion: greet it.
pub fn connection_made<S: Link>(registry: &mut ConnectionRegistry<S>, id: PeerId) {
    if let Some(conn) = registry.get(id) {
        info!(peer = %conn.addr, "Connection established");
    }
    send_to(registry, "Bienvenue sur le tchat !", id, None);
}

/// A peer disconnected or failed: remove it first, then tell the others.
///
/// Removal happens before the departure broadcast so the notice can never be
/// queued onto the closed connection. Returns the removed connection so the
/// scheduler can release its socket.
pub fn connection_lost<S: Link>(
    registry: &mut ConnectionRegistry<S>,
    id: PeerId,
) -> Option<Connection<S>> {
    let conn = registry.remove(id)?;
    info!(peer = %conn.addr, "Disconnected");

    let notice = format!("{} est parti.", conn.label());
    let remaining = registry.peer_ids();
    broadcast_to(registry, &notice, &remaining, None);
    Some(conn)
}

/// Route one decoded inbound message: slash-commands go to the dispatcher,
/// everything else fans out to all other peers under the sender's label.
pub fn message_received<S: Link>(
    registry: &mut ConnectionRegistry<S>,
    table: &CommandTable,
    id: PeerId,
    raw: &str,
) {
    let sender = match registry.get(id) {
        Some(conn) => {
            debug!(peer = %conn.addr, message = raw.trim_end(), "Received");
            conn.label().to_string()
        }
        None => return,
    };

    // Only lines that start with the slash are commands; an indented slash
    // is ordinary chat text.
    if raw.starts_with('/') {
        dispatch(table, raw.trim_end(), id, registry);
        return;
    }

    let others: Vec<PeerId> = registry
        .peer_ids()
        .into_iter()
        .filter(|&peer| peer != id)
        .collect();
    broadcast_to(registry, raw, &others, Some(&sender));
}
