//! Fan-out of framed messages onto connection outbound queues.
//!
//! Nothing here touches a socket: chunks are framed once, then appended to
//! each target's queue and the target's scheduler link is woken. Actual
//! transmission belongs to whichever multiplexer drives the registry.

use crate::chat::framer::frame_message;
use crate::chat::registry::{ConnectionRegistry, Link, PeerId};

/// Frame `message` and queue it for a single peer.
pub fn send_to<S: Link>(
    registry: &mut ConnectionRegistry<S>,
    message: &str,
    target: PeerId,
    sender: Option<&str>,
) {
    broadcast_to(registry, message, &[target], sender);
}

/// Frame `message` once and queue the chunks for every listed peer.
///
/// Ids that no longer resolve (peer removed earlier in the same dispatch
/// cycle) are skipped silently.
pub fn broadcast_to<S: Link>(
    registry: &mut ConnectionRegistry<S>,
    message: &str,
    targets: &[PeerId],
    sender: Option<&str>,
) {
    let chunks = frame_message(message, sender);
    for &target in targets {
        if let Some(conn) = registry.get_mut(target) {
            for chunk in &chunks {
                conn.enqueue(chunk.clone());
            }
        }
    }
}
