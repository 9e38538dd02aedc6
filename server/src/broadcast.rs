//! Outbound notification fan-out.
//!
//! A notification is serialized to JSON exactly once and then pushed onto
//! each target session's bounded outbound queue. Queues are drained by the
//! connection tasks, so a slow or stalled client never blocks the lobby or a
//! game worker.

use crate::session::{OutboundSender, SessionId};
use log::debug;
use shared::Notification;

/// What to do when a target's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Intermediate update; dropping it loses nothing a later frame does not
    /// resend (per-claim `words-list` refreshes).
    Droppable,
    /// State-bearing frame the client cannot recover without. Overflow marks
    /// the session dead and the caller routes it through disconnect.
    Critical,
}

/// Sends one notification to many sessions. Returns the ids of sessions whose
/// queue overflowed on a critical frame (or whose connection is already gone);
/// the caller is responsible for disconnecting them.
pub fn send_to_many(
    targets: &[(SessionId, OutboundSender)],
    notification: &Notification,
    delivery: Delivery,
) -> Vec<SessionId> {
    let json = notification.to_json();
    let mut dead = Vec::new();

    for (session_id, outbound) in targets {
        if let Err(err) = outbound.try_send(json.clone()) {
            match delivery {
                Delivery::Droppable => {
                    debug!("Dropped frame for session {}: {}", session_id, err);
                }
                Delivery::Critical => {
                    debug!(
                        "Critical frame undeliverable for session {}: {}",
                        session_id, err
                    );
                    dead.push(*session_id);
                }
            }
        }
    }

    dead
}

/// Sends one notification to a single session. Returns false if it could not
/// be enqueued.
pub fn send_one(outbound: &OutboundSender, notification: &Notification) -> bool {
    outbound.try_send(notification.to_json()).is_ok()
}
