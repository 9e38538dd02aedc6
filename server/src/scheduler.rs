//! Delayed self-messages for the game workers.
//!
//! Timers never touch game state directly: a scheduled task sleeps and then
//! re-enters the owning worker by sending a command into its channel. Nothing
//! is ever cancelled here: every timed command carries the round epoch it
//! was scheduled under, and the worker discards it if the epoch has moved on.

use std::time::Duration;
use tokio::sync::mpsc;

/// Fires `msg` into `tx` after `delay`. The receiver may be gone by then
/// (game destroyed); that is fine and the send result is ignored.
pub fn schedule<T: Send + 'static>(delay: Duration, tx: mpsc::Sender<T>, msg: T) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(msg).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        schedule(Duration::from_secs(5), tx, 42u32);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        // Let the spawned task run after the clock moved.
        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_harmless() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        schedule(Duration::from_millis(1), tx, ());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
