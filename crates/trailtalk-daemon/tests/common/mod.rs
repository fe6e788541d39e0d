//! Shared helpers for daemon integration tests.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use trailtalk_daemon::{DaemonStatus, LinkEvent};

/// Wait for a condition on a status receiver with timeout.
pub async fn wait_for_status(
    rx: &mut watch::Receiver<DaemonStatus>,
    timeout: Duration,
    pred: impl Fn(&DaemonStatus) -> bool,
) -> Result<DaemonStatus, &'static str> {
    tokio::time::timeout(timeout, async {
        loop {
            {
                let status = rx.borrow_and_update().clone();
                if pred(&status) {
                    return Ok(status);
                }
            }
            if rx.changed().await.is_err() {
                return Err("watch closed");
            }
        }
    })
    .await
    .map_err(|_| "timeout")?
}

/// Next consumer event within the timeout, if any.
pub async fn next_event(
    rx: &mut mpsc::Receiver<LinkEvent>,
    timeout: Duration,
) -> Option<LinkEvent> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// Wait for the first event matching the predicate, skipping others.
pub async fn wait_for_event(
    rx: &mut mpsc::Receiver<LinkEvent>,
    timeout: Duration,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event before timeout")
}
