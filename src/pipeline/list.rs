//! Batching message lister stage ("SelectMessages").
//!
//! Accumulates users into fixed-size batches, issues one listing call per
//! batch from a spawned task, and streams every resulting message id
//! downstream. A trailing partial batch is flushed on end-of-stream.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StageFailure;
use crate::pipeline::state::{StageState, StageTracker};
use crate::pipeline::types::{MessageId, User};
use crate::services::MessageLister;

/// Run the lister stage to completion.
///
/// Batch size trades round-trips against latency only; the eventual
/// message id set is identical for any `batch_size >= 1`.
pub(crate) async fn list_messages(
    lister: Arc<dyn MessageLister>,
    mut rx: mpsc::Receiver<User>,
    tx: mpsc::Sender<MessageId>,
    failures: mpsc::UnboundedSender<StageFailure>,
    batch_size: usize,
    shutdown: CancellationToken,
) {
    let mut tracker = StageTracker::new("list");
    tracker.advance(StageState::Running);

    let mut buffer: Vec<User> = Vec::with_capacity(batch_size);
    let mut batches: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let user = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(user) => user,
                None => break,
            },
        };

        buffer.push(user);
        if buffer.len() == batch_size {
            // Ownership of the full buffer moves into the batch task; the
            // stage continues accumulating into a fresh one.
            let batch = std::mem::replace(&mut buffer, Vec::with_capacity(batch_size));
            batches.push(spawn_batch(
                Arc::clone(&lister),
                batch,
                tx.clone(),
                failures.clone(),
                shutdown.clone(),
            ));
        }
    }

    tracker.advance(StageState::Draining);
    if !buffer.is_empty() {
        batches.push(spawn_batch(
            Arc::clone(&lister),
            buffer,
            tx.clone(),
            failures.clone(),
            shutdown.clone(),
        ));
    }
    join_all(batches).await;
    tracker.advance(StageState::Closed);
}

fn spawn_batch(
    lister: Arc<dyn MessageLister>,
    batch: Vec<User>,
    tx: mpsc::Sender<MessageId>,
    failures: mpsc::UnboundedSender<StageFailure>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listed = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = lister.list_messages(&batch) => res,
        };

        match listed {
            Ok(ids) => {
                for id in ids {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        sent = tx.send(id) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                let emails: Vec<String> = batch.into_iter().map(|u| u.email).collect();
                tracing::warn!(batch = ?emails, error = %e, "Message listing failed");
                let _ = failures.send(StageFailure::Listing {
                    emails,
                    reason: e.to_string(),
                });
            }
        }
    })
}
