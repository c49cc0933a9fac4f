//! Deterministic combiner stage ("CombineResults").
//!
//! The only stage that must see the whole stream before emitting: the
//! total order (spam first, then message id ascending) needs global
//! knowledge, so the stage is a full barrier with O(n) buffering and no
//! internal parallelism.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::state::{StageState, StageTracker};
use crate::pipeline::types::ClassificationRecord;

/// Buffer the inbound stream to exhaustion, sort, and emit report lines.
///
/// The sort is recomputed over the complete buffered set, never maintained
/// incrementally, so the output is independent of arrival timing. The sort
/// is stable, which makes re-runs deterministic even for equal keys.
pub(crate) async fn combine_results(
    mut rx: mpsc::Receiver<ClassificationRecord>,
    tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut tracker = StageTracker::new("combine");
    tracker.advance(StageState::Running);

    let mut records: Vec<ClassificationRecord> = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(record) => records.push(record),
                None => break,
            },
        }
    }

    tracker.advance(StageState::Draining);
    records.sort_by(|a, b| b.is_spam.cmp(&a.is_spam).then(a.id.cmp(&b.id)));

    // Even a cancelled run reports whatever it managed to combine. The
    // executor drains this channel unconditionally, so these sends cannot
    // block forever.
    for record in &records {
        if tx.send(record.format_line()).await.is_err() {
            break;
        }
    }
    tracker.advance(StageState::Closed);
}
