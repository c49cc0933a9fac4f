//! Bounded spam classifier stage ("CheckSpam").
//!
//! A fixed pool of persistent workers all pull from the same inbound
//! channel, so at most `workers` classification calls are ever in flight
//! regardless of upstream burstiness. This is the pipeline's
//! admission-control point.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::StageFailure;
use crate::pipeline::state::{StageState, StageTracker};
use crate::pipeline::types::{ClassificationRecord, MessageId};
use crate::services::SpamClassifier;

/// Run the classifier stage to completion.
///
/// The outbound channel closes only after all workers have terminated, so
/// every message id that entered produces exactly one record (or one
/// surfaced failure).
pub(crate) async fn classify_spam(
    classifier: Arc<dyn SpamClassifier>,
    rx: mpsc::Receiver<MessageId>,
    tx: mpsc::Sender<ClassificationRecord>,
    failures: mpsc::UnboundedSender<StageFailure>,
    workers: usize,
    shutdown: CancellationToken,
) {
    let mut tracker = StageTracker::new("classify");
    tracker.advance(StageState::Running);

    // tokio mpsc receivers are single-consumer; the pool shares one behind
    // an async mutex so idle workers queue on the lock instead of the
    // channel itself.
    let rx = Arc::new(Mutex::new(rx));

    // Only the workers read the inbound channel, so the first one to see
    // it close pings this to flip the stage into draining.
    let (drained_tx, mut drained_rx) = mpsc::channel::<()>(1);

    let pool: Vec<_> = (0..workers)
        .map(|worker| {
            let classifier = Arc::clone(&classifier);
            let rx = Arc::clone(&rx);
            let tx = tx.clone();
            let failures = failures.clone();
            let drained = drained_tx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                worker_loop(worker, classifier, rx, tx, failures, drained, shutdown).await;
            })
        })
        .collect();
    drop(drained_tx);

    // Resolves on the first end-of-stream ping, or on the channel closing
    // if the pool unwinds without ever observing it (cancellation mid-call).
    let _ = drained_rx.recv().await;
    tracker.advance(StageState::Draining);
    join_all(pool).await;
    tracker.advance(StageState::Closed);
}

async fn worker_loop(
    worker: usize,
    classifier: Arc<dyn SpamClassifier>,
    rx: Arc<Mutex<mpsc::Receiver<MessageId>>>,
    tx: mpsc::Sender<ClassificationRecord>,
    failures: mpsc::UnboundedSender<StageFailure>,
    drained: mpsc::Sender<()>,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                next = rx.recv() => next,
            }
        };
        let Some(id) = next else {
            let _ = drained.try_send(());
            tracing::debug!(worker, "Classifier worker finished");
            break;
        };

        let verdict = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = classifier.classify(id) => res,
        };

        match verdict {
            Ok(is_spam) => {
                let record = ClassificationRecord { id, is_spam };
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tx.send(record) => {}
                }
            }
            Err(e) => {
                tracing::warn!(worker, id = %id, error = %e, "Classification failed");
                let _ = failures.send(StageFailure::Classification {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::ServiceError;

    /// Classifier marking odd ids as spam, tracking peak concurrency.
    struct FakeClassifier {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeClassifier {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpamClassifier for FakeClassifier {
        async fn classify(&self, id: MessageId) -> Result<bool, ServiceError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if id.0 == 666 {
                return Err(ServiceError::Unavailable("filter crashed".into()));
            }
            Ok(id.0 % 2 == 1)
        }
    }

    async fn run_stage(
        ids: Vec<u64>,
        workers: usize,
    ) -> (Vec<ClassificationRecord>, Vec<StageFailure>, usize) {
        let (in_tx, in_rx) = mpsc::channel(256);
        let (out_tx, mut out_rx) = mpsc::channel(256);
        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel();

        for id in ids {
            in_tx.send(MessageId(id)).await.unwrap();
        }
        drop(in_tx);

        let classifier = Arc::new(FakeClassifier::new());
        classify_spam(
            Arc::clone(&classifier) as Arc<dyn SpamClassifier>,
            in_rx,
            out_tx,
            fail_tx,
            workers,
            CancellationToken::new(),
        )
        .await;

        let mut records = Vec::new();
        while let Some(record) = out_rx.recv().await {
            records.push(record);
        }
        let mut failures = Vec::new();
        while let Some(failure) = fail_rx.recv().await {
            failures.push(failure);
        }
        (records, failures, classifier.peak.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn every_id_yields_exactly_one_record() {
        let (records, failures, _) = run_stage((1..=20).collect(), 4).await;
        assert!(failures.is_empty());
        assert_eq!(records.len(), 20);

        let mut ids: Vec<_> = records.iter().map(|r| r.id.0).collect();
        ids.sort();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn verdicts_match_classifier() {
        let (records, _, _) = run_stage(vec![1, 2], 2).await;
        for record in records {
            assert_eq!(record.is_spam, record.id.0 % 2 == 1);
        }
    }

    #[tokio::test]
    async fn concurrency_bounded_by_worker_count() {
        let (records, _, peak) = run_stage((1..=30).collect(), 3).await;
        assert_eq!(records.len(), 30);
        assert!(peak <= 3, "peak in-flight {peak} exceeded worker count");
    }

    #[tokio::test]
    async fn single_worker_drains_everything() {
        let (records, failures, peak) = run_stage((1..=10).collect(), 1).await;
        assert!(failures.is_empty());
        assert_eq!(records.len(), 10);
        assert_eq!(peak, 1);
    }

    #[tokio::test]
    async fn idle_workers_do_not_hold_the_stage_open() {
        // More workers than messages: most observe end-of-stream while idle.
        let stage = tokio::time::timeout(Duration::from_secs(5), run_stage(vec![1, 2], 8));
        let (records, failures, _) = stage.await.expect("stage hung after inbound close");
        assert!(failures.is_empty());
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_stage_terminates() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (fail_tx, _fail_rx) = mpsc::unbounded_channel();

        for id in 1..=4 {
            in_tx.send(MessageId(id)).await.unwrap();
        }
        // Inbound stays open; only the cancelled token lets workers out.
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let stage = classify_spam(
            Arc::new(FakeClassifier::new()) as Arc<dyn SpamClassifier>,
            in_rx,
            out_tx,
            fail_tx,
            3,
            shutdown,
        );
        tokio::time::timeout(Duration::from_secs(5), stage)
            .await
            .expect("cancelled stage hung");
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn classification_failure_surfaced_others_complete() {
        let (records, failures, _) = run_stage(vec![1, 666, 3], 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            StageFailure::Classification { id, .. } if *id == MessageId(666)
        ));
    }
}
