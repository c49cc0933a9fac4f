//! Pipeline executor ("RunPipeline").
//!
//! Wires the five stages together with typed point-to-point channels,
//! starts each stage as an independent task, and drains the final stage
//! to completion. Each stage owns its outbound sender and closes it by
//! returning; the downstream stage observes end-of-stream through the
//! channel.

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{ConfigError, Error, Result};
use crate::pipeline::classify::classify_spam;
use crate::pipeline::combine::combine_results;
use crate::pipeline::list::list_messages;
use crate::pipeline::resolve::resolve_users;
use crate::pipeline::types::PipelineReport;
use crate::services::Services;

/// A configured spam-triage pipeline, ready to run.
///
/// Holds no per-run state; one `Pipeline` can drive any number of
/// independent runs.
pub struct Pipeline {
    config: PipelineConfig,
    services: Services,
}

impl Pipeline {
    /// Create a pipeline, validating the configuration up front.
    pub fn new(config: PipelineConfig, services: Services) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, services })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline over `emails` and return the merged report.
    ///
    /// Blocks until the last stage's outbound channel is fully drained and
    /// every stage task — including lookups and batch calls nested inside a
    /// stage — has finished. Triggering `shutdown` makes every stage stop
    /// launching new work, abandon in-flight service calls, and close its
    /// channels; the call still returns, with `cancelled` set on the report.
    pub async fn run(
        &self,
        emails: Vec<String>,
        shutdown: CancellationToken,
    ) -> Result<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            %run_id,
            inputs = emails.len(),
            batch_size = self.config.batch_size,
            spam_workers = self.config.spam_workers,
            "Pipeline starting"
        );

        // Capacity-1 channels are the closest tokio rendering of unbuffered
        // point-to-point links: a slow downstream stage blocks its upstream
        // writer, so backpressure propagates all the way to the seeder.
        let (email_tx, email_rx) = mpsc::channel::<String>(1);
        let (user_tx, user_rx) = mpsc::channel(1);
        let (msg_tx, msg_rx) = mpsc::channel(1);
        let (record_tx, record_rx) = mpsc::channel(1);
        let (line_tx, line_rx) = mpsc::channel(1);
        // Failures must never exert backpressure on the stages reporting
        // them, so their channel is unbounded.
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();

        // Seed the first inbound channel with the work items, then close it.
        let seed_shutdown = shutdown.clone();
        let seeder = tokio::spawn(async move {
            for email in emails {
                tokio::select! {
                    _ = seed_shutdown.cancelled() => break,
                    sent = email_tx.send(email) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let resolve = tokio::spawn(resolve_users(
            self.services.resolver.clone(),
            email_rx,
            user_tx,
            failure_tx.clone(),
            self.config.max_concurrent_lookups,
            shutdown.clone(),
        ));
        let list = tokio::spawn(list_messages(
            self.services.lister.clone(),
            user_rx,
            msg_tx,
            failure_tx.clone(),
            self.config.batch_size,
            shutdown.clone(),
        ));
        let classify = tokio::spawn(classify_spam(
            self.services.classifier.clone(),
            msg_rx,
            record_tx,
            failure_tx.clone(),
            self.config.spam_workers,
            shutdown.clone(),
        ));
        let combine = tokio::spawn(combine_results(record_rx, line_tx, shutdown.clone()));
        drop(failure_tx);

        // Drain the final stage to completion. This is the synchronization
        // point: the line channel only closes once the combiner returns,
        // which in turn requires every upstream stage to have closed.
        let lines: Vec<String> = ReceiverStream::new(line_rx).collect().await;

        for (stage, handle) in [
            ("seed", seeder),
            ("resolve", resolve),
            ("list", list),
            ("classify", classify),
            ("combine", combine),
        ] {
            if let Err(e) = handle.await {
                tracing::error!(stage, error = %e, "Stage task panicked");
                return Err(Error::StagePanicked {
                    stage,
                    reason: e.to_string(),
                });
            }
        }

        // All failure senders are gone once the stages have joined, so this
        // drains without blocking.
        let mut failures = Vec::new();
        while let Some(failure) = failure_rx.recv().await {
            failures.push(failure);
        }

        let cancelled = shutdown.is_cancelled();
        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            lines,
            failures,
            cancelled,
        };
        tracing::info!(
            %run_id,
            lines = report.lines.len(),
            failures = report.failures.len(),
            cancelled,
            "Pipeline finished"
        );
        Ok(report)
    }
}
