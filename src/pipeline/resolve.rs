//! Deduplicating user resolver stage ("SelectUsers").
//!
//! Fans out one lookup task per inbound email, deduplicates by resolved
//! identity, and forwards only the first-seen user downstream. The
//! outbound channel closes only after every launched lookup has finished.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::StageFailure;
use crate::pipeline::state::{StageState, StageTracker};
use crate::pipeline::types::User;
use crate::services::UserResolver;

/// Run the resolver stage to completion.
///
/// `lookup_cap` bounds concurrent lookups when set; the default is
/// fire-and-forget fan-out, acceptable while input volume is bounded.
pub(crate) async fn resolve_users(
    resolver: Arc<dyn UserResolver>,
    mut rx: mpsc::Receiver<String>,
    tx: mpsc::Sender<User>,
    failures: mpsc::UnboundedSender<StageFailure>,
    lookup_cap: Option<usize>,
    shutdown: CancellationToken,
) {
    let mut tracker = StageTracker::new("resolve");
    tracker.advance(StageState::Running);

    let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let permits = lookup_cap.map(|n| Arc::new(Semaphore::new(n)));
    let mut lookups = Vec::new();

    loop {
        let email = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(email) => email,
                None => break,
            },
        };

        let resolver = Arc::clone(&resolver);
        let seen = Arc::clone(&seen);
        let tx = tx.clone();
        let failures = failures.clone();
        let permits = permits.clone();
        let shutdown = shutdown.clone();

        lookups.push(tokio::spawn(async move {
            let _permit = match permits {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            let resolved = tokio::select! {
                _ = shutdown.cancelled() => return,
                res = resolver.resolve_user(&email) => res,
            };

            let user = match resolved {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(email = %email, error = %e, "User lookup failed");
                    let _ = failures.send(StageFailure::Resolution {
                        email,
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            // Atomic check-and-insert: exactly one concurrent lookup of the
            // same identity wins. The lock is never held across the service
            // call above.
            let first_seen = seen.lock().await.insert(user.email.clone());
            if first_seen {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tx.send(user) => {}
                }
            }
        }));
    }

    tracker.advance(StageState::Draining);
    join_all(lookups).await;
    tracker.advance(StageState::Closed);
}
