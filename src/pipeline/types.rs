//! Stage value carriers.
//!
//! Each adjacent pair of stages shares one strongly-typed channel:
//! emails (`String`) → [`User`] → [`MessageId`] → [`ClassificationRecord`]
//! → formatted report lines (`String`). Nothing here is mutated after
//! creation; ownership moves stage to stage with the channel send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StageFailure;

// ── Resolved user ───────────────────────────────────────────────────

/// A resolved identity, produced by the external resolver.
///
/// The email is the identity key: the resolver stage guarantees each
/// distinct email appears at most once downstream, however many times it
/// occurred in the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Numeric account id.
    pub id: u64,
    /// Display name.
    pub username: String,
    /// Identity key for deduplication.
    pub email: String,
}

// ── Message identifier ──────────────────────────────────────────────

/// Opaque, orderable handle to one message belonging to a user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Classification record ───────────────────────────────────────────

/// Immutable spam verdict for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub id: MessageId,
    pub is_spam: bool,
}

impl ClassificationRecord {
    /// Render the final report row: `"<is_spam> <id>"`.
    pub fn format_line(&self) -> String {
        format!("{} {}", self.is_spam, self.id)
    }
}

// ── Pipeline report ─────────────────────────────────────────────────

/// The merged result of one pipeline run.
///
/// `lines` holds the deterministically ordered report rows; `failures`
/// holds every surfaced stage failure alongside them. A run interrupted
/// by the shutdown signal still returns whatever had been combined, with
/// `cancelled` set.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Unique id of this run (appears in log fields).
    pub run_id: Uuid,
    /// When the executor started the stages.
    pub started_at: DateTime<Utc>,
    /// When the last stage closed.
    pub finished_at: DateTime<Utc>,
    /// Ordered report rows, spam-first then message id ascending.
    pub lines: Vec<String>,
    /// Every failure surfaced during the run, tagged with the failing item.
    pub failures: Vec<StageFailure>,
    /// Whether the run was cut short by the shutdown signal.
    pub cancelled: bool,
}
