//! Stage lifecycle state machine.

/// State of one pipeline stage.
///
/// Every stage moves strictly forward: it starts consuming
/// (`Running`), sees upstream end-of-stream and finishes in-flight work
/// (`Draining`), then closes its outbound channel (`Closed`). The
/// pipeline as a whole is running until the last stage reaches `Closed`;
/// there is no pause or partial-restart state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Stage task not yet spawned.
    NotStarted,
    /// Consuming the inbound channel.
    Running,
    /// No more input; finishing in-flight work.
    Draining,
    /// Outbound channel closed.
    Closed,
}

impl StageState {
    /// Check whether this state may move to `target`.
    pub fn can_transition_to(&self, target: StageState) -> bool {
        use StageState::*;

        matches!(
            (self, target),
            (NotStarted, Running) | (Running, Draining) | (Draining, Closed) |
            // A cancelled stage may close without ever draining.
            (Running, Closed)
        )
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Per-stage lifecycle tracker.
///
/// Stages advance it as they move through their loop; transitions are
/// logged and out-of-order transitions are ignored with a warning rather
/// than tearing the stage down.
#[derive(Debug)]
pub struct StageTracker {
    stage: &'static str,
    state: StageState,
}

impl StageTracker {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            state: StageState::NotStarted,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Move to `target`, logging the transition.
    pub fn advance(&mut self, target: StageState) {
        if !self.state.can_transition_to(target) {
            tracing::warn!(
                stage = self.stage,
                from = %self.state,
                to = %target,
                "Ignoring out-of-order stage transition"
            );
            return;
        }
        tracing::debug!(stage = self.stage, from = %self.state, to = %target, "Stage transition");
        self.state = target;
    }
}
