//! Sync state machine.
//!
//! # Lifecycle
//!
//! ```text
//! Start → Fetched ─┬→ Diffed ─┬→ CleanMerge ─────────────────┬→ Committed ─┬→ Pushed → Done
//!                  │          └→ NeedsResolution → Resolved ─┘             └→ Done
//!                  └→ Pushed → Done                              (push only)
//! ```
//!
//! `CleanMerge` and `Resolved` may also go straight to `Done` when there is
//! nothing to commit. Any non-terminal phase can transition to `Failed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// The current phase of one sync attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Nothing has happened yet.
    Start,
    /// Remote refs fetched.
    Fetched,
    /// Base, local and remote decoded and diffed.
    Diffed,
    /// The diff had no conflicts.
    CleanMerge,
    /// The diff had conflicts; waiting on the resolver.
    NeedsResolution,
    /// The resolver returned a collection.
    Resolved,
    /// The local branch holds the merge result (point of no return).
    Committed,
    /// The local branch was pushed.
    Pushed,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl SyncPhase {
    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Phases from which cancellation still leaves no trace.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::Start
                | Self::Fetched
                | Self::Diffed
                | Self::CleanMerge
                | Self::NeedsResolution
                | Self::Resolved
        )
    }

    /// Returns the set of valid next phases from this phase.
    #[must_use]
    pub const fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Start => &[Self::Fetched, Self::Failed],
            Self::Fetched => &[Self::Diffed, Self::Pushed, Self::Failed],
            Self::Diffed => &[Self::CleanMerge, Self::NeedsResolution, Self::Failed],
            Self::CleanMerge | Self::Resolved => &[Self::Committed, Self::Done, Self::Failed],
            Self::NeedsResolution => &[Self::Resolved, Self::Failed],
            Self::Committed => &[Self::Pushed, Self::Done, Self::Failed],
            Self::Pushed => &[Self::Done, Self::Failed],
            Self::Done | Self::Failed => &[],
        }
    }

    /// Check whether transitioning to `next` is valid.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        self.valid_transitions().contains(next)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Fetched => "fetched",
            Self::Diffed => "diffed",
            Self::CleanMerge => "clean_merge",
            Self::NeedsResolution => "needs_resolution",
            Self::Resolved => "resolved",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks the phase of one attempt and logs every move.
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    phase: SyncPhase,
}

impl PhaseTracker {
    pub(crate) const fn new() -> Self {
        Self {
            phase: SyncPhase::Start,
        }
    }

    pub(crate) const fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: SyncPhase) -> Result<(), SyncError> {
        if !self.phase.can_transition_to(&next) {
            return Err(SyncError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(from = %self.phase, to = %next, "sync phase");
        self.phase = next;
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub(crate) fn fail(&mut self) {
        if !self.phase.is_terminal() {
            tracing::debug!(from = %self.phase, to = %SyncPhase::Failed, "sync phase");
            self.phase = SyncPhase::Failed;
        }
    }
}
