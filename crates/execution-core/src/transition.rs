//! What one submitted update did.

use crate::dispatcher::DispatchOutcome;
use model::OrderStatus;
use order_store::ApplyOutcome;

/// What [`LifecycleEngine::submit`](crate::LifecycleEngine::submit) did with
/// an update.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The exchange status carries no transition.
    Ignored,
    /// An event at least as new was already applied.
    Stale,
    /// Already in that status.
    Unchanged,
    /// Backward move or move out of a terminal status.
    Rejected { from: OrderStatus, to: OrderStatus },
    /// Applied, but an OCO leg expiring never runs a callback.
    Suppressed,
    /// ACTIVE applied for bookkeeping.
    Recorded,
    /// Applied; the owning bot is not ON so nothing was dispatched.
    Applied,
    Dispatched(DispatchOutcome),
}

impl TransitionOutcome {
    /// True when the store row changed.
    pub fn was_applied(&self) -> bool {
        matches!(
            self,
            Self::Suppressed | Self::Recorded | Self::Applied | Self::Dispatched(_)
        )
    }

    pub(crate) fn from_unapplied(outcome: ApplyOutcome) -> Option<Self> {
        match outcome {
            ApplyOutcome::Applied(_) => None,
            ApplyOutcome::Stale => Some(Self::Stale),
            ApplyOutcome::Unchanged => Some(Self::Unchanged),
            ApplyOutcome::Rejected { from, to } => Some(Self::Rejected { from, to }),
        }
    }
}
