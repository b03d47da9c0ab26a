use rebal_domain::{PlacementMap, RebalanceContext, TerminalStatus};

/// §4.8 Observer Interface — the `onTrigger` kinds. Checkpoints at which
/// `isStopped()` is consulted are documented on [`RebalanceObserver::is_stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Start,
    EvToIsConvergence,
    IdealStateChange,
    NextAssignmentCalculation,
    ForceCommitStart,
    ForceCommitEnd,
}

/// Callbacks into the host process for progress, errors, and cooperative
/// stop. A no-op implementation ([`NoopObserver`]) is supplied as the
/// default so the driver stays total without a caller-supplied observer.
///
/// Checkpoints at which `is_stopped()` is consulted (§4.8): before each IS
/// write, immediately after EV convergence, and after each
/// `IdealStateChange`/`NextAssignmentCalculation` trigger. No partial
/// placement is ever written after a stop is observed.
pub trait RebalanceObserver: Send + Sync {
    fn on_trigger(
        &self,
        kind: TriggerKind,
        current: &PlacementMap,
        target: &PlacementMap,
        ctx: &RebalanceContext,
    ) {
        let _ = (kind, current, target, ctx);
    }

    fn on_noop(&self, message: &str) {
        let _ = message;
    }

    fn on_success(&self, message: &str) {
        let _ = message;
    }

    fn on_error(&self, message: &str) {
        let _ = message;
    }

    fn on_rollback(&self) {}

    fn is_stopped(&self) -> bool {
        false
    }

    /// The terminal status to report if `is_stopped()` is observed true at
    /// a checkpoint. Distinguishes a caller-requested `Aborted` from a
    /// cooperative `Cancelled` shutdown; the default favors `Cancelled`.
    fn stop_status(&self) -> TerminalStatus {
        TerminalStatus::Cancelled
    }
}

/// Default observer: never stops, never records anything. Keeps the driver
/// total when the caller has nothing to observe with.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RebalanceObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_never_stops() {
        let observer = NoopObserver;
        assert!(!observer.is_stopped());
        assert_eq!(observer.stop_status(), TerminalStatus::Cancelled);
    }
}
