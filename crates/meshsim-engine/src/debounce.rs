//! Rewire debounce state machine.
//!
//! ```text
//!            request (defer_count == 0)
//!   Idle ──────────────────────────────► Rewiring
//!    ▲                                    │   ▲
//!    │ complete (no pending)      request │   │ complete (pending):
//!    │                                    ▼   │ run again
//!    └──────────────────────────── RewiringWithPending
//! ```
//!
//! Any number of requests made while a run is in flight collapse into one
//! follow-up run. While `defer_count > 0` requests are dropped: whoever holds
//! the deferral requests a rewire after releasing it.

/// Observable state of the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewireState {
    Idle,
    Rewiring,
    RewiringWithPending,
}

impl std::fmt::Display for RewireState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Rewiring => write!(f, "Rewiring"),
            Self::RewiringWithPending => write!(f, "RewiringWithPending"),
        }
    }
}

/// Decision for one rewire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller owns the run and must call [`Debounce::complete`] after each pass.
    Run,
    /// A run is in flight; a follow-up pass is now scheduled.
    Queued,
    /// A deferral is held; the holder will request again.
    Deferred,
}

#[derive(Debug, Default)]
pub struct Debounce {
    rewiring: bool,
    pending: bool,
    defer_count: usize,
}

impl Debounce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) -> Admission {
        if self.defer_count > 0 {
            return Admission::Deferred;
        }
        if self.rewiring {
            self.pending = true;
            return Admission::Queued;
        }
        self.rewiring = true;
        Admission::Run
    }

    /// Finish one pass. Returns `true` when a queued pass must run next.
    pub fn complete(&mut self) -> bool {
        if self.pending {
            self.pending = false;
            true
        } else {
            self.rewiring = false;
            false
        }
    }

    /// Drop the current run without completing it.
    pub fn abandon(&mut self) {
        self.rewiring = false;
        self.pending = false;
    }

    pub fn begin_deferral(&mut self) {
        self.defer_count += 1;
    }

    /// Returns `true` when the last deferral was released.
    pub fn end_deferral(&mut self) -> bool {
        self.defer_count = self.defer_count.saturating_sub(1);
        self.defer_count == 0
    }

    pub fn defer_count(&self) -> usize {
        self.defer_count
    }

    pub fn state(&self) -> RewireState {
        match (self.rewiring, self.pending) {
            (false, _) => RewireState::Idle,
            (true, false) => RewireState::Rewiring,
            (true, true) => RewireState::RewiringWithPending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn idle_request_runs() {
        let mut debounce = Debounce::new();
        assert_eq!(debounce.state(), RewireState::Idle);
        assert_eq!(debounce.request(), Admission::Run);
        assert_eq!(debounce.state(), RewireState::Rewiring);
        assert!(!debounce.complete());
        assert_eq!(debounce.state(), RewireState::Idle);
    }

    #[test]
    fn requests_during_run_collapse_into_one() {
        let mut debounce = Debounce::new();
        assert_eq!(debounce.request(), Admission::Run);
        for _ in 0..5 {
            assert_eq!(debounce.request(), Admission::Queued);
        }
        assert_eq!(debounce.state(), RewireState::RewiringWithPending);

        assert!(debounce.complete(), "one follow-up pass");
        assert_eq!(debounce.state(), RewireState::Rewiring);
        assert!(!debounce.complete(), "and only one");
        assert_eq!(debounce.state(), RewireState::Idle);
    }

    #[test]
    fn deferral_suppresses_requests() {
        let mut debounce = Debounce::new();
        debounce.begin_deferral();
        debounce.begin_deferral();
        assert_eq!(debounce.request(), Admission::Deferred);

        assert!(!debounce.end_deferral());
        assert_eq!(debounce.request(), Admission::Deferred);
        assert!(debounce.end_deferral());
        assert_eq!(debounce.request(), Admission::Run);
    }

    #[test]
    fn end_deferral_never_underflows() {
        let mut debounce = Debounce::new();
        assert!(debounce.end_deferral());
        assert_eq!(debounce.defer_count(), 0);
    }

    #[test]
    fn abandon_resets_to_idle() {
        let mut debounce = Debounce::new();
        debounce.request();
        debounce.request();
        debounce.abandon();
        assert_eq!(debounce.state(), RewireState::Idle);
        assert_eq!(debounce.request(), Admission::Run);
    }

    proptest! {
        #[test]
        fn every_run_is_followed_by_at_most_one_extra(requests in 0usize..50) {
            let mut debounce = Debounce::new();
            prop_assert_eq!(debounce.request(), Admission::Run);
            for _ in 0..requests {
                prop_assert_eq!(debounce.request(), Admission::Queued);
            }
            let mut passes = 1;
            while debounce.complete() {
                passes += 1;
            }
            prop_assert_eq!(passes, if requests == 0 { 1 } else { 2 });
        }
    }
}
