// Cooperative cancellation.
//
// A `CancelToken` is a shared flag. The batch sets it when a job fails
// under the abort policy; the runner checks it between stages, and the
// blocking waits (synthesis process, prediction polling) check it on every
// poll so that a batch-level abort stops in-flight work promptly.
//
// `child()` derives a token that also observes its parent. Cancelling the
// child leaves the parent alone, so one aborted run does not poison the
// next run that shares the same parent.

use crate::error::PipelineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of `sleep`'s cancellation checks.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh token that is cancelled when either it or `self` is.
    pub fn child(&self) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.cancelled)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.load(Ordering::Relaxed))
    }

    /// `Err(Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled` if the token
    /// is cancelled meanwhile.
    pub fn sleep(&self, duration: Duration) -> Result<(), PipelineError> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_child_sees_parent_but_not_the_reverse() {
        let parent = CancelToken::new();
        let first = parent.child();
        first.cancel();
        assert!(first.is_cancelled());
        assert!(!parent.is_cancelled());

        let second = parent.child();
        assert!(second.check().is_ok());
        parent.cancel();
        assert!(second.is_cancelled());
        assert!(second.clone().is_cancelled());
    }

    #[test]
    fn test_sleep_stops_early_when_cancelled() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let start = Instant::now();
        let result = token.sleep(Duration::from_secs(10));
        handle.join().unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
