use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::error::PipelineError;
use super::{AnalysisOutcome, AnalysisRequest, TablePipeline};
use crate::capture::TableSurface;

/// Granularity of `CancelToken::sleep`.
const SLEEP_STEP: Duration = Duration::from_millis(100);

/// Shared stop flag checked at stage and pause boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused for a new run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleeps for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_STEP.min(deadline - now));
        }
    }
}

/// Handle to a pipeline run on its own thread.
pub struct AnalysisTask {
    surface: TableSurface,
    cancel: CancelToken,
    handle: JoinHandle<Result<AnalysisOutcome, PipelineError>>,
}

impl AnalysisTask {
    pub fn surface(&self) -> TableSurface {
        self.surface
    }

    /// Asks the run to stop at its next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to finish.
    pub fn join(self) -> Result<AnalysisOutcome, PipelineError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Panicked {
                surface: self.surface,
            }),
        }
    }
}

/// Starts `request` on a new thread.
pub fn spawn_analysis(pipeline: Arc<TablePipeline>, request: AnalysisRequest) -> AnalysisTask {
    let cancel = CancelToken::new();
    let surface = request.surface;
    let token = cancel.clone();
    let handle = thread::spawn(move || pipeline.analyze(&request, &token));
    AnalysisTask {
        surface,
        cancel,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes_without_cancel() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancelToken::new();
        let other = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            other.cancel();
        });

        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        canceller.join().unwrap();

        token.reset();
        assert!(!token.is_cancelled());
    }
}
