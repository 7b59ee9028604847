//! Automatic sweep over every open table.
//!
//! The sweep thread runs the pipeline for each table in turn, pausing between
//! tables and waiting between cycles. The stop flag is checked at every pause,
//! so `stop()` takes effect within a fraction of a second.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::{CaptureRegion, TableFinder};
use crate::config::AppConfig;
use crate::pipeline::{AnalysisOutcome, AnalysisRequest, CancelToken, PipelineError, TablePipeline};

/// Pause after a failed cycle before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepTiming {
    /// Between two tables of one cycle
    pub table_pause: Duration,
    /// Between the end of a cycle and the next one
    pub cycle_wait: Duration,
    /// After a cycle failed
    pub error_backoff: Duration,
}

impl SweepTiming {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            table_pause: Duration::from_millis(config.table_pause_ms),
            cycle_wait: Duration::from_secs(config.auto_check_interval_secs),
            error_backoff: ERROR_BACKOFF,
        }
    }
}

/// What the sweep thread is doing right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Searching,
    Analyzing { title: String },
    Pausing,
    Waiting,
    BackingOff,
    Stopped,
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepState::Idle => write!(f, "Idle"),
            SweepState::Searching => write!(f, "Searching for tables"),
            SweepState::Analyzing { title } => write!(f, "Analyzing {}", title),
            SweepState::Pausing => write!(f, "Pausing between tables"),
            SweepState::Waiting => write!(f, "Waiting for next cycle"),
            SweepState::BackingOff => write!(f, "Backing off after error"),
            SweepState::Stopped => write!(f, "Stopped"),
        }
    }
}

pub struct Sweeper {
    pipeline: Arc<TablePipeline>,
    finder: Arc<dyn TableFinder>,
    region: CaptureRegion,
    room: String,
    timing: SweepTiming,
    running: AtomicBool,
    state: Mutex<SweepState>,
    cancel: CancelToken,
}

impl Sweeper {
    pub fn new(
        pipeline: Arc<TablePipeline>,
        finder: Arc<dyn TableFinder>,
        region: CaptureRegion,
        room: &str,
        timing: SweepTiming,
    ) -> Self {
        Self {
            pipeline,
            finder,
            region,
            room: room.to_string(),
            timing,
            running: AtomicBool::new(false),
            state: Mutex::new(SweepState::Idle),
            cancel: CancelToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SweepState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Human-readable status line.
    pub fn status(&self) -> String {
        self.state().to_string()
    }

    fn set_state(&self, state: SweepState) {
        match self.state.lock() {
            Ok(mut s) => *s = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Starts the sweep thread. Fails if a sweep is already running.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("Sweep is already running"));
        }
        self.cancel.reset();

        log::info!(
            "Starting sweep: {:?} between tables, {:?} between cycles",
            self.timing.table_pause,
            self.timing.cycle_wait
        );

        let sweeper = Arc::clone(self);
        Ok(thread::spawn(move || {
            sweeper.run();
            sweeper.set_state(SweepState::Stopped);
            sweeper.running.store(false, Ordering::SeqCst);
            log::info!("Sweep stopped");
        }))
    }

    /// Asks the sweep to stop at its next pause boundary.
    pub fn stop(&self) {
        if self.is_running() {
            log::info!("Stop requested, finishing current stage");
        }
        self.cancel.cancel();
    }

    fn run(&self) {
        while !self.cancel.is_cancelled() {
            let (state, wait) = match self.run_cycle() {
                Ok(count) => {
                    log::info!("Sweep cycle done: {} table(s) analyzed", count);
                    (SweepState::Waiting, self.timing.cycle_wait)
                }
                Err(e) => {
                    log::error!("Sweep cycle failed: {:#}", e);
                    (SweepState::BackingOff, self.timing.error_backoff)
                }
            };
            self.set_state(state);
            if !self.cancel.sleep(wait) {
                break;
            }
        }
    }

    /// Runs the pipeline once for every open table.
    ///
    /// Returns how many runs finished with a delivered result. Failures of a
    /// single table are logged and do not stop the cycle.
    pub fn run_cycle(&self) -> Result<usize> {
        self.set_state(SweepState::Searching);
        let tables = self.finder.find_tables()?;
        if tables.is_empty() {
            log::info!("No poker tables found");
            return Ok(0);
        }

        let mut delivered = 0;
        for (i, table) in tables.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(SweepState::Analyzing {
                title: table.title.clone(),
            });
            log::info!("Sweep: table {}/{} \"{}\"", i + 1, tables.len(), table.title);

            let request = AnalysisRequest::new(table.surface, self.region, &self.room);
            match self.pipeline.analyze(&request, &self.cancel) {
                Ok(AnalysisOutcome::Delivered { .. }) => delivered += 1,
                Ok(AnalysisOutcome::NothingToDeliver) => {}
                Err(PipelineError::Cancelled { .. }) => break,
                Err(e) => log::warn!("{}", e),
            }

            if i + 1 < tables.len() {
                self.set_state(SweepState::Pausing);
                if !self.cancel.sleep(self.timing.table_pause) {
                    break;
                }
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{TableInfo, TableSurface};
    use crate::pipeline::tests::Harness;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct FakeFinder {
        tables: Vec<TableInfo>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeFinder {
        fn new(count: usize, fail: bool) -> Arc<Self> {
            let tables = (0..count)
                .map(|i| TableInfo {
                    surface: TableSurface(0x100 + i as isize),
                    title: format!("Table {} - NL50 0.25/0.50", i + 1),
                })
                .collect();
            Arc::new(Self {
                tables,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TableFinder for FakeFinder {
        fn find_tables(&self) -> Result<Vec<TableInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("EnumWindows failed"));
            }
            Ok(self.tables.clone())
        }
    }

    const REGION: CaptureRegion = CaptureRegion {
        x: 95,
        y: 110,
        width: 95,
        height: 22,
    };

    fn fast_timing() -> SweepTiming {
        SweepTiming {
            table_pause: Duration::from_millis(10),
            cycle_wait: Duration::from_secs(30),
            error_backoff: Duration::from_secs(30),
        }
    }

    fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn test_cycle_visits_every_table() {
        let h = Harness::new(false, false, false);
        let finder = FakeFinder::new(2, false);
        let sweeper = Sweeper::new(Arc::new(h.pipeline()), finder, REGION, "XPK", fast_timing());

        assert_eq!(sweeper.run_cycle().unwrap(), 2);
        assert_eq!(h.stats.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.recognizer.calls(), 2);
    }

    #[test]
    fn test_cycle_with_failing_tables_continues() {
        let h = Harness::new(true, false, false);
        let finder = FakeFinder::new(2, false);
        let sweeper = Sweeper::new(Arc::new(h.pipeline()), finder, REGION, "XPK", fast_timing());

        assert_eq!(sweeper.run_cycle().unwrap(), 0);
        assert_eq!(h.stats.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_tables() {
        let h = Harness::new(false, false, false);
        let sweeper = Sweeper::new(
            Arc::new(h.pipeline()),
            FakeFinder::new(0, false),
            REGION,
            "XPK",
            fast_timing(),
        );
        assert_eq!(sweeper.run_cycle().unwrap(), 0);
    }

    #[test]
    fn test_start_stop() {
        let h = Harness::new(false, false, false);
        let finder = FakeFinder::new(1, false);
        let sweeper = Arc::new(Sweeper::new(
            Arc::new(h.pipeline()),
            finder,
            REGION,
            "XPK",
            fast_timing(),
        ));

        let handle = sweeper.start().unwrap();
        assert!(sweeper.is_running());
        assert!(sweeper.start().is_err());
        assert!(wait_until(Duration::from_secs(5), || {
            sweeper.state() == SweepState::Waiting
        }));

        let stop_requested = Instant::now();
        sweeper.stop();
        handle.join().unwrap();

        assert!(stop_requested.elapsed() < Duration::from_secs(2));
        assert!(!sweeper.is_running());
        assert_eq!(sweeper.status(), "Stopped");
        assert_eq!(h.history.load().len(), 1);
    }

    #[test]
    fn test_finder_error_backs_off() {
        let h = Harness::new(false, false, false);
        let finder = FakeFinder::new(1, true);
        let sweeper = Arc::new(Sweeper::new(
            Arc::new(h.pipeline()),
            finder.clone(),
            REGION,
            "XPK",
            fast_timing(),
        ));

        let handle = sweeper.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            sweeper.state() == SweepState::BackingOff
        }));
        sweeper.stop();
        handle.join().unwrap();

        assert_eq!(finder.calls.load(Ordering::SeqCst), 1);
    }
}
