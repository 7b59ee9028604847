//! One table analysis, end to end.
//!
//! A run identifies the player, fetches their stats, reuses or generates the
//! written analysis, delivers the result and records it in history. Each stage
//! exits early on failure; nothing shared is written before history.

pub mod error;
pub mod task;

pub use error::{PipelineError, Stage};
pub use task::{spawn_analysis, AnalysisTask, CancelToken};

use std::sync::Arc;

use crate::analysis::AnalysisPort;
use crate::capture::{CaptureRegion, TableSurface};
use crate::history::{HistoryRecord, HistoryStore, UpsertResult};
use crate::nickname::NicknameResolver;
use crate::output::OutputSink;
use crate::stats::{StatsPort, SummaryFormat};

/// Called with the stored record whenever a run changes history.
pub type HistoryObserver = Box<dyn Fn(&HistoryRecord) + Send + Sync>;

/// Parameters of one run.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub surface: TableSurface,
    pub region: CaptureRegion,
    pub room: String,
    /// Skip recognition and analyze this nickname.
    pub identifier_override: Option<String>,
    /// Ignore the nickname cache.
    pub force_fresh: bool,
}

impl AnalysisRequest {
    pub fn new(surface: TableSurface, region: CaptureRegion, room: &str) -> Self {
        Self {
            surface,
            region,
            room: room.to_string(),
            identifier_override: None,
            force_fresh: false,
        }
    }

    pub fn with_identifier(mut self, identifier: Option<String>) -> Self {
        self.identifier_override = identifier.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisOutcome {
    /// Payload produced and history recorded.
    Delivered {
        /// The player's record as stored in history after this run.
        record: HistoryRecord,
        /// False when the output sink failed.
        delivered: bool,
        /// True when the analysis came from history instead of the generator.
        reused_analysis: bool,
    },
    /// Both summary and analysis are switched off in the configuration.
    NothingToDeliver,
}

pub struct TablePipeline {
    resolver: NicknameResolver,
    stats: Arc<dyn StatsPort>,
    analyzer: Arc<dyn AnalysisPort>,
    history: Arc<HistoryStore>,
    output: Arc<dyn OutputSink>,
    summary: SummaryFormat,
    include_summary: bool,
    include_analysis: bool,
    observer: Option<HistoryObserver>,
}

impl TablePipeline {
    pub fn new(
        resolver: NicknameResolver,
        stats: Arc<dyn StatsPort>,
        analyzer: Arc<dyn AnalysisPort>,
        history: Arc<HistoryStore>,
        output: Arc<dyn OutputSink>,
        summary: SummaryFormat,
    ) -> Self {
        Self {
            resolver,
            stats,
            analyzer,
            history,
            output,
            summary,
            include_summary: true,
            include_analysis: true,
            observer: None,
        }
    }

    pub fn with_inclusion(mut self, include_summary: bool, include_analysis: bool) -> Self {
        self.include_summary = include_summary;
        self.include_analysis = include_analysis;
        self
    }

    pub fn with_observer(mut self, observer: HistoryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn resolver(&self) -> &NicknameResolver {
        &self.resolver
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Runs the full analysis for one table.
    pub fn analyze(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let surface = request.surface;
        let room = request.room.as_str();

        check_cancel(cancel, surface, None, Stage::Identify)?;
        let identifier = match &request.identifier_override {
            Some(identifier) => {
                log::info!("[{}] Using nickname override '{}'", surface, identifier);
                identifier.trim().to_string()
            }
            None => self
                .resolver
                .resolve(surface, &request.region, request.force_fresh)
                .map_err(|source| PipelineError::IdentifierNotFound { surface, source })?,
        };

        check_cancel(cancel, surface, Some(identifier.as_str()), Stage::FetchStats)?;
        let stats = match self.stats.fetch_stats(&identifier, room) {
            Ok(stats) => stats,
            Err(source) => {
                if self.resolver.cache().invalidate(surface) {
                    log::info!("[{}] Nickname cache entry dropped", surface);
                }
                return Err(PipelineError::StatsFetchFailed {
                    surface,
                    identifier,
                    source,
                });
            }
        };

        let summary = self.summary.render(&stats);
        log::info!("[{}] Stats for '{}': {}", surface, identifier, summary);

        check_cancel(cancel, surface, Some(identifier.as_str()), Stage::Analyze)?;
        let (analysis, reused_analysis) =
            match self.history.find_existing(&identifier, room, &summary) {
                Some(analysis) => {
                    log::info!("[{}] Stats unchanged, reusing stored analysis", surface);
                    (analysis, true)
                }
                None => {
                    let analysis = self.analyzer.generate(&stats, &identifier).map_err(
                        |source| PipelineError::AnalysisGenerationFailed {
                            surface,
                            identifier: identifier.clone(),
                            source,
                        },
                    )?;
                    (analysis, false)
                }
            };

        let Some(payload) = compose_payload(
            &summary,
            &analysis,
            self.include_summary,
            self.include_analysis,
        ) else {
            log::info!("[{}] Summary and analysis both disabled, nothing to deliver", surface);
            return Ok(AnalysisOutcome::NothingToDeliver);
        };

        check_cancel(cancel, surface, Some(identifier.as_str()), Stage::Deliver)?;
        let delivered = match self.output.deliver(surface, &payload) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[{}] Delivery failed: {:#}", surface, e);
                false
            }
        };

        let (result, record) = self
            .history
            .upsert_returning(HistoryRecord::new(&identifier, room, &summary, &analysis))
            .map_err(|source| PipelineError::HistoryIoFailed {
                surface,
                identifier: identifier.clone(),
                source,
            })?;

        if result != UpsertResult::Unchanged {
            if let Some(observer) = &self.observer {
                observer(&record);
            }
        }

        log::info!("[{}] Analysis of '{}' complete", surface, identifier);
        Ok(AnalysisOutcome::Delivered {
            record,
            delivered,
            reused_analysis,
        })
    }
}

fn check_cancel(
    cancel: &CancelToken,
    surface: TableSurface,
    identifier: Option<&str>,
    stage: Stage,
) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        log::info!("[{}] Cancelled before {}", surface, stage);
        return Err(PipelineError::Cancelled {
            surface,
            identifier: identifier.map(str::to_string),
            stage,
        });
    }
    Ok(())
}

/// Builds the delivered text: summary line, then the analysis.
///
/// `None` when both parts are switched off.
pub fn compose_payload(
    summary: &str,
    analysis: &str,
    include_summary: bool,
    include_analysis: bool,
) -> Option<String> {
    let mut parts = Vec::new();
    if include_summary {
        parts.push(summary);
    }
    if include_analysis {
        parts.push(analysis);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::default_stat_fields;
    use crate::nickname::resolver::tests::{found, image_a, FakeCapture, ScriptedRecognizer};
    use crate::nickname::NicknameCache;
    use crate::stats::StatsRecord;
    use anyhow::{anyhow, Result};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const SURFACE: TableSurface = TableSurface(0x5150);
    const REGION: CaptureRegion = CaptureRegion {
        x: 95,
        y: 110,
        width: 95,
        height: 22,
    };

    pub struct FakeStats {
        pub calls: AtomicUsize,
        fail: bool,
    }

    impl StatsPort for FakeStats {
        fn fetch_stats(&self, identifier: &str, room: &str) -> Result<StatsRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("404 for {} in {}", identifier, room));
            }
            Ok(StatsRecord::from(json!({
                "vpip": 24, "pfr": 18, "three_bet": 7, "fold_to_3bet_pct": 55,
                "wtsd": 28, "wsd": 51, "cbet_flop": 62, "cbet_turn": 45
            })))
        }
    }

    struct FakeAnalyzer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl AnalysisPort for FakeAnalyzer {
        fn generate(&self, _stats: &StatsRecord, _display_name: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("rate limited"));
            }
            Ok("Tight-aggressive, folds to river pressure.".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        payloads: Mutex<Vec<String>>,
        fail: bool,
    }

    impl OutputSink for RecordingSink {
        fn deliver(&self, _surface: TableSurface, text: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow!("table closed"));
            }
            self.payloads.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    pub struct Harness {
        _dir: TempDir,
        pub recognizer: Arc<ScriptedRecognizer>,
        pub stats: Arc<FakeStats>,
        analyzer: Arc<FakeAnalyzer>,
        sink: Arc<RecordingSink>,
        pub history: Arc<HistoryStore>,
        cache: Arc<NicknameCache>,
    }

    impl Harness {
        pub fn new(stats_fail: bool, analysis_fail: bool, sink_fail: bool) -> Self {
            let dir = tempdir().unwrap();
            let history = Arc::new(HistoryStore::new(dir.path().join("history.json"), 100));
            Self {
                _dir: dir,
                recognizer: ScriptedRecognizer::new(
                    "primary",
                    vec![found("Hero77", 0.95), found("Hero77", 0.95)],
                ),
                stats: Arc::new(FakeStats {
                    calls: AtomicUsize::new(0),
                    fail: stats_fail,
                }),
                analyzer: Arc::new(FakeAnalyzer {
                    calls: AtomicUsize::new(0),
                    fail: analysis_fail,
                }),
                sink: Arc::new(RecordingSink {
                    fail: sink_fail,
                    ..Default::default()
                }),
                history,
                cache: Arc::new(NicknameCache::new(Duration::from_secs(60))),
            }
        }

        pub fn pipeline(&self) -> TablePipeline {
            let resolver = NicknameResolver::new(
                FakeCapture::new(image_a()),
                vec![self.recognizer.clone()],
                self.cache.clone(),
            );
            TablePipeline::new(
                resolver,
                self.stats.clone(),
                self.analyzer.clone(),
                self.history.clone(),
                self.sink.clone(),
                SummaryFormat::new(default_stat_fields(), " "),
            )
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(SURFACE, REGION, "XPK")
    }

    #[test]
    fn test_end_to_end_delivers_and_records() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();

        let outcome = pipeline.analyze(&request(), &CancelToken::new()).unwrap();

        let AnalysisOutcome::Delivered {
            record,
            delivered,
            reused_analysis,
        } = outcome
        else {
            panic!("expected a delivered outcome");
        };
        assert!(delivered);
        assert!(!reused_analysis);
        assert_eq!(record.identifier, "Hero77");
        assert_eq!(record.room, "XPK");
        assert!(record.summary.starts_with("VPIP:24 PFR:18"));
        assert!(record.analysis.starts_with("Tight-aggressive"));

        let payloads = h.sink.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0],
            format!("{}\n{}", record.summary, record.analysis)
        );

        let stored = h.history.load();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], record);
    }

    #[test]
    fn test_second_run_reuses_stored_analysis() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();

        pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        let outcome = pipeline.analyze(&request(), &CancelToken::new()).unwrap();

        assert!(matches!(
            outcome,
            AnalysisOutcome::Delivered {
                reused_analysis: true,
                ..
            }
        ));
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.recognizer.calls(), 1);
        assert_eq!(h.history.load().len(), 1);
    }

    #[test]
    fn test_unchanged_run_reports_stored_record() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();

        pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        let mut stored = h.history.load();
        stored[0].timestamp = "2024-01-01 10:00:00".to_string();
        h.history.save(&stored).unwrap();

        let AnalysisOutcome::Delivered { record, .. } =
            pipeline.analyze(&request(), &CancelToken::new()).unwrap()
        else {
            panic!("expected a delivered outcome");
        };
        assert_eq!(record.timestamp, "2024-01-01 10:00:00");
        assert_eq!(h.history.load(), vec![record]);
    }

    #[test]
    fn test_unreadable_history_fails_without_overwriting() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();
        let bytes = b"[{\"nick\": \"Old\xFF\"}]".to_vec();
        std::fs::write(h.history.path(), &bytes).unwrap();

        let err = pipeline.analyze(&request(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::HistoryIoFailed { .. }));
        assert_eq!(h.sink.payloads.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read(h.history.path()).unwrap(), bytes);
    }

    #[test]
    fn test_cleared_cache_recognizes_again() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();

        pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        pipeline.resolver().cache().clear();
        pipeline.analyze(&request(), &CancelToken::new()).unwrap();

        assert_eq!(h.recognizer.calls(), 2);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_override_skips_recognition() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();

        let outcome = pipeline
            .analyze(
                &request().with_identifier(Some("Villain".to_string())),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(h.recognizer.calls(), 0);
        let AnalysisOutcome::Delivered { record, .. } = outcome else {
            panic!("expected a delivered outcome");
        };
        assert_eq!(record.identifier, "Villain");
    }

    #[test]
    fn test_no_identifier_writes_nothing() {
        let h = Harness::new(false, false, false);
        let resolver = NicknameResolver::new(
            FakeCapture::new(image_a()),
            vec![ScriptedRecognizer::new("empty", vec![])],
            h.cache.clone(),
        );
        let pipeline = TablePipeline::new(
            resolver,
            h.stats.clone(),
            h.analyzer.clone(),
            h.history.clone(),
            h.sink.clone(),
            SummaryFormat::new(default_stat_fields(), " "),
        );

        let err = pipeline.analyze(&request(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::IdentifierNotFound { .. }));
        assert_eq!(h.stats.calls.load(Ordering::SeqCst), 0);
        assert!(h.history.load().is_empty());
    }

    #[test]
    fn test_stats_failure_invalidates_nickname_cache() {
        let h = Harness::new(true, false, false);
        let pipeline = h.pipeline();

        let err = pipeline.analyze(&request(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::StatsFetchFailed { .. }));
        assert_eq!(err.identifier(), Some("Hero77"));
        assert!(h.cache.fresh(SURFACE).is_none());
        assert!(h.history.load().is_empty());
        assert!(h.sink.payloads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_analysis_failure_keeps_nickname_cache() {
        let h = Harness::new(false, true, false);
        let pipeline = h.pipeline();

        let err = pipeline.analyze(&request(), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisGenerationFailed { .. }));
        assert_eq!(h.cache.fresh(SURFACE).unwrap().nickname, "Hero77");
        assert!(h.history.load().is_empty());
    }

    #[test]
    fn test_nothing_to_deliver() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline().with_inclusion(false, false);

        let outcome = pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        assert_eq!(outcome, AnalysisOutcome::NothingToDeliver);
        assert!(h.sink.payloads.lock().unwrap().is_empty());
        assert!(h.history.load().is_empty());
    }

    #[test]
    fn test_delivery_failure_still_records_history() {
        let h = Harness::new(false, false, true);
        let pipeline = h.pipeline();

        let outcome = pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        assert!(matches!(
            outcome,
            AnalysisOutcome::Delivered {
                delivered: false,
                ..
            }
        ));
        assert_eq!(h.history.load().len(), 1);
    }

    #[test]
    fn test_observer_sees_new_records_only() {
        let h = Harness::new(false, false, false);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pipeline = h.pipeline().with_observer(Box::new(move |record: &HistoryRecord| {
            assert_eq!(record.identifier, "Hero77");
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        pipeline.analyze(&request(), &CancelToken::new()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_run_stops_before_first_stage() {
        let h = Harness::new(false, false, false);
        let pipeline = h.pipeline();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = pipeline.analyze(&request(), &cancel).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Identify,
                ..
            }
        ));
        assert_eq!(h.recognizer.calls(), 0);
    }

    #[test]
    fn test_spawned_task_joins_with_outcome() {
        let h = Harness::new(false, false, false);
        let pipeline = Arc::new(h.pipeline());

        let task = spawn_analysis(Arc::clone(&pipeline), request());
        assert_eq!(task.surface(), SURFACE);
        let outcome = task.join().unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Delivered { .. }));
    }

    #[test]
    fn test_compose_payload() {
        assert_eq!(
            compose_payload("VPIP:24", "TAG", true, true).as_deref(),
            Some("VPIP:24\nTAG")
        );
        assert_eq!(compose_payload("VPIP:24", "TAG", true, false).as_deref(), Some("VPIP:24"));
        assert_eq!(compose_payload("VPIP:24", "TAG", false, true).as_deref(), Some("TAG"));
        assert!(compose_payload("VPIP:24", "TAG", false, false).is_none());
    }
}
