//! Table Scout
//!
//! Reads the nickname of the player seated at a poker table, fetches their
//! stats from the stats server, and pastes a one-line summary plus a short
//! written read into the table chat.

mod analysis;
mod capture;
mod config;
#[cfg(windows)]
mod hotkey;
mod history;
mod logging;
mod nickname;
mod ocr;
mod output;
mod paths;
mod pipeline;
mod stats;
mod sweep;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use std::sync::Arc;

use crate::analysis::OpenAiAnalyzer;
use crate::capture::{SurfaceCapture, TableFinder, TableSurface};
use crate::config::AppConfig;
use crate::history::{HistoryRecord, HistoryStore};
use crate::nickname::{NicknameCache, NicknameResolver};
use crate::ocr::{Recognizer, TesseractRecognizer};
use crate::output::OutputSink;
use crate::pipeline::{spawn_analysis, AnalysisOutcome, AnalysisRequest, PipelineError, TablePipeline};
use crate::stats::{HttpStatsClient, SummaryFormat};

const USAGE: &str = "\
Usage: table-scout <command>

Commands:
  analyze <window-handle> [--nick NAME] [--fresh]   Analyze one table
  sweep                                             Analyze all open tables until Ctrl+Q
  listen                                            Alt+Q analyzes the table under the cursor,
                                                    Alt+Shift+Q ignores the nickname cache,
                                                    Alt+Shift+C clears the nickname cache,
                                                    Ctrl+Alt+Q exits
  history [SEARCH]                                  Show stored analyses, newest first
  note <nick> <notes...>                            Attach notes to a player
  clear-history                                     Delete all stored analyses";

#[derive(Debug, PartialEq)]
enum Command {
    Analyze {
        surface: TableSurface,
        nick: Option<String>,
        fresh: bool,
    },
    Sweep,
    Listen,
    History { search: Option<String> },
    Note { nick: String, notes: String },
    ClearHistory,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "analyze" => {
            let mut surface = None;
            let mut nick = None;
            let mut fresh = false;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--fresh" => fresh = true,
                    "--nick" => {
                        let value = iter.next().ok_or_else(|| anyhow!("--nick needs a value"))?;
                        nick = Some(value.clone());
                    }
                    other if surface.is_none() => surface = Some(other.parse::<TableSurface>()?),
                    other => bail!("Unexpected argument: {}", other),
                }
            }
            let surface = surface.ok_or_else(|| anyhow!("analyze needs a window handle"))?;
            Ok(Command::Analyze {
                surface,
                nick,
                fresh,
            })
        }
        "sweep" => Ok(Command::Sweep),
        "listen" => Ok(Command::Listen),
        "history" => Ok(Command::History {
            search: (!rest.is_empty()).then(|| rest.join(" ")),
        }),
        "note" => {
            let (nick, notes) = rest
                .split_first()
                .ok_or_else(|| anyhow!("note needs a nickname"))?;
            Ok(Command::Note {
                nick: nick.clone(),
                notes: notes.join(" "),
            })
        }
        "clear-history" => Ok(Command::ClearHistory),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn main() -> Result<()> {
    paths::ensure_directories().context("Failed to create output directories")?;
    logging::init();

    let config_path = paths::get_config_path();
    let config = config::load_config(&config_path);
    if !config_path.exists() {
        match config::save_config(&config, &config_path) {
            Ok(()) => log::info!("Default config written to {}", config_path.display()),
            Err(e) => log::warn!("{:#}", e),
        }
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    log::debug!("Command: {:?}", command);

    match command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        Command::Analyze {
            surface,
            nick,
            fresh,
        } => {
            let backend = Backend::new(&config)?;
            let pipeline = Arc::new(build_pipeline(&config, &backend)?);
            let request = AnalysisRequest::new(surface, config.ocr_region, &config.room)
                .with_identifier(nick)
                .fresh(fresh);
            report(spawn_analysis(pipeline, request).join())
        }
        Command::Sweep => run_sweep(&config),
        Command::Listen => run_listen(&config),
        Command::History { search } => {
            let store = history_store(&config);
            let records = store.search(search.as_deref().unwrap_or(""));
            if records.is_empty() {
                println!("No history records.");
            }
            for record in &records {
                print_record(record);
            }
            Ok(())
        }
        Command::Note { nick, notes } => {
            let store = history_store(&config);
            if store.annotate(&nick, &config.room, &notes)? {
                println!("Notes saved for {} ({})", nick, config.room);
                Ok(())
            } else {
                Err(anyhow!("No history record for {} in room {}", nick, config.room))
            }
        }
        Command::ClearHistory => history_store(&config).clear_all(),
    }
}

fn history_store(config: &AppConfig) -> HistoryStore {
    HistoryStore::new(paths::get_history_path(), config.max_history)
}

fn print_record(record: &HistoryRecord) {
    println!("{}  {} ({})", record.timestamp, record.identifier, record.room);
    println!("  {}", record.summary);
    for line in record.analysis.lines() {
        println!("  {}", line);
    }
    if let Some(notes) = &record.notes {
        println!("  Notes: {}", notes);
    }
    println!();
}

/// Logs the result of one run; failures become the process error.
fn report(result: Result<AnalysisOutcome, PipelineError>) -> Result<()> {
    match result {
        Ok(AnalysisOutcome::Delivered {
            record, delivered, ..
        }) => {
            if !delivered {
                log::warn!("Analysis of '{}' saved but not delivered", record.identifier);
            }
            Ok(())
        }
        Ok(AnalysisOutcome::NothingToDeliver) => {
            log::warn!("Both include_summary and include_analysis are off in config.json");
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Platform capture and table discovery.
struct Backend {
    capture: Arc<dyn SurfaceCapture>,
    #[cfg_attr(not(windows), allow(dead_code))]
    finder: Arc<dyn TableFinder>,
    #[cfg_attr(not(windows), allow(dead_code))]
    title_pattern: Regex,
}

impl Backend {
    fn new(config: &AppConfig) -> Result<Self> {
        let title_pattern = Regex::new(&config.table_title_pattern)
            .with_context(|| format!("Invalid table_title_pattern: {}", config.table_title_pattern))?;

        #[cfg(windows)]
        let backend = Arc::new(capture::window::WindowsCapture::new(title_pattern.clone()));
        #[cfg(not(windows))]
        let backend = Arc::new(capture::UnsupportedCapture);

        Ok(Self {
            capture: backend.clone(),
            finder: backend,
            title_pattern,
        })
    }
}

/// Primary and secondary Tesseract recognizers; missing ones are skipped.
fn build_recognizers(config: &AppConfig) -> Vec<Arc<dyn Recognizer>> {
    let languages = [
        ("primary", config.primary_language.as_str()),
        ("secondary", config.secondary_language.as_str()),
    ];

    let specs: Vec<&str> = languages.iter().map(|(_, lang)| *lang).collect();
    if let Err(e) = ocr::setup::ensure_languages(&specs) {
        log::warn!("Tesseract setup incomplete: {:#}", e);
    }

    let mut recognizers: Vec<Arc<dyn Recognizer>> = Vec::new();
    for (name, language) in languages {
        if language.trim().is_empty() {
            continue;
        }
        match TesseractRecognizer::new(name, language) {
            Ok(recognizer) => recognizers.push(Arc::new(recognizer)),
            Err(e) => log::warn!("Recognizer '{}' unavailable: {:#}", name, e),
        }
    }
    if recognizers.is_empty() {
        log::warn!("No recognizers available; only --nick runs can succeed");
    }
    recognizers
}

fn build_output(config: &AppConfig) -> Arc<dyn OutputSink> {
    #[cfg(windows)]
    {
        Arc::new(output::ClipboardPasteSink::new(config.paste_to_table))
    }
    #[cfg(not(windows))]
    {
        let _ = config.paste_to_table;
        Arc::new(output::ConsoleSink)
    }
}

fn build_pipeline(config: &AppConfig, backend: &Backend) -> Result<TablePipeline> {
    let cache = Arc::new(NicknameCache::new(config.nick_cache_ttl()));
    let resolver = NicknameResolver::new(backend.capture.clone(), build_recognizers(config), cache)
        .with_reveal_click(config.reveal_click)
        .with_save_captures(config.save_captures);

    let stats = Arc::new(HttpStatsClient::new(
        &config.server_url,
        &config.token,
        config.stats_timeout(),
    )?);
    let analyzer = Arc::new(OpenAiAnalyzer::new(
        &config.openai_api_key,
        &config.analysis_model,
        config.analysis_timeout(),
        config.analysis_max_attempts,
    )?);

    Ok(TablePipeline::new(
        resolver,
        stats,
        analyzer,
        Arc::new(history_store(config)),
        build_output(config),
        SummaryFormat::from_config(config),
    )
    .with_inclusion(config.include_summary, config.include_analysis)
    .with_observer(Box::new(|record: &HistoryRecord| {
        log::info!(
            "History updated: {} ({}) {}",
            record.identifier,
            record.room,
            record.summary
        );
    })))
}

#[cfg(windows)]
fn run_sweep(config: &AppConfig) -> Result<()> {
    use crate::sweep::{SweepTiming, Sweeper};

    let backend = Backend::new(config)?;
    let pipeline = Arc::new(build_pipeline(config, &backend)?);
    let sweeper = Arc::new(Sweeper::new(
        pipeline,
        backend.finder.clone(),
        config.ocr_region,
        &config.room,
        SweepTiming::from_config(config),
    ));

    let handle = sweeper.start()?;
    hotkey::run_hotkey_loop(&hotkey::sweep_bindings(), |_| {})?;

    sweeper.stop();
    handle
        .join()
        .map_err(|_| anyhow!("Sweep thread panicked"))?;
    Ok(())
}

#[cfg(not(windows))]
fn run_sweep(_config: &AppConfig) -> Result<()> {
    bail!("sweep needs window capture, which is only available on Windows")
}

#[cfg(windows)]
fn run_listen(config: &AppConfig) -> Result<()> {
    use crate::hotkey::HotkeyAction;
    use crate::pipeline::AnalysisTask;

    let backend = Backend::new(config)?;
    let pipeline = Arc::new(build_pipeline(config, &backend)?);
    let mut tasks: Vec<AnalysisTask> = Vec::new();

    hotkey::run_hotkey_loop(&hotkey::listen_bindings(), |action| {
        let (done, pending): (Vec<_>, Vec<_>) =
            tasks.drain(..).partition(|task| task.is_finished());
        tasks = pending;
        for task in done {
            let _ = report(task.join());
        }

        if action == HotkeyAction::ClearCache {
            pipeline.resolver().cache().clear();
            return;
        }

        let table = match capture::window::table_under_cursor(&backend.title_pattern) {
            Ok(table) => table,
            Err(e) => {
                log::warn!("{}", e);
                return;
            }
        };
        if tasks.iter().any(|task| task.surface() == table.surface) {
            log::info!("Table \"{}\" is already being analyzed", table.title);
            return;
        }

        log::info!("Analyzing \"{}\"", table.title);
        let request = AnalysisRequest::new(table.surface, config.ocr_region, &config.room)
            .fresh(action == HotkeyAction::AnalyzeFresh);
        tasks.push(spawn_analysis(Arc::clone(&pipeline), request));
    })?;

    for task in &tasks {
        task.cancel();
    }
    for task in tasks {
        let _ = report(task.join());
    }
    Ok(())
}

#[cfg(not(windows))]
fn run_listen(_config: &AppConfig) -> Result<()> {
    bail!("listen needs global hotkeys, which are only available on Windows")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_analyze() {
        let command = parse_args(&args(&["analyze", "0x1A2B", "--nick", "Hero77", "--fresh"]))
            .unwrap();
        assert_eq!(
            command,
            Command::Analyze {
                surface: TableSurface(0x1A2B),
                nick: Some("Hero77".to_string()),
                fresh: true,
            }
        );
    }

    #[test]
    fn test_parse_analyze_errors() {
        assert!(parse_args(&args(&["analyze"])).is_err());
        assert!(parse_args(&args(&["analyze", "123", "--nick"])).is_err());
        assert!(parse_args(&args(&["analyze", "xyz"])).is_err());
        assert!(parse_args(&args(&["analyze", "1", "2"])).is_err());
    }

    #[test]
    fn test_parse_history_and_note() {
        assert_eq!(
            parse_args(&args(&["history", "tight", "reg"])).unwrap(),
            Command::History {
                search: Some("tight reg".to_string())
            }
        );
        assert_eq!(
            parse_args(&args(&["history"])).unwrap(),
            Command::History { search: None }
        );
        assert_eq!(
            parse_args(&args(&["note", "Hero77", "3-bets", "light"])).unwrap(),
            Command::Note {
                nick: "Hero77".to_string(),
                notes: "3-bets light".to_string()
            }
        );
        assert!(parse_args(&args(&["note"])).is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["sweep"])).unwrap(), Command::Sweep);
        assert_eq!(parse_args(&args(&["listen"])).unwrap(), Command::Listen);
        assert_eq!(
            parse_args(&args(&["clear-history"])).unwrap(),
            Command::ClearHistory
        );
        assert!(parse_args(&args(&["dance"])).is_err());
    }
}
