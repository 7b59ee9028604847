use std::fmt;

use crate::capture::TableSurface;
use crate::nickname::ResolveError;

/// Pipeline stage an error or cancellation happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Identify,
    FetchStats,
    Analyze,
    Deliver,
    Record,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Identify => write!(f, "identify"),
            Stage::FetchStats => write!(f, "fetch stats"),
            Stage::Analyze => write!(f, "analyze"),
            Stage::Deliver => write!(f, "deliver"),
            Stage::Record => write!(f, "record history"),
        }
    }
}

fn or_unknown(identifier: &Option<String>) -> &str {
    identifier.as_deref().unwrap_or("?")
}

/// Terminal failure of one pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("[{surface}] no identifier: {source}")]
    IdentifierNotFound {
        surface: TableSurface,
        #[source]
        source: ResolveError,
    },

    #[error("[{surface}] stats fetch failed for '{identifier}': {source:#}")]
    StatsFetchFailed {
        surface: TableSurface,
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{surface}] analysis failed for '{identifier}': {source:#}")]
    AnalysisGenerationFailed {
        surface: TableSurface,
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{surface}] history write failed for '{identifier}': {source:#}")]
    HistoryIoFailed {
        surface: TableSurface,
        identifier: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{surface}] cancelled before {stage} (identifier: {})", or_unknown(.identifier))]
    Cancelled {
        surface: TableSurface,
        identifier: Option<String>,
        stage: Stage,
    },

    #[error("[{surface}] analysis task panicked")]
    Panicked { surface: TableSurface },
}

impl PipelineError {
    pub fn surface(&self) -> TableSurface {
        match self {
            PipelineError::IdentifierNotFound { surface, .. }
            | PipelineError::StatsFetchFailed { surface, .. }
            | PipelineError::AnalysisGenerationFailed { surface, .. }
            | PipelineError::HistoryIoFailed { surface, .. }
            | PipelineError::Cancelled { surface, .. }
            | PipelineError::Panicked { surface } => *surface,
        }
    }

    /// Identifier the run was working on, if it got that far.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            PipelineError::StatsFetchFailed { identifier, .. }
            | PipelineError::AnalysisGenerationFailed { identifier, .. }
            | PipelineError::HistoryIoFailed { identifier, .. } => Some(identifier),
            PipelineError::Cancelled { identifier, .. } => identifier.as_deref(),
            PipelineError::IdentifierNotFound { .. } | PipelineError::Panicked { .. } => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::IdentifierNotFound { .. } => Some(Stage::Identify),
            PipelineError::StatsFetchFailed { .. } => Some(Stage::FetchStats),
            PipelineError::AnalysisGenerationFailed { .. } => Some(Stage::Analyze),
            PipelineError::HistoryIoFailed { .. } => Some(Stage::Record),
            PipelineError::Cancelled { stage, .. } => Some(*stage),
            PipelineError::Panicked { .. } => None,
        }
    }
}
