use thiserror::Error;

/// Failure taxonomy of a generation run. Only the fatal variants escape the
/// pipeline; everything else is absorbed at the tier or scene that hit it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no script segment matched the word timings")]
    AlignmentMismatch,
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),
    #[error("all sources exhausted for segment {segment_index}")]
    AllSourcesExhausted { segment_index: usize },
    #[error("clip extraction failed: {0}")]
    ExtractionError(String),
    #[error("no scene could be bound to any asset")]
    NoScenesResolvable,
    #[error("run cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid plan: {0}")]
    Plan(#[from] engine::PlanError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::NoScenesResolvable | PipelineError::Cancelled
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unresolvable_and_cancel_are_fatal() {
        assert!(PipelineError::NoScenesResolvable.is_fatal());
        assert!(PipelineError::Cancelled.is_fatal());
        assert!(!PipelineError::AllSourcesExhausted { segment_index: 2 }.is_fatal());
        assert!(!PipelineError::AssetUnavailable("x".into()).is_fatal());
        assert!(!PipelineError::ExtractionError("timeout".into()).is_fatal());
    }
}
