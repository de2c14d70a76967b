use std::{fmt, path::PathBuf, time::Duration};

/// Recommended next step when an attribution error occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Drop the subtree from the report; siblings and parent are unaffected.
    SkipSubtree,
    /// Keep the entries but report them with zero scaled size.
    ZeroFill,
}

/// Typed attribution errors; every variant is local to one subtree.
#[derive(Debug)]
pub enum EstimateError {
    SourceUnavailable { path: PathBuf, reason: String },
    Timeout { path: PathBuf, after: Duration },
    ParseFailure { path: PathBuf, line: String },
    DegenerateScale { path: PathBuf },
}

impl EstimateError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            EstimateError::SourceUnavailable { path, .. }
            | EstimateError::Timeout { path, .. }
            | EstimateError::ParseFailure { path, .. }
            | EstimateError::DegenerateScale { path } => path,
        }
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        EstimateError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimateError::SourceUnavailable { path, reason } => {
                write!(f, "{}: source unavailable: {}", path.display(), reason)
            }
            EstimateError::Timeout { path, after } => {
                write!(
                    f,
                    "{}: sampler timed out after {:.1}s",
                    path.display(),
                    after.as_secs_f64()
                )
            }
            EstimateError::ParseFailure { path, line } => {
                write!(f, "{}: unparsable sampler line {:?}", path.display(), line)
            }
            EstimateError::DegenerateScale { path } => {
                write!(f, "{}: nothing to scale against, unable to estimate", path.display())
            }
        }
    }
}

impl std::error::Error for EstimateError {}

pub type EstimateResult<T> = Result<T, EstimateError>;

pub trait ErrorRecovery {
    fn is_recoverable(&self) -> bool;
    fn recovery_action(&self) -> RecoveryAction;
}

impl ErrorRecovery for EstimateError {
    // Nothing in the engine is fatal to the whole report.
    fn is_recoverable(&self) -> bool {
        true
    }
    fn recovery_action(&self) -> RecoveryAction {
        match self {
            EstimateError::DegenerateScale { .. } => RecoveryAction::ZeroFill,
            EstimateError::SourceUnavailable { .. }
            | EstimateError::Timeout { .. }
            | EstimateError::ParseFailure { .. } => RecoveryAction::SkipSubtree,
        }
    }
}
