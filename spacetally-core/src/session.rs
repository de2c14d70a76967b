use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;

use crate::{error_handling::EstimateError, ErrorRecovery, RecoveryAction};

/// What happened at one node, in traversal order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Sampled {
        path: PathBuf,
        level: u32,
        entries: usize,
        raw_sum: u64,
        aggregate: Option<u64>,
        elapsed_ms: u64,
    },
    Failed {
        path: PathBuf,
        level: u32,
        error: String,
        skipped: bool,
    },
    Excluded {
        path: PathBuf,
        level: u32,
    },
}

/// Ordered log for one report; owned by the caller and passed by `&mut`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EstimateSession {
    events: Vec<SessionEvent>,
    sampler_calls: u64,
    errors: u64,
}

impl EstimateSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn sampler_calls(&self) -> u64 {
        self.sampler_calls
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }

    pub(crate) fn record_sample(
        &mut self,
        path: &Path,
        level: u32,
        entries: usize,
        raw_sum: u64,
        aggregate: Option<u64>,
        elapsed: Duration,
    ) {
        self.sampler_calls += 1;
        self.events.push(SessionEvent::Sampled {
            path: path.to_path_buf(),
            level,
            entries,
            raw_sum,
            aggregate,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    /// Count and log a recovered error.
    pub(crate) fn record_error(&mut self, level: u32, err: &EstimateError) {
        if !matches!(err, EstimateError::DegenerateScale { .. }) {
            self.sampler_calls += 1;
        }
        self.errors += 1;
        log::warn!("{err}");
        self.events.push(SessionEvent::Failed {
            path: err.path().to_path_buf(),
            level,
            error: err.to_string(),
            skipped: err.recovery_action() == RecoveryAction::SkipSubtree,
        });
    }

    pub(crate) fn record_excluded(&mut self, path: &Path, level: u32) {
        log::debug!("excluded {}", path.display());
        self.events.push(SessionEvent::Excluded {
            path: path.to_path_buf(),
            level,
        });
    }
}
