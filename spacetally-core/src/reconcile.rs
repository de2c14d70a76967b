use crate::{SampledEntry, UsageEntry};

/// Sibling entries scaled to sum to their parent's authoritative total.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub entries: Vec<UsageEntry>,
    /// `total / Σ raw`; `None` when the level could not be scaled
    pub scale_factor: Option<f64>,
    pub raw_sum: u64,
}

impl Reconciled {
    #[inline]
    pub fn is_estimatable(&self) -> bool {
        self.scale_factor.is_some()
    }

    pub fn scaled_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.scaled_bytes).sum()
    }
}

/// Scale raw sibling sizes so they sum to `total`.
///
/// A zero raw sum or a zero total leaves every entry at 0 and marks the
/// level unestimatable instead of dividing by zero.
pub fn reconcile(entries: Vec<SampledEntry>, total: f64) -> Reconciled {
    let raw_sum: u64 = entries
        .iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.raw_bytes));
    let factor = if raw_sum == 0 || !(total > 0.0) {
        None
    } else {
        Some(total / raw_sum as f64)
    };
    let entries = entries
        .into_iter()
        .map(|e| UsageEntry {
            scaled_bytes: factor.map_or(0.0, |f| e.raw_bytes as f64 * f),
            path: e.path,
            raw_bytes: e.raw_bytes,
        })
        .collect();
    Reconciled {
        entries,
        scale_factor: factor,
        raw_sum,
    }
}
