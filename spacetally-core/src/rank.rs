use crate::{LevelBudget, UsageEntry};

/// Entries kept for display at one level, plus the remainder bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranked {
    /// Descending by scaled size, at most `top_n`
    pub shown: Vec<UsageEntry>,
    /// `total - Σ shown`, present only when it is itself significant
    pub other: Option<f64>,
    /// Entries below the significance threshold
    pub dropped: usize,
    /// Significant entries cut by the `top_n` bound
    pub truncated: usize,
}

impl Ranked {
    pub fn shown_sum(&self) -> f64 {
        self.shown.iter().map(|e| e.scaled_bytes).sum()
    }
}

/// Filter, rank, and truncate reconciled siblings against `total`.
pub fn rank_entries(entries: Vec<UsageEntry>, total: f64, level: &LevelBudget) -> Ranked {
    let before = entries.len();
    let mut kept: Vec<UsageEntry> = entries
        .into_iter()
        .filter(|e| e.scaled_bytes >= level.min_significant_bytes)
        .collect();
    let dropped = before - kept.len();
    // Stable: equal sizes keep enumeration order.
    kept.sort_by(|a, b| b.scaled_bytes.total_cmp(&a.scaled_bytes));
    let truncated = kept.len().saturating_sub(level.top_n);
    kept.truncate(level.top_n);

    let shown_sum: f64 = kept.iter().map(|e| e.scaled_bytes).sum();
    let rest = (total - shown_sum).max(0.0);
    let other = (rest > 0.0 && rest >= level.min_significant_bytes).then_some(rest);
    Ranked {
        shown: kept,
        other,
        dropped,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn level(top_n: usize, min: f64) -> LevelBudget {
        LevelBudget {
            top_n,
            min_significant_bytes: min,
            per_call_timeout: Duration::from_secs(1),
        }
    }

    fn scaled(sizes: &[f64]) -> Vec<UsageEntry> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| UsageEntry {
                path: format!("/r/e{i}").into(),
                raw_bytes: s as u64,
                scaled_bytes: s,
            })
            .collect()
    }

    #[test]
    fn top_two_with_significant_other() {
        let r = rank_entries(scaled(&[60.0, 45.0, 30.0, 15.0]), 150.0, &level(2, 20.0));
        let shown: Vec<f64> = r.shown.iter().map(|e| e.scaled_bytes).collect();
        assert_eq!(shown, vec![60.0, 45.0]);
        assert_eq!(r.other, Some(45.0));
        assert_eq!(r.dropped, 1);
        assert_eq!(r.truncated, 1);
        assert_eq!(r.shown_sum() + r.other.unwrap(), 150.0);
    }

    #[test]
    fn sorts_descending_and_keeps_tie_order() {
        let r = rank_entries(scaled(&[10.0, 30.0, 30.0, 20.0]), 90.0, &level(10, 0.0));
        let names: Vec<_> = r.shown.iter().map(|e| e.path.to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["/r/e1", "/r/e2", "/r/e3", "/r/e0"]);
        assert_eq!(r.other, None);
    }

    #[test]
    fn insignificant_other_is_omitted() {
        let r = rank_entries(scaled(&[95.0, 5.0]), 100.0, &level(5, 10.0));
        assert_eq!(r.shown.len(), 1);
        assert_eq!(r.other, None);
        assert_eq!(r.dropped, 1);
    }

    #[test]
    fn threshold_is_inclusive() {
        let r = rank_entries(scaled(&[20.0, 19.999]), 39.999, &level(5, 20.0));
        assert_eq!(r.shown.len(), 1);
        assert_eq!(r.shown[0].scaled_bytes, 20.0);
    }

    #[test]
    fn all_zero_entries_show_nothing() {
        let r = rank_entries(scaled(&[0.0, 0.0]), 0.0, &level(5, 1.0));
        assert!(r.shown.is_empty());
        assert_eq!(r.other, None);
    }
}
