use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::Instant,
};

use serde::Serialize;

use crate::{
    error_handling::EstimateError, rank::rank_entries, reconcile::reconcile, Budget,
    EstimateSession, SampleRequest, UsageEntry, UsageSampler,
};

/// Outcome of one node of the breakdown tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeStatus {
    Estimated,
    /// Sampled, but there was nothing to scale against.
    Unestimatable,
    /// The sampler failed or found nothing; the branch is omitted.
    Absent { reason: String },
}

/// A shown entry and, when it was descended into, its own breakdown.
#[derive(Clone, Debug, Serialize)]
pub struct RankedEntry {
    #[serde(flatten)]
    pub entry: UsageEntry,
    pub children: Option<Box<BreakdownResult>>,
}

/// One level of the breakdown; owns its children exclusively.
#[derive(Clone, Debug, Serialize)]
pub struct BreakdownResult {
    pub path: PathBuf,
    /// 1-based listing level (the root listing is 1)
    pub level: u32,
    /// Authoritative total this level was reconciled against
    pub total: f64,
    pub status: NodeStatus,
    pub scale_factor: Option<f64>,
    pub entries: Vec<RankedEntry>,
    pub other: Option<f64>,
    pub dropped: usize,
    pub truncated: usize,
}

impl BreakdownResult {
    fn absent(path: &Path, level: u32, total: f64, reason: String) -> Self {
        Self {
            path: path.to_path_buf(),
            level,
            total,
            status: NodeStatus::Absent { reason },
            scale_factor: None,
            entries: Vec::new(),
            other: None,
            dropped: 0,
            truncated: 0,
        }
    }

    #[inline]
    pub fn is_estimated(&self) -> bool {
        self.status == NodeStatus::Estimated
    }

    pub fn shown_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.entry.scaled_bytes).sum()
    }

    /// Deepest listing level present in this subtree.
    pub fn depth(&self) -> u32 {
        self.entries
            .iter()
            .filter_map(|e| e.children.as_deref())
            .map(BreakdownResult::depth)
            .max()
            .unwrap_or(self.level)
    }

    /// Shown entries in report order, paired with their level.
    pub fn flatten(&self) -> Vec<(u32, &UsageEntry)> {
        let mut out = Vec::new();
        fn walk<'a>(node: &'a BreakdownResult, out: &mut Vec<(u32, &'a UsageEntry)>) {
            for e in &node.entries {
                out.push((node.level, &e.entry));
                if let Some(child) = e.children.as_deref() {
                    walk(child, out);
                }
            }
        }
        walk(self, &mut out);
        out
    }
}

/// Attribute `total` bytes under `root` to its largest consumers.
///
/// Runs sample → reconcile → rank at the root, then repeats one level down
/// for every shown entry (using the entry's scaled size as the child total)
/// until `budget.max_depth`. Sampler calls are strictly sequential and every
/// failure is confined to the subtree it happened in.
pub fn estimate_breakdown(
    root: &Path,
    total: u64,
    budget: &Budget,
    sampler: &dyn UsageSampler,
    session: &mut EstimateSession,
) -> BreakdownResult {
    let t0 = Instant::now();
    let result = descend(root, total as f64, 1, budget, sampler, session);
    log::info!(
        "breakdown of {} done in {:.3}s: depth={} sampler_calls={} errors={}",
        root.display(),
        t0.elapsed().as_secs_f64(),
        result.depth(),
        session.sampler_calls(),
        session.error_count()
    );
    result
}

fn descend(
    path: &Path,
    total: f64,
    level: u32,
    budget: &Budget,
    sampler: &dyn UsageSampler,
    session: &mut EstimateSession,
) -> BreakdownResult {
    let lb = budget.level(level);
    let exclude = budget.exclude_at(level);

    // Sampling
    let mut req = SampleRequest::new(path, lb.per_call_timeout);
    req.all_entries = budget.all_entries;
    req.tolerate_partial = budget.tolerate_partial;
    if let Some(ex) = exclude {
        req.exclude = ex.sampler_patterns().map(OsStr::to_os_string).collect();
    }
    let t0 = Instant::now();
    let sample = match sampler.sample(&req) {
        Ok(s) => s,
        Err(e) => {
            session.record_error(level, &e);
            return BreakdownResult::absent(path, level, total, e.to_string());
        }
    };
    let mut entries = sample.entries;
    if let Some(ex) = exclude {
        entries.retain(|e| {
            let hit = ex.is_excluded(&e.path);
            if hit {
                session.record_excluded(&e.path, level);
            }
            !hit
        });
    }
    let raw_sum = entries
        .iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.raw_bytes));
    session.record_sample(
        path,
        level,
        entries.len(),
        raw_sum,
        sample.aggregate,
        t0.elapsed(),
    );
    if entries.is_empty() {
        log::debug!("{}: no entries sampled", path.display());
        return BreakdownResult::absent(path, level, total, "no entries".into());
    }

    // Reconciling
    let rec = reconcile(entries, total);
    if !rec.is_estimatable() {
        session.record_error(
            level,
            &EstimateError::DegenerateScale {
                path: path.to_path_buf(),
            },
        );
        let kept = rec.entries.len().min(lb.top_n);
        let truncated = rec.entries.len() - kept;
        return BreakdownResult {
            path: path.to_path_buf(),
            level,
            total,
            status: NodeStatus::Unestimatable,
            scale_factor: None,
            entries: rec
                .entries
                .into_iter()
                .take(kept)
                .map(|entry| RankedEntry {
                    entry,
                    children: None,
                })
                .collect(),
            other: None,
            dropped: 0,
            truncated,
        };
    }
    log::debug!(
        "{}: level={} raw_sum={} total={:.0} factor={:.4}",
        path.display(),
        level,
        rec.raw_sum,
        total,
        rec.scale_factor.unwrap_or(0.0)
    );

    // Filtering
    let ranked = rank_entries(rec.entries, total, &lb);

    // Recursing
    let mut shown = Vec::with_capacity(ranked.shown.len());
    for entry in ranked.shown {
        let children = if level < budget.max_depth {
            Some(Box::new(descend(
                &entry.path,
                entry.scaled_bytes,
                level + 1,
                budget,
                sampler,
                session,
            )))
        } else {
            None
        };
        shown.push(RankedEntry { entry, children });
    }
    BreakdownResult {
        path: path.to_path_buf(),
        level,
        total,
        status: NodeStatus::Estimated,
        scale_factor: rec.scale_factor,
        entries: shown,
        other: ranked.other,
        dropped: ranked.dropped,
        truncated: ranked.truncated,
    }
}
