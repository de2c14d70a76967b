use std::time::Duration;

use crate::{
    constants::budget::{
        DEFAULT_MAX_DEPTH, NESTED_MIN_SIGNIFICANT_BYTES, NESTED_TIMEOUT, NESTED_TOP_N,
        ROOT_MIN_SIGNIFICANT_BYTES, ROOT_TIMEOUT, ROOT_TOP_N,
    },
    filters::ExcludeSet,
};

/// Per-level limits: how many entries to show, what is significant, and how
/// long a single sampler call may take.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelBudget {
    pub top_n: usize,
    pub min_significant_bytes: f64,
    pub per_call_timeout: Duration,
}

impl LevelBudget {
    pub fn root() -> Self {
        Self {
            top_n: ROOT_TOP_N,
            min_significant_bytes: ROOT_MIN_SIGNIFICANT_BYTES,
            per_call_timeout: env_secs("SPACETALLY_TIMEOUT_SECS").unwrap_or(ROOT_TIMEOUT),
        }
    }

    pub fn nested() -> Self {
        Self {
            top_n: NESTED_TOP_N,
            min_significant_bytes: NESTED_MIN_SIGNIFICANT_BYTES,
            per_call_timeout: env_secs("SPACETALLY_NESTED_TIMEOUT_SECS")
                .unwrap_or(NESTED_TIMEOUT),
        }
    }
}

/// Per-invocation configuration for a breakdown.
#[derive(Clone, Debug)]
pub struct Budget {
    /// Listing levels, root listing included (1 = root only)
    pub max_depth: u32,
    /// Level limits indexed from the root; the last one repeats below.
    pub levels: Vec<LevelBudget>,
    /// Exclusions applied when sampling the root
    pub exclude: ExcludeSet,
    /// Also apply `exclude` at nested levels
    pub exclude_nested: bool,
    /// List files as well as directories
    pub all_entries: bool,
    /// Accept exit status 1 from the sampler when its output parses
    pub tolerate_partial: bool,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_depth: std::env::var("SPACETALLY_MAX_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DEPTH)
                .max(1),
            levels: vec![LevelBudget::root(), LevelBudget::nested()],
            exclude: ExcludeSet::default(),
            exclude_nested: false,
            all_entries: false,
            tolerate_partial: false,
        }
    }
}

impl Budget {
    /// Same limits at every level.
    pub fn uniform(max_depth: u32, level: LevelBudget) -> Self {
        Self {
            max_depth: max_depth.max(1),
            levels: vec![level],
            ..Self::default()
        }
    }

    /// Limits for a 1-based listing level.
    pub fn level(&self, level: u32) -> LevelBudget {
        let idx = (level.max(1) - 1) as usize;
        self.levels
            .get(idx)
            .or_else(|| self.levels.last())
            .copied()
            .unwrap_or_else(LevelBudget::nested)
    }

    /// Exclusions in effect at a 1-based listing level.
    pub fn exclude_at(&self, level: u32) -> Option<&ExcludeSet> {
        if self.exclude.is_empty() || (level > 1 && !self.exclude_nested) {
            None
        } else {
            Some(&self.exclude)
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(Duration::from_secs_f64)
}

// Grouped configuration types for clearer construction and composition
#[derive(Default, Clone, Debug)]
pub struct LevelConfig {
    pub top_n: Option<usize>,
    pub min_significant_bytes: Option<f64>,
    pub per_call_timeout: Option<Duration>,
}

impl LevelConfig {
    fn apply(&self, base: LevelBudget) -> LevelBudget {
        LevelBudget {
            top_n: self.top_n.unwrap_or(base.top_n),
            min_significant_bytes: self
                .min_significant_bytes
                .unwrap_or(base.min_significant_bytes),
            per_call_timeout: self.per_call_timeout.unwrap_or(base.per_call_timeout),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct ExcludeConfig {
    pub contains: Vec<String>,
    pub regex: Vec<String>,
    pub glob: Vec<String>,
    pub nested: Option<bool>,
}

#[derive(Default, Clone, Debug)]
pub struct SamplerConfig {
    pub all_entries: Option<bool>,
    pub tolerate_partial: Option<bool>,
}

#[derive(Default, Clone, Debug)]
pub struct BudgetBuilder {
    pub max_depth: Option<u32>,
    pub root: LevelConfig,
    pub nested: LevelConfig,
    pub exclude: ExcludeConfig,
    pub sampler: SamplerConfig,
}

impl BudgetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(mut self, v: u32) -> Self {
        self.max_depth = Some(v);
        self
    }
    pub fn with_root(mut self, cfg: LevelConfig) -> Self {
        self.root.top_n = cfg.top_n.or(self.root.top_n);
        self.root.min_significant_bytes = cfg
            .min_significant_bytes
            .or(self.root.min_significant_bytes);
        self.root.per_call_timeout = cfg.per_call_timeout.or(self.root.per_call_timeout);
        self
    }
    pub fn with_nested(mut self, cfg: LevelConfig) -> Self {
        self.nested.top_n = cfg.top_n.or(self.nested.top_n);
        self.nested.min_significant_bytes = cfg
            .min_significant_bytes
            .or(self.nested.min_significant_bytes);
        self.nested.per_call_timeout = cfg.per_call_timeout.or(self.nested.per_call_timeout);
        self
    }
    pub fn with_exclude_contains(mut self, list: impl IntoIterator<Item = String>) -> Self {
        self.exclude.contains = list.into_iter().collect();
        self
    }
    pub fn with_exclude_regex(mut self, list: impl IntoIterator<Item = String>) -> Self {
        self.exclude.regex = list.into_iter().collect();
        self
    }
    pub fn with_exclude_glob(mut self, list: impl IntoIterator<Item = String>) -> Self {
        self.exclude.glob = list.into_iter().collect();
        self
    }
    pub fn exclude_nested(mut self, v: bool) -> Self {
        self.exclude.nested = Some(v);
        self
    }
    pub fn with_sampler(mut self, cfg: SamplerConfig) -> Self {
        self.sampler.all_entries = cfg.all_entries.or(self.sampler.all_entries);
        self.sampler.tolerate_partial = cfg.tolerate_partial.or(self.sampler.tolerate_partial);
        self
    }

    pub fn build(self) -> Budget {
        // Start from default to inherit env overrides
        let mut budget = Budget::default();
        if let Some(v) = self.max_depth {
            budget.max_depth = v.max(1);
        }
        budget.levels = vec![
            self.root.apply(LevelBudget::root()),
            self.nested.apply(LevelBudget::nested()),
        ];
        budget.exclude = ExcludeSet::new(
            self.exclude.contains,
            self.exclude.regex,
            self.exclude.glob,
        );
        if let Some(v) = self.exclude.nested {
            budget.exclude_nested = v;
        }
        if let Some(v) = self.sampler.all_entries {
            budget.all_entries = v;
        }
        if let Some(v) = self.sampler.tolerate_partial {
            budget.tolerate_partial = v;
        }
        budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_level_repeats_below() {
        let budget = BudgetBuilder::new()
            .max_depth(4)
            .with_root(LevelConfig {
                top_n: Some(7),
                ..Default::default()
            })
            .with_nested(LevelConfig {
                top_n: Some(2),
                ..Default::default()
            })
            .build();
        assert_eq!(budget.level(1).top_n, 7);
        assert_eq!(budget.level(2).top_n, 2);
        assert_eq!(budget.level(4).top_n, 2);
    }

    #[test]
    fn zero_depth_is_clamped_to_root_listing() {
        let budget = BudgetBuilder::new().max_depth(0).build();
        assert_eq!(budget.max_depth, 1);
    }

    #[test]
    fn exclusions_apply_to_root_only_by_default() {
        let budget = BudgetBuilder::new()
            .with_exclude_contains(["/mnt/net".to_string()])
            .build();
        assert!(budget.exclude_at(1).is_some());
        assert!(budget.exclude_at(2).is_none());

        let budget = BudgetBuilder::new()
            .with_exclude_contains(["/mnt/net".to_string()])
            .exclude_nested(true)
            .build();
        assert!(budget.exclude_at(2).is_some());
    }
}
