/// Decimal size units used by the presenter and the CLI
pub mod units {
    /// 1 GB (decimal)
    pub const GB: f64 = 1_000_000_000.0;

    /// 1 MB (decimal)
    pub const MB: f64 = 1_000_000.0;
}

/// Budget defaults
pub mod budget {
    use std::time::Duration;

    /// Listing levels below the root (root listing is level 1)
    pub const DEFAULT_MAX_DEPTH: u32 = 2;

    /// Entries shown at the root level
    pub const ROOT_TOP_N: usize = 5;

    /// Entries shown at every nested level
    pub const NESTED_TOP_N: usize = 3;

    /// Root-level significance threshold (0.5 GB)
    pub const ROOT_MIN_SIGNIFICANT_BYTES: f64 = 500_000_000.0;

    /// Nested-level significance threshold (0.1 GB)
    pub const NESTED_MIN_SIGNIFICANT_BYTES: f64 = 100_000_000.0;

    /// Sampler timeout at the root
    pub const ROOT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Sampler timeout below the root
    pub const NESTED_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Sampler process constants
pub mod sampler {
    use std::time::Duration;

    /// Default enumeration program
    pub const DEFAULT_PROGRAM: &str = "du";

    /// How often a running child is polled for completion
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
}
