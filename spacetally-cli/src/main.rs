use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser};
use humansize::{format_size, DECIMAL};
use serde::Deserialize;
use spacetally_core::{
    constants::units::GB,
    estimate_breakdown,
    report::{render_text, render_volume},
    volume::{quota_usage, volume_usage, VolumeUsage},
    BreakdownResult, BudgetBuilder, DuSampler, EstimateSession, LevelConfig, SamplerConfig,
    SessionEvent,
};

/// Capacity assumed for `--volume PATH` without `=GB`.
const DEFAULT_VOLUME_CAPACITY_GB: f64 = 100.0;

#[derive(Parser, Debug)]
#[command(
    name = "spacetally",
    version,
    about = "Attribute a filesystem's used space to its largest directories",
    long_about = "Samples directory sizes with `du`, scales them so each level sums to the \
    filesystem's used bytes, and prints the largest consumers a few levels deep.",
    after_help = "Examples:\n\
      Root filesystem, default budget\n\
        spacetally /\n\
      Report a 100 GB network mount separately\n\
        spacetally / --volume /mnt/netvol=100\n\
      Three levels, wider listing, export JSON\n\
        spacetally /home --max-depth 3 --top 10 --json report.json\n\
    "
)]
struct Args {
    /// Directory to break down
    #[arg(value_name = "PATH", default_value = "/")]
    path: PathBuf,

    /// Listing levels, root included (1 = root only)
    #[arg(long = "max-depth")]
    max_depth: Option<u32>,

    /// Entries shown at the root level
    #[arg(long = "top")]
    top: Option<usize>,

    /// Entries shown at nested levels
    #[arg(long = "nested-top")]
    nested_top: Option<usize>,

    /// Root significance threshold in GB
    #[arg(long = "min-gb")]
    min_gb: Option<f64>,

    /// Nested significance threshold in GB
    #[arg(long = "nested-min-gb")]
    nested_min_gb: Option<f64>,

    /// Sampler timeout at the root, seconds
    #[arg(long = "timeout-secs")]
    timeout_secs: Option<f64>,

    /// Sampler timeout below the root, seconds
    #[arg(long = "nested-timeout-secs")]
    nested_timeout_secs: Option<f64>,

    /// Comma-separated exclude substrings
    #[arg(long)]
    exclude: Option<String>,

    /// Read exclude patterns from file(s); `re:` and `glob:` prefixes select the matcher
    #[arg(long = "exclude-from", value_name = "FILE")]
    exclude_from: Vec<PathBuf>,

    /// Apply exclusions below the root as well
    #[arg(long = "exclude-nested", action = ArgAction::SetTrue)]
    exclude_nested: bool,

    /// Separately mounted volume with a fixed allocation, PATH[=CAPACITY_GB]
    #[arg(long = "volume", value_name = "PATH[=GB]")]
    volumes: Vec<String>,

    /// Use this many bytes as the root total instead of the filesystem's used bytes
    #[arg(long = "total", value_name = "BYTES")]
    total: Option<u64>,

    /// Include files as well as directories in each listing
    #[arg(long = "all", short = 'a', action = ArgAction::SetTrue)]
    all: bool,

    /// Accept partial sampler output (exit status 1, e.g. permission denied)
    #[arg(long = "partial", action = ArgAction::SetTrue)]
    partial: bool,

    /// Sampler program (defaults to SPACETALLY_DU or `du`)
    #[arg(long = "du", value_name = "PROGRAM")]
    du: Option<PathBuf>,

    /// Write the breakdown tree as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write shown entries as CSV (level,path,raw_bytes,scaled_bytes)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print a generation timestamp header
    #[arg(long = "time", action = ArgAction::SetTrue)]
    time: bool,

    /// JSON config file (default: spacetally-config.json next to the executable)
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging and a sampling summary on stderr
    #[arg(long = "verbose", short = 'v', action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    max_depth: Option<u32>,
    top: Option<usize>,
    nested_top: Option<usize>,
    min_gb: Option<f64>,
    nested_min_gb: Option<f64>,
    timeout_secs: Option<f64>,
    nested_timeout_secs: Option<f64>,
    exclude: Vec<String>,
    exclude_nested: Option<bool>,
    volumes: Vec<String>,
    du: Option<PathBuf>,
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// An explicit `--config` must load; the implicit one is best effort.
fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        let text = std::fs::read_to_string(p)
            .with_context(|| format!("reading config {}", p.display()))?;
        return serde_json::from_str(&text).with_context(|| format!("parsing config {}", p.display()));
    }
    let path = exe_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spacetally-config.json");
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|t| serde_json::from_str(&t).map_err(anyhow::Error::from))
    {
        Ok(cfg) => {
            log::debug!("loaded config: {}", path.display());
            Ok(cfg)
        }
        Err(e) => {
            log::warn!("ignoring config {}: {e}", path.display());
            Ok(AppConfig::default())
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct ExcludeLists {
    contains: Vec<String>,
    regex: Vec<String>,
    glob: Vec<String>,
}

impl ExcludeLists {
    fn push_line(&mut self, line: &str) {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            return;
        }
        if let Some(rest) = s.strip_prefix("re:") {
            self.regex.push(rest.trim().to_string());
        } else if let Some(rest) = s.strip_prefix("glob:") {
            self.glob.push(rest.trim().to_string());
        } else {
            self.contains.push(s.to_string());
        }
    }
}

fn collect_excludes(arg: Option<&str>, cfg: &[String], files: &[PathBuf]) -> Result<ExcludeLists> {
    let mut lists = ExcludeLists::default();
    for s in arg.unwrap_or("").split(',').chain(cfg.iter().map(String::as_str)) {
        lists.push_line(s);
    }
    for f in files {
        let text = std::fs::read_to_string(f)
            .with_context(|| format!("reading exclude file {}", f.display()))?;
        for line in text.lines() {
            lists.push_line(line);
        }
    }
    Ok(lists)
}

#[derive(Debug, PartialEq)]
struct VolumeArg {
    path: PathBuf,
    capacity_bytes: u64,
}

fn parse_volume(s: &str) -> Result<VolumeArg> {
    let (p, gb) = match s.rsplit_once('=') {
        Some((p, gb)) => {
            let gb: f64 = gb
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid volume capacity in {s:?}"))?;
            if !gb.is_finite() || gb <= 0.0 {
                bail!("volume capacity must be positive in {s:?}");
            }
            (p, gb)
        }
        None => (s, DEFAULT_VOLUME_CAPACITY_GB),
    };
    if p.is_empty() {
        bail!("empty volume path in {s:?}");
    }
    Ok(VolumeArg {
        path: PathBuf::from(p),
        capacity_bytes: (gb * GB) as u64,
    })
}

fn secs(v: Option<f64>) -> Option<Duration> {
    v.filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(feature = "time-format")]
fn timestamp() -> Option<String> {
    Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(not(feature = "time-format"))]
fn timestamp() -> Option<String> {
    None
}

fn write_csv(path: &Path, result: &BreakdownResult) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["level", "path", "raw_bytes", "scaled_bytes"])?;
    for (level, e) in result.flatten() {
        wtr.write_record([
            level.to_string().as_str(),
            e.path.to_string_lossy().as_ref(),
            &e.raw_bytes.to_string(),
            &format!("{:.0}", e.scaled_bytes),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_json(
    path: &Path,
    storage: Option<&VolumeUsage>,
    volumes: &[(PathBuf, Option<VolumeUsage>)],
    result: &BreakdownResult,
    session: &EstimateSession,
) -> Result<()> {
    let mut file = File::create(path)?;
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "storage": storage,
        "volumes": volumes
            .iter()
            .map(|(p, v)| serde_json::json!({"path": p, "usage": v}))
            .collect::<Vec<_>>(),
        "breakdown": result,
        "events": session.events(),
    }))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "warn" }),
    )
    .init();
    #[cfg(feature = "debug-eyre")]
    {
        let _ = color_eyre::install();
    }
    let cfg = load_config(args.config.as_deref())?;

    let sampler = match args.du.as_ref().or(cfg.du.as_ref()) {
        Some(program) => DuSampler::with_command(program, Vec::<String>::new()),
        None => DuSampler::new(),
    };

    let excludes = collect_excludes(args.exclude.as_deref(), &cfg.exclude, &args.exclude_from)?;
    let volumes = args
        .volumes
        .iter()
        .chain(cfg.volumes.iter())
        .map(|s| parse_volume(s))
        .collect::<Result<Vec<_>>>()?;

    let mut budget = BudgetBuilder::new()
        .with_root(LevelConfig {
            top_n: args.top.or(cfg.top),
            min_significant_bytes: args.min_gb.or(cfg.min_gb).map(|g| g * GB),
            per_call_timeout: secs(args.timeout_secs.or(cfg.timeout_secs)),
        })
        .with_nested(LevelConfig {
            top_n: args.nested_top.or(cfg.nested_top),
            min_significant_bytes: args.nested_min_gb.or(cfg.nested_min_gb).map(|g| g * GB),
            per_call_timeout: secs(args.nested_timeout_secs.or(cfg.nested_timeout_secs)),
        })
        .with_exclude_contains(excludes.contains)
        .with_exclude_regex(excludes.regex)
        .with_exclude_glob(excludes.glob)
        .exclude_nested(args.exclude_nested || cfg.exclude_nested.unwrap_or(false))
        .with_sampler(SamplerConfig {
            all_entries: Some(args.all),
            tolerate_partial: Some(args.partial),
        });
    if let Some(d) = args.max_depth.or(cfg.max_depth) {
        budget = budget.max_depth(d);
    }
    let mut budget = budget.build();
    // separately reported volumes must not be counted again under the root
    for v in &volumes {
        budget.exclude = std::mem::take(&mut budget.exclude).with_path(&v.path);
    }

    if args.time {
        match timestamp() {
            Some(ts) => println!("Generated: {ts}"),
            None => log::warn!("--time requires the time-format feature"),
        }
    }

    let root_label = format!("Storage ({})", args.path.display());
    let storage = match volume_usage(&args.path) {
        Ok(v) => {
            println!("{}", render_volume(&root_label, &v));
            Some(v)
        }
        Err(e) => {
            log::warn!("{e:#}");
            println!("{root_label}: Unable to read usage");
            None
        }
    };

    let mut volume_reports = Vec::with_capacity(volumes.len());
    for v in &volumes {
        let label = format!("Volume ({})", v.path.display());
        let timeout = budget.level(1).per_call_timeout;
        match quota_usage(&sampler, &v.path, v.capacity_bytes, timeout) {
            Ok(u) => {
                println!("{}", render_volume(&label, &u));
                volume_reports.push((v.path.clone(), Some(u)));
            }
            Err(e) => {
                log::warn!("{e}");
                println!("{label}: Unable to read usage");
                volume_reports.push((v.path.clone(), None));
            }
        }
    }

    let total = match (args.total, storage.as_ref()) {
        (Some(t), _) => t,
        (None, Some(v)) => v.used_bytes,
        (None, None) => {
            log::warn!("no authoritative total for {}", args.path.display());
            0
        }
    };
    println!();
    let mut session = EstimateSession::new();
    let result = estimate_breakdown(&args.path, total, &budget, &sampler, &mut session);
    print!("{}", render_text(&result));

    if args.verbose {
        let raw: u64 = session
            .events()
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Sampled { level: 1, aggregate, .. } => *aggregate,
                _ => None,
            })
            .sum();
        eprintln!(
            "sampler calls: {} | errors: {} | root total: {} | du aggregate at root: {}",
            session.sampler_calls(),
            session.error_count(),
            format_size(total, DECIMAL),
            format_size(raw, DECIMAL)
        );
    }

    if let Some(p) = &args.csv {
        write_csv(p, &result).with_context(|| format!("writing CSV {}", p.display()))?;
        println!("wrote CSV: {}", p.display());
    }
    if let Some(p) = &args.json {
        write_json(p, storage.as_ref(), &volume_reports, &result, &session)
            .with_context(|| format!("writing JSON {}", p.display()))?;
        println!("wrote JSON: {}", p.display());
    }
    Ok(())
}
