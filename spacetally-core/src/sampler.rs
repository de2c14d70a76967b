use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use crate::{
    constants::sampler::{DEFAULT_PROGRAM, POLL_INTERVAL},
    error_handling::{EstimateError, EstimateResult},
    SampledEntry,
};

/// One immediate-children enumeration request.
#[derive(Clone, Debug)]
pub struct SampleRequest<'a> {
    pub path: &'a Path,
    pub timeout: Duration,
    /// Patterns the enumeration tool should skip
    pub exclude: Vec<OsString>,
    /// List files as well as directories
    pub all_entries: bool,
    pub tolerate_partial: bool,
}

impl<'a> SampleRequest<'a> {
    pub fn new(path: &'a Path, timeout: Duration) -> Self {
        Self {
            path,
            timeout,
            exclude: Vec::new(),
            all_entries: false,
            tolerate_partial: false,
        }
    }
}

/// Raw sizes of a directory's immediate children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    pub entries: Vec<SampledEntry>,
    /// The tool's own total for the queried path, when it printed one
    pub aggregate: Option<u64>,
}

/// Directory-size enumeration capability the engine is built on.
/// The default implementation runs `du`; tests supply doubles.
pub trait UsageSampler {
    /// Raw sizes of the immediate children of `req.path`.
    fn sample(&self, req: &SampleRequest<'_>) -> EstimateResult<Sample>;

    /// Raw size of `path` as a whole.
    fn total(&self, path: &Path, timeout: Duration) -> EstimateResult<u64>;
}

/// Sampler backed by an external `du` process.
#[derive(Clone, Debug)]
pub struct DuSampler {
    program: OsString,
    base_args: Vec<OsString>,
}

impl Default for DuSampler {
    fn default() -> Self {
        let program = std::env::var_os("SPACETALLY_DU").unwrap_or_else(|| DEFAULT_PROGRAM.into());
        Self {
            program,
            base_args: Vec::new(),
        }
    }
}

impl DuSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `program base_args... <du flags> PATH` instead of plain `du`.
    pub fn with_command(
        program: impl Into<OsString>,
        base_args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            program: program.into(),
            base_args: base_args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        cmd
    }

    fn check_dir(path: &Path) -> EstimateResult<()> {
        match std::fs::metadata(path) {
            Ok(md) if md.is_dir() => Ok(()),
            Ok(_) => Err(EstimateError::unavailable(path, "not a directory")),
            Err(e) => Err(EstimateError::unavailable(path, e)),
        }
    }
}

impl UsageSampler for DuSampler {
    fn sample(&self, req: &SampleRequest<'_>) -> EstimateResult<Sample> {
        Self::check_dir(req.path)?;
        let mut cmd = self.command();
        cmd.arg("-b").arg("-d").arg("1");
        if req.all_entries {
            cmd.arg("-a");
        }
        for pat in &req.exclude {
            let mut arg = OsString::from("--exclude=");
            arg.push(pat);
            cmd.arg(arg);
        }
        cmd.arg(req.path);
        let out = run_with_timeout(cmd, req.path, req.timeout)?;
        let partial_ok = req.tolerate_partial && out.status.code() == Some(1);
        if !out.status.success() && !partial_ok {
            return Err(EstimateError::unavailable(
                req.path,
                format!("sampler exited with {}", out.status),
            ));
        }
        parse_du_output(req.path, &out.stdout)
    }

    fn total(&self, path: &Path, timeout: Duration) -> EstimateResult<u64> {
        Self::check_dir(path)?;
        let mut cmd = self.command();
        cmd.arg("-s").arg("-b").arg(path);
        let out = run_with_timeout(cmd, path, timeout)?;
        if !out.status.success() {
            return Err(EstimateError::unavailable(
                path,
                format!("sampler exited with {}", out.status),
            ));
        }
        let line = lines(&out.stdout).next().unwrap_or_default();
        let (size, _) = split_line(line).ok_or_else(|| EstimateError::ParseFailure {
            path: path.to_path_buf(),
            line: String::from_utf8_lossy(line).into_owned(),
        })?;
        Ok(size)
    }
}

struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
}

/// Kill and reap, so no zombie outlives the request.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Spawn `cmd` and wait at most `timeout`; the child is killed on expiry.
fn run_with_timeout(mut cmd: Command, path: &Path, timeout: Duration) -> EstimateResult<ProcessOutput> {
    let t0 = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| EstimateError::unavailable(path, format!("cannot run sampler: {e}")))?;
    let Some(mut stdout) = child.stdout.take() else {
        abandon(&mut child);
        return Err(EstimateError::unavailable(path, "sampler stdout not captured"));
    };
    // Drain stdout concurrently so a chatty child cannot block on a full pipe.
    let reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if t0.elapsed() >= timeout {
                    abandon(&mut child);
                    return Err(EstimateError::Timeout {
                        path: path.to_path_buf(),
                        after: timeout,
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                abandon(&mut child);
                return Err(EstimateError::unavailable(path, e));
            }
        }
    };
    let stdout = match reader.join() {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => return Err(EstimateError::unavailable(path, e)),
        Err(_) => return Err(EstimateError::unavailable(path, "stdout reader panicked")),
    };
    log::debug!(
        "sampler {} finished in {:.3}s ({})",
        path.display(),
        t0.elapsed().as_secs_f64(),
        status
    );
    Ok(ProcessOutput { status, stdout })
}

/// Non-blank output lines as raw bytes; paths need not be UTF-8.
fn lines(stdout: &[u8]) -> impl Iterator<Item = &[u8]> {
    stdout
        .split(|&b| b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
        .filter(|l| !l.iter().all(u8::is_ascii_whitespace))
}

#[inline]
fn split_line(line: &[u8]) -> Option<(u64, &[u8])> {
    let idx = memchr::memchr(b'\t', line)?;
    let size = std::str::from_utf8(&line[..idx])
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let p = &line[idx + 1..];
    if p.is_empty() {
        return None;
    }
    Some((size, p))
}

#[cfg(unix)]
fn path_from_bytes(b: &[u8]) -> PathBuf {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};
    PathBuf::from(OsStr::from_bytes(b))
}

#[cfg(not(unix))]
fn path_from_bytes(b: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(b).into_owned())
}

/// Parse `SIZE<TAB>PATH` lines. The line naming `queried` (or, failing
/// that, the final line) is the aggregate and is not returned as an entry.
pub fn parse_du_output(queried: &Path, stdout: &[u8]) -> EstimateResult<Sample> {
    let mut rows: Vec<(u64, PathBuf)> = Vec::new();
    for line in lines(stdout) {
        let (size, p) = split_line(line).ok_or_else(|| EstimateError::ParseFailure {
            path: queried.to_path_buf(),
            line: String::from_utf8_lossy(line).into_owned(),
        })?;
        rows.push((size, path_from_bytes(p)));
    }
    if rows.is_empty() {
        return Err(EstimateError::ParseFailure {
            path: queried.to_path_buf(),
            line: String::new(),
        });
    }
    let agg_idx = rows
        .iter()
        .rposition(|(_, p)| p == queried)
        .unwrap_or(rows.len() - 1);
    let (aggregate, _) = rows.remove(agg_idx);
    Ok(Sample {
        entries: rows
            .into_iter()
            .map(|(raw_bytes, path)| SampledEntry { path, raw_bytes })
            .collect(),
        aggregate: Some(aggregate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_children_and_aggregate() {
        let out = b"4000\t/data/a\n3000\t/data/b\n7100\t/data\n";
        let s = parse_du_output(Path::new("/data"), out).unwrap();
        assert_eq!(s.aggregate, Some(7100));
        assert_eq!(
            s.entries,
            vec![
                SampledEntry {
                    path: "/data/a".into(),
                    raw_bytes: 4000
                },
                SampledEntry {
                    path: "/data/b".into(),
                    raw_bytes: 3000
                },
            ]
        );
    }

    #[test]
    fn aggregate_matched_by_path_with_trailing_slash() {
        let out = b"10\t/data/\n4\t/data/a\n";
        let s = parse_du_output(Path::new("/data"), out).unwrap();
        assert_eq!(s.aggregate, Some(10));
        assert_eq!(s.entries.len(), 1);
        assert_eq!(s.entries[0].raw_bytes, 4);
    }

    #[test]
    fn final_line_is_aggregate_when_no_path_matches() {
        let out = b"4\t./a\n6\t.\n";
        let s = parse_du_output(Path::new("/elsewhere"), out).unwrap();
        assert_eq!(s.aggregate, Some(6));
        assert_eq!(s.entries[0].path, PathBuf::from("./a"));
    }

    #[test]
    fn path_with_tab_keeps_remainder() {
        let out = b"5\t/data/odd\tname\n5\t/data\n";
        let s = parse_du_output(Path::new("/data"), out).unwrap();
        assert_eq!(s.entries[0].path, PathBuf::from("/data/odd\tname"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_child_path_is_kept_verbatim() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let out = b"5\t/data/caf\xff\n7\t/data\n";
        let s = parse_du_output(Path::new("/data"), out).unwrap();
        assert_eq!(s.aggregate, Some(7));
        assert_eq!(
            s.entries[0].path,
            Path::new("/data").join(OsStr::from_bytes(b"caf\xff"))
        );
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let s = parse_du_output(Path::new("/data"), b"4\t/data/a\r\n6\t/data\r\n").unwrap();
        assert_eq!(s.entries[0].path, PathBuf::from("/data/a"));
        assert_eq!(s.aggregate, Some(6));
    }

    #[test]
    fn malformed_output_is_parse_failure() {
        let err = parse_du_output(Path::new("/data"), b"du: cannot read\n").unwrap_err();
        assert!(matches!(err, EstimateError::ParseFailure { .. }));
        let err = parse_du_output(Path::new("/data"), b"").unwrap_err();
        assert!(matches!(err, EstimateError::ParseFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn abandoned_child_is_reaped() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        abandon(&mut child);
        // already waited on: the exit status is cached, not pending
        assert!(matches!(child.try_wait(), Ok(Some(_))));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let s = DuSampler::new();
        let req = SampleRequest::new(Path::new("/definitely/not/here"), Duration::from_secs(1));
        let err = s.sample(&req).unwrap_err();
        assert!(matches!(err, EstimateError::SourceUnavailable { .. }));
    }
}
