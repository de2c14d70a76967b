#![cfg(unix)]

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use spacetally_core::{
    estimate_breakdown, BudgetBuilder, DuSampler, EstimateError, EstimateSession, LevelConfig,
    SampleRequest, UsageSampler,
};

/// Writes a POSIX sh script standing in for `du`; it runs through `sh` so
/// nothing needs the executable bit.
fn fake_du(dir: &Path, body: &str) -> DuSampler {
    let script = dir.join("fake_du.sh");
    fs::write(&script, format!("for last; do :; done\n{body}\n")).unwrap();
    DuSampler::with_command("sh", [script])
}

fn target(tmp: &tempfile::TempDir) -> PathBuf {
    let t = tmp.path().join("target");
    fs::create_dir_all(&t).unwrap();
    t
}

#[test]
fn parses_child_lines_and_aggregate() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(
        tmp.path(),
        r#"printf '40\t%s/a\n30\t%s/b\n75\t%s\n' "$last" "$last" "$last""#,
    );
    let s = du
        .sample(&SampleRequest::new(&root, Duration::from_secs(5)))
        .unwrap();
    assert_eq!(s.aggregate, Some(75));
    let got: Vec<(PathBuf, u64)> = s.entries.into_iter().map(|e| (e.path, e.raw_bytes)).collect();
    assert_eq!(got, vec![(root.join("a"), 40), (root.join("b"), 30)]);
}

#[test]
fn forwards_depth_bytes_exclusions_and_all_flag() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let args_file = tmp.path().join("args.txt");
    let du = fake_du(
        tmp.path(),
        &format!(
            r#"printf '%s\n' "$@" > '{}'
printf '1\t%s\n' "$last""#,
            args_file.display()
        ),
    );
    let mut req = SampleRequest::new(&root, Duration::from_secs(5));
    req.exclude = vec!["/mnt/net".into()];
    req.all_entries = true;
    du.sample(&req).unwrap();
    let args = fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        vec![
            "-b",
            "-d",
            "1",
            "-a",
            "--exclude=/mnt/net",
            root.to_str().unwrap()
        ]
    );
}

#[test]
fn slow_sampler_is_abandoned_at_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(tmp.path(), "sleep 5");
    let t0 = Instant::now();
    let err = du
        .sample(&SampleRequest::new(&root, Duration::from_millis(200)))
        .unwrap_err();
    assert!(matches!(err, EstimateError::Timeout { .. }));
    assert!(t0.elapsed() < Duration::from_secs(4));
}

#[test]
fn non_zero_exit_is_unavailable_unless_partial_is_tolerated() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(
        tmp.path(),
        r#"printf '8\t%s/a\n8\t%s\n' "$last" "$last"
exit 1"#,
    );
    let mut req = SampleRequest::new(&root, Duration::from_secs(5));
    let err = du.sample(&req).unwrap_err();
    assert!(matches!(err, EstimateError::SourceUnavailable { .. }));

    req.tolerate_partial = true;
    let s = du.sample(&req).unwrap();
    assert_eq!(s.entries.len(), 1);
}

#[test]
fn garbage_output_is_parse_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(tmp.path(), "echo 'permission denied'");
    let err = du
        .sample(&SampleRequest::new(&root, Duration::from_secs(5)))
        .unwrap_err();
    assert!(matches!(err, EstimateError::ParseFailure { .. }));
}

#[test]
fn missing_program_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = DuSampler::with_command("/nonexistent/du-binary", Vec::<String>::new());
    let err = du
        .sample(&SampleRequest::new(&root, Duration::from_secs(1)))
        .unwrap_err();
    assert!(matches!(err, EstimateError::SourceUnavailable { .. }));
}

#[test]
fn total_reads_summary_line() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(tmp.path(), r#"printf '123456\t%s\n' "$last""#);
    assert_eq!(du.total(&root, Duration::from_secs(5)).unwrap(), 123456);
}

#[test]
fn failing_sampler_never_aborts_breakdown() {
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let du = fake_du(tmp.path(), "exit 2");
    let budget = BudgetBuilder::new()
        .with_root(LevelConfig {
            per_call_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        })
        .build();
    let mut session = EstimateSession::new();
    let res = estimate_breakdown(&root, 1_000, &budget, &du, &mut session);
    assert!(res.entries.is_empty());
    assert_eq!(session.error_count(), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn real_du_lists_immediate_children() {
    let ok = std::process::Command::new("du")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !ok {
        eprintln!("skip: GNU du not available");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    fs::create_dir_all(root.join("big/nested")).unwrap();
    fs::create_dir_all(root.join("small")).unwrap();
    fs::write(root.join("big/nested/blob"), vec![0u8; 64 * 1024]).unwrap();
    fs::write(root.join("small/f"), vec![0u8; 1024]).unwrap();

    let du = DuSampler::with_command("du", Vec::<String>::new());
    let s = du
        .sample(&SampleRequest::new(&root, Duration::from_secs(30)))
        .unwrap();
    assert_eq!(s.entries.len(), 2, "only immediate children: {:?}", s.entries);
    let big = s.entries.iter().find(|e| e.path == root.join("big")).unwrap();
    let small = s.entries.iter().find(|e| e.path == root.join("small")).unwrap();
    assert!(big.raw_bytes >= 64 * 1024);
    assert!(small.raw_bytes >= 1024);
    assert!(s.aggregate.unwrap() >= big.raw_bytes + small.raw_bytes);
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_child_is_descended_into() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    use spacetally_core::NodeStatus;

    let ok = std::process::Command::new("du")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !ok {
        eprintln!("skip: GNU du not available");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = target(&tmp);
    let odd = root.join(OsStr::from_bytes(b"caf\xff"));
    if fs::create_dir_all(odd.join("inner")).is_err() {
        eprintln!("skip: filesystem rejects non-UTF-8 names");
        return;
    }
    fs::write(odd.join("inner/blob"), vec![0u8; 32 * 1024]).unwrap();

    let du = DuSampler::with_command("du", Vec::<String>::new());
    let budget = BudgetBuilder::new()
        .max_depth(2)
        .with_root(LevelConfig {
            min_significant_bytes: Some(0.0),
            per_call_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        })
        .with_nested(LevelConfig {
            min_significant_bytes: Some(0.0),
            per_call_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        })
        .build();
    let mut session = EstimateSession::new();
    let res = estimate_breakdown(&root, 1_000_000, &budget, &du, &mut session);
    let entry = res
        .entries
        .iter()
        .find(|e| e.entry.path == odd)
        .expect("non-UTF-8 directory listed under its real name");
    let child = entry.children.as_deref().expect("descended");
    assert_eq!(child.status, NodeStatus::Estimated);
    assert_eq!(child.entries[0].entry.path, odd.join("inner"));
    assert_eq!(session.error_count(), 0);
}
