//! Executing sweep plans end to end: artifacts, manifests and failures

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;

use runtime_sweep::axis::SweepAxis;
use runtime_sweep::env::{EnvSettings, NoopEnvironment};
use runtime_sweep::fixture::Fixture;
use runtime_sweep::manifest::{InvocationStatus, SweepManifest};
use runtime_sweep::params::{FlagMapping, ParamMap, Scalar};
use runtime_sweep::plan::{MetricSpec, PlanAxis, SweepPlan};
use runtime_sweep::sink::{load_parquet, Scale};
use runtime_sweep::subject::SubjectRef;
use runtime_sweep::Error;

fn sh_subject(label: &str, script: &str) -> SubjectRef {
    SubjectRef::new(label, "/bin/sh")
        .with_leading_arg("-c")
        .with_leading_arg(script)
        .with_leading_arg("sh")
}

/// Two-axis channel-like plan; `$2` is buffer size, `$4` messages, `$6` pairs.
fn channel_plan(output_dir: PathBuf) -> SweepPlan {
    SweepPlan {
        name: "channel".into(),
        title: "Channel Benchmark".into(),
        metric: MetricSpec::new("time_ms", "Time (ms)"),
        baseline: [
            ("buffer_size".to_string(), Scalar::Int(1024)),
            ("num_messages".to_string(), Scalar::Int(100)),
            ("task_pairs".to_string(), Scalar::Int(1)),
        ]
        .into_iter()
        .collect(),
        axes: vec![
            PlanAxis::new(
                SweepAxis::new("num_messages", [100_i64, 200]).unwrap(),
                "Number of Messages",
                Scale::Categorical,
            ),
            PlanAxis::new(
                SweepAxis::new("task_pairs", [1_i64, 2, 4]).unwrap(),
                "Number of Task Pairs",
                Scale::Categorical,
            ),
        ],
        subjects: vec![
            sh_subject("condy", r#"echo "time_ms: $(( $4 * $6 ))"; echo 'ops: 1'"#),
            sh_subject("asio", r#"echo "time_ms: $(( $4 * $6 * 2 ))""#),
        ],
        flags: FlagMapping::new()
            .valued("buffer_size", "-b")
            .valued("num_messages", "-n")
            .valued("task_pairs", "-p"),
        pairing: None,
        environment: EnvSettings::default(),
        timeout_secs: Some(30),
        output_dir,
        port_base: 12345,
        y_scale: Scale::Log10,
        fixture: None,
    }
}

#[test]
fn test_plan_writes_artifacts_per_axis() {
    let dir = tempfile::tempdir().unwrap();
    let plan = channel_plan(dir.path().join("results"));

    let outcomes = plan.execute_with(NoopEnvironment).unwrap();
    assert_eq!(outcomes.len(), 2);

    let messages = &outcomes[0];
    assert_eq!(messages.axis, "num_messages");
    assert_eq!(messages.table.column("condy").unwrap(), &[100.0, 200.0]);
    assert_eq!(messages.table.column("asio").unwrap(), &[200.0, 400.0]);

    let pairs = &outcomes[1];
    assert_eq!(pairs.table.column("condy").unwrap(), &[100.0, 200.0, 400.0]);

    let out = dir.path().join("results");
    let csv = fs::read_to_string(out.join("channel_task_pairs.csv")).unwrap();
    assert_eq!(csv, "task_pairs,condy,asio\n1,100,200\n2,200,400\n4,400,800\n");

    let svg = fs::read_to_string(out.join("channel_num_messages.svg")).unwrap();
    assert!(svg.contains("Channel Benchmark: Number of Messages vs Time (ms)"));
    assert_eq!(svg.matches("<polyline").count(), 2);

    assert_eq!(
        load_parquet(out.join("channel_num_messages.parquet")).unwrap(),
        messages.table
    );

    let manifest: SweepManifest =
        serde_json::from_str(&fs::read_to_string(&pairs.manifest).unwrap()).unwrap();
    assert_eq!(manifest.name(), "channel_task_pairs");
    assert_eq!(manifest.invocations().len(), 6);
    assert_eq!(manifest.artifacts().len(), 3);
    assert!(manifest.finished_at().is_some());
}

#[test]
fn test_metric_scale_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = channel_plan(dir.path().to_path_buf());
    plan.axes.truncate(1);
    plan.metric = MetricSpec::new("time_ms", "Half time (ms)").with_scale(0.5);

    let outcomes = plan.execute_with(NoopEnvironment).unwrap();
    assert_eq!(outcomes[0].table.column("condy").unwrap(), &[50.0, 100.0]);
}

#[test]
fn test_missing_metric_fails_but_manifest_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = channel_plan(dir.path().to_path_buf());
    plan.metric = MetricSpec::new("ops", "Ops");

    let err = plan.execute_with(NoopEnvironment).unwrap_err();
    match err {
        Error::MissingMetric { subject, index, .. } => {
            assert_eq!(subject, "asio");
            assert_eq!(index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let manifest_path = dir.path().join("channel_num_messages.manifest.json");
    let manifest: SweepManifest =
        serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert!(manifest.artifacts().is_empty());
    assert!(!dir.path().join("channel_num_messages.csv").exists());
    // The second axis never ran.
    assert!(!dir.path().join("channel_task_pairs.manifest.json").exists());
}

#[test]
fn test_failing_subject_manifest_records_command() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = channel_plan(dir.path().to_path_buf());
    plan.subjects[1] = sh_subject("asio", "exit 7");

    assert!(matches!(
        plan.execute_with(NoopEnvironment),
        Err(Error::SubjectFailure { .. })
    ));

    let manifest: SweepManifest = serde_json::from_str(
        &fs::read_to_string(dir.path().join("channel_num_messages.manifest.json")).unwrap(),
    )
    .unwrap();
    let failure = manifest.failure().unwrap();
    assert_eq!(failure.subject(), "asio");
    assert_eq!(failure.status(), InvocationStatus::Failed);
    assert!(failure.commands()[0].contains("-n 100"));
}

#[test]
fn test_invalid_plan_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let mut plan = channel_plan(dir.path().join("out"));
    plan.subjects[0] = sh_subject("condy", &format!("touch '{}'", marker.display()));
    plan.baseline
        .insert("queue_depth".to_string(), Scalar::Int(64));

    assert!(matches!(
        plan.execute_with(NoopEnvironment),
        Err(Error::UnknownParameter { .. })
    ));
    assert!(!marker.exists());
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_fixture_created_before_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("test_file.bin");
    let mut plan = channel_plan(dir.path().join("out"));
    plan.axes.truncate(1);
    plan.fixture = Some(Fixture {
        path: data.clone(),
        size_bytes: 4096,
    });
    plan.baseline = ParamMap::from([
        ("buffer_size".to_string(), Scalar::Int(1024)),
        ("task_pairs".to_string(), Scalar::Int(1)),
    ]);

    plan.execute_with(NoopEnvironment).unwrap();
    assert_eq!(fs::metadata(&data).unwrap().len(), 4096);
}

#[test]
fn test_plan_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let plan = channel_plan(dir.path().to_path_buf());
    let path = dir.path().join("plan.json");
    fs::write(&path, plan.to_json().unwrap()).unwrap();

    assert_eq!(SweepPlan::from_json_file(&path).unwrap(), plan);
}
