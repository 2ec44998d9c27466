//! Sweep manifest schema tests
//!
//! The manifest is the only record of which command produced which number,
//! so its JSON shape is checked here independently of the engine.

use runtime_sweep::axis::SweepAxis;
use runtime_sweep::manifest::{ArtifactRecord, InvocationRecord, InvocationStatus, SweepManifest};
use runtime_sweep::params::{ParamMap, Scalar};

fn manifest() -> SweepManifest {
    let axis = SweepAxis::new("block_size", [65_536_i64, 262_144]).unwrap();
    let baseline: ParamMap = [
        ("block_size".to_string(), Scalar::Int(1_048_576)),
        ("num_tasks".to_string(), Scalar::Int(16)),
    ]
    .into_iter()
    .collect();
    SweepManifest::new(
        "file_read_block_size",
        axis,
        baseline,
        vec!["Condy".into(), "Sync".into()],
    )
}

// =============================================================================
// InvocationRecord Tests
// =============================================================================

#[test]
fn test_invocation_record_lifecycle() {
    let mut inv = InvocationRecord::new("Condy", 1, Scalar::Int(262_144));
    assert_eq!(inv.status(), InvocationStatus::Pending);
    assert!(inv.started_at().is_none());

    inv.start();
    assert_eq!(inv.status(), InvocationStatus::Running);
    assert!(inv.started_at().is_some());

    inv.set_commands(vec!["file_read_condy ./test_file.bin -b 262144 -t 16".into()]);
    inv.complete(InvocationStatus::Success);
    assert_eq!(inv.status(), InvocationStatus::Success);
    assert!(inv.ended_at().unwrap() >= inv.started_at().unwrap());
    assert!(inv.error().is_none());
}

#[test]
fn test_invocation_record_failure() {
    let mut inv = InvocationRecord::new("Sync", 0, Scalar::Int(65_536));
    inv.start();
    inv.fail(InvocationStatus::TimedOut, "timed out after 30s");

    assert_eq!(inv.status(), InvocationStatus::TimedOut);
    assert_eq!(inv.error(), Some("timed out after 30s"));
    assert!(inv.ended_at().is_some());
}

#[test]
fn test_status_serializes_snake_case() {
    let json = serde_json::to_string(&InvocationStatus::TimedOut).unwrap();
    assert_eq!(json, "\"timed_out\"");
    let back: InvocationStatus = serde_json::from_str("\"replicated\"").unwrap();
    assert_eq!(back, InvocationStatus::Replicated);
}

// =============================================================================
// SweepManifest Tests
// =============================================================================

#[test]
fn test_manifest_json_shape() {
    let mut m = manifest();
    let slot = m.push_invocation(InvocationRecord::new("Condy", 0, Scalar::Int(65_536)));
    m.invocation_mut(slot).unwrap().start();
    m.invocation_mut(slot)
        .unwrap()
        .complete(InvocationStatus::Success);
    m.add_artifact(ArtifactRecord::new("csv", "results/file_read_block_size.csv", 120));
    m.finish();

    let value = serde_json::to_value(&m).unwrap();
    assert_eq!(value["name"], "file_read_block_size");
    assert_eq!(value["axis"]["name"], "block_size");
    assert_eq!(value["axis"]["values"][1], 262_144);
    assert_eq!(value["baseline"]["num_tasks"], 16);
    assert_eq!(value["subjects"][1], "Sync");
    assert_eq!(value["invocations"][0]["status"], "success");
    assert_eq!(value["artifacts"][0]["kind"], "csv");
}

#[test]
fn test_manifest_write_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");

    let mut m = manifest();
    m.push_invocation(InvocationRecord::new("Sync", 0, Scalar::Int(65_536)));
    m.finish();
    m.write_json(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    let back: SweepManifest = serde_json::from_str(&text).unwrap();
    assert_eq!(back, m);
}

#[test]
fn test_invocations_for_orders_by_axis_index() {
    let mut m = manifest();
    m.push_invocation(InvocationRecord::new("Condy", 1, Scalar::Int(262_144)));
    m.push_invocation(InvocationRecord::new("Sync", 0, Scalar::Int(65_536)));
    m.push_invocation(InvocationRecord::new("Condy", 0, Scalar::Int(65_536)));

    let condy = m.invocations_for("Condy");
    assert_eq!(condy.len(), 2);
    assert_eq!(condy[0].axis_index(), 0);
    assert_eq!(condy[1].axis_index(), 1);
    assert!(m.invocations_for("Asio").is_empty());
}
