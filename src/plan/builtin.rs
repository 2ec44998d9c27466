//! Built-in benchmark families
//!
//! Each constructor returns a plan whose subject programs are resolved
//! against `bench_dir`. Every one of them can be dumped with
//! `runtime-sweep print-plan <family>` and edited as JSON.

use std::path::{Path, PathBuf};

use super::{MetricSpec, PlanAxis, SweepPlan, DEFAULT_OUTPUT_DIR};
use crate::axis::SweepAxis;
use crate::env::EnvSettings;
use crate::fixture::Fixture;
use crate::invoke::ServerPairing;
use crate::params::{FlagMapping, ParamMap, Scalar};
use crate::ports::DEFAULT_PORT_BASE;
use crate::sink::Scale;
use crate::subject::SubjectRef;
use crate::{Error, Result};

const KIB: i64 = 1024;
const MIB: i64 = 1024 * KIB;

/// Test file shared by the file I/O families.
pub const TEST_FILE: &str = "./test_file.bin";
/// Size of [`TEST_FILE`].
pub const TEST_FILE_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Names accepted by [`builtin`].
pub const BUILTIN_FAMILIES: [&str; 6] = [
    "file_read",
    "file_random_read",
    "echo_server",
    "spawn",
    "post",
    "channel",
];

/// Look up a built-in family by name, with programs resolved in `bench_dir`.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unknown name.
pub fn builtin(name: &str, bench_dir: &Path) -> Result<SweepPlan> {
    Ok(unresolved(name)?.with_bench_dir(bench_dir))
}

/// A built-in family with its bare program names, as written to an editable
/// plan file.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unknown name.
pub fn unresolved(name: &str) -> Result<SweepPlan> {
    let plan = match name {
        "file_read" => file_read()?,
        "file_random_read" => file_random_read()?,
        "echo_server" => echo_server()?,
        "spawn" => spawn()?,
        "post" => post()?,
        "channel" => channel()?,
        other => {
            return Err(Error::Config(format!(
                "unknown benchmark family `{other}` (expected one of {})",
                BUILTIN_FAMILIES.join(", ")
            )))
        }
    };
    Ok(plan)
}

fn params<const N: usize>(pairs: [(&str, Scalar); N]) -> ParamMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn plan(name: &str, title: &str, metric: MetricSpec) -> SweepPlan {
    SweepPlan {
        name: name.into(),
        title: title.into(),
        metric,
        baseline: ParamMap::new(),
        axes: Vec::new(),
        subjects: Vec::new(),
        flags: FlagMapping::new(),
        pairing: None,
        environment: EnvSettings::default(),
        timeout_secs: None,
        output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        port_base: DEFAULT_PORT_BASE,
        y_scale: Scale::Linear,
        fixture: None,
    }
}

/// Flags understood by the file I/O subjects.
#[must_use]
pub fn file_flags() -> FlagMapping {
    FlagMapping::new()
        .positional("file", 0)
        .valued("block_size", "-b")
        .valued("num_tasks", "-t")
        .presence("direct_io", "-d")
        .presence("fixed", "-f")
        .presence("iopoll", "-p")
        .presence("sqpoll", "-q")
}

fn file_family(name: &str, title: &str, block_sizes: &[i64]) -> Result<SweepPlan> {
    let mut p = plan(
        name,
        title,
        MetricSpec::new("throughput_mbps", "Throughput (MB/s)"),
    );
    p.baseline = params([
        ("file", Scalar::from(TEST_FILE)),
        ("block_size", Scalar::Int(MIB)),
        ("num_tasks", Scalar::Int(16)),
    ]);
    p.axes = vec![
        PlanAxis::new(
            SweepAxis::new("block_size", block_sizes.iter().copied())?,
            "Block Size (bytes)",
            Scale::Log2,
        ),
        PlanAxis::new(
            SweepAxis::new("num_tasks", [1_i64, 2, 4, 8, 16, 32, 64])?,
            "Number of Tasks",
            Scale::Log2,
        ),
    ];
    p.flags = file_flags();
    p.environment = EnvSettings::cold_cache();
    p.y_scale = Scale::Log10;
    p.fixture = Some(Fixture {
        path: PathBuf::from(TEST_FILE),
        size_bytes: TEST_FILE_SIZE,
    });
    Ok(p)
}

/// Sequential reads: block size and task count sweeps.
pub fn file_read() -> Result<SweepPlan> {
    let mut p = file_family(
        "file_read",
        "File Read Benchmark",
        &[64 * KIB, 256 * KIB, MIB, 4 * MIB],
    )?;
    p.subjects = vec![
        SubjectRef::new("Condy", "file_read_condy"),
        SubjectRef::new("Condy Direct I/O", "file_read_condy").with_override("direct_io", true),
        SubjectRef::new("Asio", "file_read_asio"),
        SubjectRef::new("Sync", "file_read_sync").with_exclude("num_tasks"),
        SubjectRef::new("Sync Direct I/O", "file_read_sync")
            .with_override("direct_io", true)
            .with_exclude("num_tasks"),
    ];
    Ok(p)
}

/// Random reads, with a registered fd and buffer variant.
pub fn file_random_read() -> Result<SweepPlan> {
    let mut p = file_family(
        "file_random_read",
        "Random Read Benchmark",
        &[64 * KIB, 256 * KIB, 512 * KIB, MIB, 2 * MIB],
    )?;
    p.subjects = vec![
        SubjectRef::new("Condy", "file_random_read_condy"),
        SubjectRef::new("Condy Direct I/O", "file_random_read_condy")
            .with_override("direct_io", true),
        SubjectRef::new("Condy Fixed Fd & Buffer", "file_random_read_condy")
            .with_override("fixed", true),
        SubjectRef::new("Asio", "file_random_read_asio"),
        SubjectRef::new("Sync", "file_random_read_sync").with_exclude("num_tasks"),
        SubjectRef::new("Sync Direct I/O", "file_random_read_sync")
            .with_override("direct_io", true)
            .with_exclude("num_tasks"),
    ];
    Ok(p)
}

/// Echo servers driven by the stress client; throughput in MiB/s.
pub fn echo_server() -> Result<SweepPlan> {
    #[allow(clippy::cast_precision_loss)]
    let per_mib = 1.0 / MIB as f64;
    let mut p = plan(
        "echo_server",
        "Echo Server Throughput",
        MetricSpec::new("resp_bytes_per_sec", "Throughput (MB/s)").with_scale(per_mib),
    );
    p.baseline = params([
        ("message_size", Scalar::Int(KIB)),
        ("num_connections", Scalar::Int(16)),
        ("duration", Scalar::Int(10)),
    ]);
    p.axes = vec![PlanAxis::new(
        SweepAxis::new("num_connections", [4_i64, 8, 16, 32, 64])?,
        "Number of Connections",
        Scale::Log2,
    )];
    p.subjects = vec![
        SubjectRef::new("Condy", "echo_server_condy"),
        SubjectRef::new("Condy (fixed fd)", "echo_server_condy").with_override("fixed_fd", true),
        SubjectRef::new("ASIO", "echo_server_asio"),
        SubjectRef::new("Epoll", "echo_server_epoll"),
    ];
    p.flags = FlagMapping::new()
        .positional("address", 0)
        .positional("port", 1)
        .presence("fixed_fd", "-f");
    p.pairing = Some(ServerPairing::new(
        "echo_stress",
        FlagMapping::new()
            .valued("address", "-a")
            .valued("port", "-p")
            .valued("message_size", "-l")
            .valued("num_connections", "-c")
            .valued("duration", "-t"),
    ));
    Ok(p)
}

fn two_runtimes(p: &mut SweepPlan, condy: &str, asio: &str) {
    p.subjects = vec![SubjectRef::new("Condy", condy), SubjectRef::new("Asio", asio)];
}

/// Task spawn cost.
pub fn spawn() -> Result<SweepPlan> {
    let mut p = plan(
        "spawn",
        "Spawn Benchmark",
        MetricSpec::new("time_ms", "Time (ms)"),
    );
    p.axes = vec![PlanAxis::new(
        SweepAxis::new(
            "num_tasks",
            [131_072_i64, 262_144, 524_288, 1_048_576, 2_097_152, 4_194_304],
        )?,
        "Number of Tasks",
        Scale::Log2,
    )];
    two_runtimes(&mut p, "spawn_condy", "spawn_asio");
    p.flags = FlagMapping::new().valued("num_tasks", "-n");
    p.y_scale = Scale::Log10;
    Ok(p)
}

/// Cross-thread post cost.
pub fn post() -> Result<SweepPlan> {
    let mut p = plan(
        "post",
        "Post Benchmark",
        MetricSpec::new("time_ms", "Time (ms)"),
    );
    p.axes = vec![PlanAxis::new(
        SweepAxis::new(
            "num_messages",
            [524_288_i64, 1_048_576, 2_097_152, 4_194_304, 8_388_608],
        )?,
        "Number of Messages",
        Scale::Log2,
    )];
    two_runtimes(&mut p, "post_condy", "post_asio");
    p.flags = FlagMapping::new().valued("num_messages", "-n");
    p.y_scale = Scale::Log10;
    Ok(p)
}

/// Channel throughput by message count and by producer/consumer pairs.
pub fn channel() -> Result<SweepPlan> {
    let mut p = plan(
        "channel",
        "Channel Benchmark",
        MetricSpec::new("time_ms", "Time (ms)"),
    );
    p.baseline = params([
        ("buffer_size", Scalar::Int(KIB)),
        ("num_messages", Scalar::Int(MIB)),
        ("task_pairs", Scalar::Int(1)),
    ]);
    p.axes = vec![
        PlanAxis::new(
            SweepAxis::new(
                "num_messages",
                [131_072_i64, 262_144, 524_288, 1_048_576, 2_097_152],
            )?,
            "Number of Messages",
            Scale::Categorical,
        ),
        PlanAxis::new(
            SweepAxis::new("task_pairs", [1_i64, 2, 4, 8, 16, 32])?,
            "Number of Task Pairs",
            Scale::Categorical,
        ),
    ];
    two_runtimes(&mut p, "channel_condy", "channel_asio");
    p.flags = FlagMapping::new()
        .valued("buffer_size", "-b")
        .valued("num_messages", "-n")
        .valued("task_pairs", "-p");
    p.y_scale = Scale::Log10;
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::RunSpec;
    use crate::invoke::Invoke;

    #[test]
    fn test_every_builtin_validates() {
        for name in BUILTIN_FAMILIES {
            let plan = builtin(name, Path::new("/opt/bench")).unwrap();
            plan.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
            assert_eq!(plan.name, name);
        }
    }

    #[test]
    fn test_unknown_family() {
        assert!(matches!(
            builtin("file_write", Path::new(".")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_printed_plan_resolves_bench_dir_once() {
        let json = unresolved("spawn").unwrap().to_json().unwrap();
        let loaded: SweepPlan = serde_json::from_str(&json).unwrap();
        let plan = loaded.with_bench_dir(Path::new(crate::plan::DEFAULT_BENCH_DIR));
        assert_eq!(
            plan.subjects[0].program(),
            Path::new("./build/benchmarks/spawn_condy")
        );
        let direct = builtin("spawn", Path::new("./build/benchmarks")).unwrap();
        let programs = |p: &SweepPlan| -> Vec<PathBuf> {
            p.subjects.iter().map(|s| s.program().to_path_buf()).collect()
        };
        assert_eq!(programs(&plan), programs(&direct));
    }

    #[test]
    fn test_sync_subject_is_invariant_to_num_tasks() {
        let plan = file_read().unwrap();
        let sync = plan.subjects.iter().find(|s| s.label() == "Sync").unwrap();
        assert!(sync.is_invariant_to("num_tasks"));
        assert!(!sync.is_invariant_to("block_size"));
    }

    #[test]
    fn test_file_read_command_line() {
        let plan = file_read().unwrap();
        let subject = &plan.subjects[1];
        let spec = RunSpec::for_point(subject, &plan.baseline, "block_size", &Scalar::Int(65_536));
        let args = plan.flags.render(&spec.params(), subject.label()).unwrap();
        assert_eq!(
            args,
            vec!["./test_file.bin", "-b", "65536", "-t", "16", "-d"]
        );
    }

    #[test]
    fn test_echo_server_is_paired_and_scaled() {
        let plan = echo_server().unwrap();
        assert!(plan.invoker().is_paired());
        assert!((plan.metric.scale * 1_048_576.0 - 1.0).abs() < 1e-12);
        let subject = &plan.subjects[0];
        let spec = RunSpec::for_point(subject, &plan.baseline, "num_connections", &Scalar::Int(4))
            .with_port(12345);
        plan.invoker().validate(&spec).unwrap();
    }

    #[test]
    fn test_builtin_round_trips_through_json() {
        let plan = channel().unwrap();
        let back: SweepPlan = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(back, plan);
    }
}
