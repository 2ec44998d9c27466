//! Sweep engine
//!
//! Holds every parameter at its baseline except the swept one and visits the
//! axis values in the order given, for each subject in the order given. Both
//! orders affect warm-up effects and column order, so they are never
//! rearranged.
//!
//! Invocations run strictly one at a time: each measurement needs the host to
//! itself, and the environment controller mutates process-wide OS state.
//! The first fatal error aborts the whole sweep; a sweep either yields
//! equal-length series for every subject or nothing.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{error, info, info_span, warn};

use crate::aggregate::aggregate;
use crate::axis::{RunSpec, SweepAxis};
use crate::decode::{decode, Record};
use crate::env::{EnvironmentController, Placement};
use crate::invoke::Invoke;
use crate::manifest::{InvocationRecord, InvocationStatus, SweepManifest};
use crate::params::{ParamMap, Scalar};
use crate::ports::PortAllocator;
use crate::subject::SubjectRef;
use crate::table::ResultTable;
use crate::{Error, Result};

/// Decoded records of one subject, one per axis value.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRecords {
    /// Subject variant
    pub subject: SubjectRef,
    /// Records in axis order
    pub records: Vec<Record>,
}

/// Output of a successful sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResults {
    axis: SweepAxis,
    series: Vec<SubjectRecords>,
}

impl SweepResults {
    /// The swept axis.
    #[must_use]
    pub const fn axis(&self) -> &SweepAxis {
        &self.axis
    }

    /// Per-subject records in subject order.
    #[must_use]
    pub fn series(&self) -> &[SubjectRecords] {
        &self.series
    }

    /// Records of the subject labelled `label`.
    #[must_use]
    pub fn records_for(&self, label: &str) -> Option<&[Record]> {
        self.series
            .iter()
            .find(|s| s.subject.label() == label)
            .map(|s| s.records.as_slice())
    }

    /// Aggregate `metric_key` into a result table.
    ///
    /// # Errors
    ///
    /// See [`aggregate`].
    pub fn aggregate(&self, metric_key: &str) -> Result<ResultTable> {
        aggregate(&self.axis, &self.series, metric_key)
    }
}

/// Sequential sweep driver.
///
/// Owns its invoker, environment controller and port allocator; two engines
/// never share state.
#[derive(Debug)]
pub struct SweepEngine<I, E> {
    invoker: I,
    environment: E,
    ports: PortAllocator,
    timeout: Option<Duration>,
    manifest: Option<SweepManifest>,
}

impl<I: Invoke, E: EnvironmentController> SweepEngine<I, E> {
    /// Create an engine with the default port base and no timeout.
    #[must_use]
    pub fn new(invoker: I, environment: E) -> Self {
        Self {
            invoker,
            environment,
            ports: PortAllocator::default(),
            timeout: None,
            manifest: None,
        }
    }

    /// Use `ports` for server-paired invocations.
    #[must_use]
    pub fn with_ports(mut self, ports: PortAllocator) -> Self {
        self.ports = ports;
        self
    }

    /// Kill any single invocation that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The engine's port allocator.
    #[must_use]
    pub const fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// The invoker.
    #[must_use]
    pub const fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Manifest of the most recent sweep, complete or aborted.
    #[must_use]
    pub const fn manifest(&self) -> Option<&SweepManifest> {
        self.manifest.as_ref()
    }

    /// Take the manifest of the most recent sweep.
    pub fn take_manifest(&mut self) -> Option<SweepManifest> {
        self.manifest.take()
    }

    /// Run `axis` over `subjects` with everything else at `baseline`.
    ///
    /// # Errors
    ///
    /// Any configuration, invocation or decode error; the sweep stops at the
    /// first one.
    pub fn run_sweep(
        &mut self,
        axis: &SweepAxis,
        baseline: &ParamMap,
        subjects: &[SubjectRef],
    ) -> Result<SweepResults> {
        self.run_named("sweep", axis, baseline, subjects)
    }

    /// [`run_sweep`](Self::run_sweep) with a name recorded in the manifest
    /// and logs.
    ///
    /// # Errors
    ///
    /// Same as [`run_sweep`](Self::run_sweep).
    pub fn run_named(
        &mut self,
        name: &str,
        axis: &SweepAxis,
        baseline: &ParamMap,
        subjects: &[SubjectRef],
    ) -> Result<SweepResults> {
        let span = info_span!("sweep", name, axis = axis.name(), points = axis.len());
        let _enter = span.enter();

        self.check(axis, baseline, subjects)?;

        let mut manifest = SweepManifest::new(
            name,
            axis.clone(),
            baseline.clone(),
            subjects.iter().map(|s| s.label().to_string()).collect(),
        );
        let outcome = self.run_all(&mut manifest, axis, baseline, subjects);
        manifest.finish();
        self.manifest = Some(manifest);

        match outcome {
            Ok(series) => {
                info!(subjects = series.len(), "sweep complete");
                Ok(SweepResults {
                    axis: axis.clone(),
                    series,
                })
            }
            Err(e) => {
                error!(error = %e, "sweep aborted");
                Err(e)
            }
        }
    }

    /// Reject anything that would fail before the first process is spawned.
    fn check(&self, axis: &SweepAxis, baseline: &ParamMap, subjects: &[SubjectRef]) -> Result<()> {
        if subjects.is_empty() {
            return Err(Error::Config("sweep has no subjects".into()));
        }
        let mut labels = BTreeSet::new();
        for subject in subjects {
            if !labels.insert(subject.label()) {
                return Err(Error::Config(format!(
                    "duplicate subject label `{}`",
                    subject.label()
                )));
            }
            for value in axis.values() {
                self.invoker
                    .validate(&RunSpec::for_point(subject, baseline, axis.name(), value))?;
            }
        }
        Ok(())
    }

    fn run_all(
        &mut self,
        manifest: &mut SweepManifest,
        axis: &SweepAxis,
        baseline: &ParamMap,
        subjects: &[SubjectRef],
    ) -> Result<Vec<SubjectRecords>> {
        let mut series = Vec::with_capacity(subjects.len());

        for subject in subjects {
            let mut records = Vec::with_capacity(axis.len());

            if subject.is_invariant_to(axis.name()) {
                // One measurement stands for every point.
                let first = &axis.values()[0];
                let record = self.run_point(manifest, subject, baseline, axis, 0, first)?;
                for (index, value) in axis.values().iter().enumerate().skip(1) {
                    let mut replica = InvocationRecord::new(subject.label(), index, value.clone());
                    replica.complete(InvocationStatus::Replicated);
                    manifest.push_invocation(replica);
                }
                records.resize(axis.len(), record);
            } else {
                for (index, value) in axis.values().iter().enumerate() {
                    records.push(self.run_point(manifest, subject, baseline, axis, index, value)?);
                }
            }

            series.push(SubjectRecords {
                subject: subject.clone(),
                records,
            });
        }

        Ok(series)
    }

    fn run_point(
        &mut self,
        manifest: &mut SweepManifest,
        subject: &SubjectRef,
        baseline: &ParamMap,
        axis: &SweepAxis,
        index: usize,
        value: &Scalar,
    ) -> Result<Record> {
        let span = info_span!("invocation", subject = subject.label(), value = %value);
        let _enter = span.enter();

        let paired = self.invoker.is_paired();
        let mut spec = RunSpec::for_point(subject, baseline, axis.name(), value);
        if paired {
            spec = spec.with_port(self.ports.allocate()?);
        }

        if let Err(e) = self.environment.prepare() {
            warn!(error = %e, "environment preparation failed, results may be inaccurate");
        }
        let placement = self.environment.placement(paired).unwrap_or_else(|e| {
            warn!(error = %e, "running without CPU placement");
            Placement::default()
        });

        let slot = manifest.push_invocation(InvocationRecord::new(
            subject.label(),
            index,
            value.clone(),
        ));
        if let Some(inv) = manifest.invocation_mut(slot) {
            inv.start();
        }

        let outcome = self
            .invoker
            .invoke(&spec, &placement, self.timeout)
            .and_then(|raw| {
                if let Some(inv) = manifest.invocation_mut(slot) {
                    inv.set_commands(raw.commands.clone());
                }
                decode(&raw.stdout).map_err(|source| Error::Decode {
                    context: Box::new(spec.context(raw.commands)),
                    source,
                    output: raw.stdout,
                })
            });

        let Some(inv) = manifest.invocation_mut(slot) else {
            return outcome;
        };
        match &outcome {
            Ok(record) => {
                inv.complete(InvocationStatus::Success);
                info!(metrics = record.len(), "point complete");
            }
            Err(e) => {
                if let Some(context) = e.context() {
                    inv.set_commands(context.commands.clone());
                }
                let status = if matches!(e, Error::Timeout { .. }) {
                    InvocationStatus::TimedOut
                } else {
                    InvocationStatus::Failed
                };
                inv.fail(status, e.to_string());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvError, NoopEnvironment};
    use crate::invoke::RawOutput;

    /// Invoker that answers from a closure and logs calls.
    struct Scripted<F> {
        respond: F,
        calls: Vec<(String, String, Option<u16>)>,
        paired: bool,
    }

    impl<F: FnMut(&RunSpec<'_>) -> Result<String>> Invoke for Scripted<F> {
        fn is_paired(&self) -> bool {
            self.paired
        }

        fn validate(&self, _spec: &RunSpec<'_>) -> Result<()> {
            Ok(())
        }

        fn invoke(
            &mut self,
            spec: &RunSpec<'_>,
            _placement: &Placement,
            _timeout: Option<Duration>,
        ) -> Result<RawOutput> {
            self.calls.push((
                spec.subject().label().to_string(),
                spec.point().1.to_string(),
                spec.port(),
            ));
            let stdout = (self.respond)(spec)?;
            Ok(RawOutput {
                stdout,
                stderr: String::new(),
                commands: vec![format!("{} {}", spec.subject().program().display(), spec.point().1)],
            })
        }
    }

    fn scripted<F: FnMut(&RunSpec<'_>) -> Result<String>>(respond: F) -> Scripted<F> {
        Scripted {
            respond,
            calls: Vec::new(),
            paired: false,
        }
    }

    fn axis() -> SweepAxis {
        SweepAxis::new("num_tasks", [1_i64, 2, 4]).unwrap()
    }

    fn value_of(spec: &RunSpec<'_>) -> i64 {
        match spec.point().1 {
            Scalar::Int(v) => v,
            _ => 0,
        }
    }

    #[test]
    fn test_visits_subjects_then_points_in_order() {
        let mut engine = SweepEngine::new(
            scripted(|spec| Ok(format!("time_ms: {}", value_of(spec)))),
            NoopEnvironment,
        );
        let subjects = [SubjectRef::new("A", "a"), SubjectRef::new("B", "b")];
        let results = engine.run_sweep(&axis(), &ParamMap::new(), &subjects).unwrap();

        let order: Vec<(String, String)> = engine
            .invoker()
            .calls
            .iter()
            .map(|(s, v, _)| (s.clone(), v.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A".into(), "1".into()),
                ("A".into(), "2".into()),
                ("A".into(), "4".into()),
                ("B".into(), "1".into()),
                ("B".into(), "2".into()),
                ("B".into(), "4".into()),
            ]
        );
        assert_eq!(results.series().len(), 2);
        assert!(results.series().iter().all(|s| s.records.len() == 3));
    }

    #[test]
    fn test_failure_aborts_whole_sweep() {
        let mut engine = SweepEngine::new(
            scripted(|spec| {
                if spec.subject().label() == "B" && value_of(spec) == 2 {
                    Err(Error::Config("boom".into()))
                } else {
                    Ok("time_ms: 1".into())
                }
            }),
            NoopEnvironment,
        );
        let subjects = [
            SubjectRef::new("A", "a"),
            SubjectRef::new("B", "b"),
            SubjectRef::new("C", "c"),
        ];
        assert!(engine.run_sweep(&axis(), &ParamMap::new(), &subjects).is_err());
        // C never ran.
        assert!(engine.invoker().calls.iter().all(|(s, _, _)| s != "C"));

        let manifest = engine.manifest().unwrap();
        let failed = manifest.failure().unwrap();
        assert_eq!(failed.subject(), "B");
        assert_eq!(failed.axis_index(), 1);
    }

    #[test]
    fn test_decode_failure_carries_context() {
        let mut engine = SweepEngine::new(scripted(|_| Ok("garbage".into())), NoopEnvironment);
        let err = engine
            .run_sweep(&axis(), &ParamMap::new(), &[SubjectRef::new("A", "a")])
            .unwrap_err();
        match err {
            Error::Decode {
                context,
                source,
                output,
            } => {
                assert_eq!(context.subject, "A");
                assert_eq!(context.value, "1");
                assert_eq!(source.line, 1);
                assert_eq!(output, "garbage");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_axis_invariant_subject_runs_once() {
        let mut engine = SweepEngine::new(scripted(|_| Ok("throughput_mbps: 900".into())), NoopEnvironment);
        let subjects = [SubjectRef::new("Sync", "sync").with_exclude("num_tasks")];
        let results = engine.run_sweep(&axis(), &ParamMap::new(), &subjects).unwrap();

        assert_eq!(engine.invoker().calls.len(), 1);
        let table = results.aggregate("throughput_mbps").unwrap();
        assert_eq!(table.column("Sync").unwrap(), &[900.0, 900.0, 900.0]);

        let statuses: Vec<InvocationStatus> = engine
            .manifest()
            .unwrap()
            .invocations()
            .iter()
            .map(InvocationRecord::status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                InvocationStatus::Success,
                InvocationStatus::Replicated,
                InvocationStatus::Replicated
            ]
        );
    }

    #[test]
    fn test_paired_invocations_get_fresh_ports() {
        let mut invoker = scripted(|_| Ok("resp_bytes_per_sec: 1".into()));
        invoker.paired = true;
        let mut engine =
            SweepEngine::new(invoker, NoopEnvironment).with_ports(PortAllocator::new(40000));
        engine
            .run_sweep(&axis(), &ParamMap::new(), &[SubjectRef::new("Epoll", "epoll")])
            .unwrap();
        let ports: Vec<Option<u16>> = engine.invoker().calls.iter().map(|c| c.2).collect();
        assert_eq!(ports, vec![Some(40000), Some(40001), Some(40002)]);
        assert_eq!(engine.ports().peek(), Some(40003));
    }

    #[test]
    fn test_duplicate_labels_rejected_before_invoking() {
        let mut engine = SweepEngine::new(scripted(|_| Ok("time_ms: 1".into())), NoopEnvironment);
        let subjects = [SubjectRef::new("A", "a"), SubjectRef::new("A", "b")];
        assert!(matches!(
            engine.run_sweep(&axis(), &ParamMap::new(), &subjects),
            Err(Error::Config(_))
        ));
        assert!(engine.invoker().calls.is_empty());
    }

    struct FailingEnv {
        prepared: usize,
    }

    impl EnvironmentController for FailingEnv {
        fn prepare(&mut self) -> std::result::Result<(), EnvError> {
            self.prepared += 1;
            Err(EnvError::CacheDropFailed {
                status: "exit status: 1".into(),
                stderr: "sudo: a password is required".into(),
            })
        }

        fn placement(&self, _paired: bool) -> std::result::Result<Placement, EnvError> {
            Err(EnvError::InsufficientCores { available: 1 })
        }
    }

    #[test]
    fn test_environment_errors_are_warnings() {
        let mut engine = SweepEngine::new(scripted(|_| Ok("time_ms: 5".into())), FailingEnv { prepared: 0 });
        let results = engine
            .run_sweep(&axis(), &ParamMap::new(), &[SubjectRef::new("A", "a")])
            .unwrap();
        assert_eq!(results.records_for("A").unwrap().len(), 3);
        assert_eq!(engine.environment.prepared, 3);
    }
}
