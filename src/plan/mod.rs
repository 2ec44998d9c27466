//! Sweep plans: a benchmark family described as data
//!
//! A plan names the subjects, the flag mapping they share, the baseline
//! parameters and one or more axes. Executing it runs one sweep per axis and
//! writes, for each, a CSV table, a Parquet table, an SVG chart and a JSON
//! manifest into the output directory:
//!
//! ```text
//! <output_dir>/<plan>_<axis>.csv
//! <output_dir>/<plan>_<axis>.parquet
//! <output_dir>/<plan>_<axis>.svg
//! <output_dir>/<plan>_<axis>.manifest.json
//! ```
//!
//! Plans are plain JSON so new families need no code; the built-in ones are
//! in [`builtin`].

pub mod builtin;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::axis::{RunSpec, SweepAxis};
use crate::engine::SweepEngine;
use crate::env::{EnvSettings, EnvironmentController, SystemEnvironment};
use crate::fixture::Fixture;
use crate::invoke::{Invoke, ProcessInvoker, ServerPairing};
use crate::manifest::{ArtifactRecord, SweepManifest};
use crate::params::{FlagMapping, ParamMap};
use crate::ports::{PortAllocator, DEFAULT_PORT_BASE};
use crate::sink::{self, ChartSink, ChartStyle, CsvSink, ParquetSink, Scale};
use crate::subject::SubjectRef;
use crate::table::ResultTable;
use crate::{Error, Result};

/// Directory benchmark binaries are looked up in by default.
pub const DEFAULT_BENCH_DIR: &str = "./build/benchmarks";
/// Directory results are written to by default.
pub const DEFAULT_OUTPUT_DIR: &str = "./results";

/// The metric a plan extracts from every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Report key, e.g. `throughput_mbps`
    pub key: String,
    /// Multiplier applied to every value (unit conversion)
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Axis label for the metric, e.g. `Throughput (MB/s)`
    pub label: String,
}

const fn default_scale() -> f64 {
    1.0
}

impl MetricSpec {
    /// Unscaled metric.
    #[must_use]
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            scale: 1.0,
            label: label.into(),
        }
    }

    /// Set the multiplier.
    #[must_use]
    pub const fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

/// One swept axis of a plan, with its chart presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanAxis {
    /// Parameter name and values
    pub axis: SweepAxis,
    /// Human-readable axis label
    pub label: String,
    /// Chart x scale
    #[serde(default)]
    pub scale: Scale,
    /// Chart title; derived from the plan title when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl PlanAxis {
    /// Axis with a derived chart title.
    #[must_use]
    pub fn new(axis: SweepAxis, label: impl Into<String>, scale: Scale) -> Self {
        Self {
            axis,
            label: label.into(),
            scale,
            title: None,
        }
    }
}

/// A complete benchmark family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    /// Short name, used as the output file prefix
    pub name: String,
    /// Chart title prefix
    pub title: String,
    /// Metric extracted from every report
    pub metric: MetricSpec,
    /// Parameter values held fixed while an axis is swept
    #[serde(default)]
    pub baseline: ParamMap,
    /// Axes, swept one after another
    pub axes: Vec<PlanAxis>,
    /// Variants, in column order
    pub subjects: Vec<SubjectRef>,
    /// Parameter → flag mapping shared by all subjects
    pub flags: FlagMapping,
    /// Load generator, for server subjects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing: Option<ServerPairing>,
    /// Host conditioning before each invocation
    #[serde(default)]
    pub environment: EnvSettings,
    /// Per-invocation timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Where tables, charts and manifests are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// First port handed to server-paired invocations
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    /// Chart y scale
    #[serde(default)]
    pub y_scale: Scale,
    /// Input file created before the first sweep
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture: Option<Fixture>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

const fn default_port_base() -> u16 {
    DEFAULT_PORT_BASE
}

/// Artifacts produced for one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisOutcome {
    /// Swept parameter
    pub axis: String,
    /// Scaled result table
    pub table: ResultTable,
    /// Files written, manifest excluded
    pub artifacts: Vec<ArtifactRecord>,
    /// Path of the sweep manifest
    pub manifest: PathBuf,
}

impl SweepPlan {
    /// Load a plan from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`]; axis errors surface as JSON
    /// errors.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve relative subject and load generator paths against `dir`.
    #[must_use]
    pub fn with_bench_dir(mut self, dir: &Path) -> Self {
        self.subjects = self
            .subjects
            .into_iter()
            .map(|s| s.resolved_in(dir))
            .collect();
        if let Some(pairing) = &mut self.pairing {
            if pairing.load_generator.is_relative() {
                pairing.load_generator = dir.join(&pairing.load_generator);
            }
        }
        self
    }

    /// Invocation timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Invoker matching the plan's shape.
    #[must_use]
    pub fn invoker(&self) -> ProcessInvoker {
        match &self.pairing {
            Some(pairing) => ProcessInvoker::server_paired(self.flags.clone(), pairing.clone()),
            None => ProcessInvoker::transient(self.flags.clone()),
        }
    }

    /// Check everything that can be checked without spawning: names, metric,
    /// labels, mappings, and that every point of every axis renders to a
    /// command line for every subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::UnknownParameter`].
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("plan name is empty".into()));
        }
        if self.metric.key.trim().is_empty() {
            return Err(Error::Config("metric key is empty".into()));
        }
        if !self.metric.scale.is_finite() || self.metric.scale == 0.0 {
            return Err(Error::Config(format!(
                "metric scale {} is not a finite non-zero number",
                self.metric.scale
            )));
        }
        if self.axes.is_empty() {
            return Err(Error::Config(format!("plan `{}` has no axes", self.name)));
        }
        if self.subjects.is_empty() {
            return Err(Error::Config(format!("plan `{}` has no subjects", self.name)));
        }

        let mut axis_names = BTreeSet::new();
        for plan_axis in &self.axes {
            if !axis_names.insert(plan_axis.axis.name()) {
                return Err(Error::Config(format!(
                    "axis `{}` appears twice",
                    plan_axis.axis.name()
                )));
            }
        }
        let mut labels = BTreeSet::new();
        for subject in &self.subjects {
            if !labels.insert(subject.label()) {
                return Err(Error::Config(format!(
                    "duplicate subject label `{}`",
                    subject.label()
                )));
            }
        }

        let invoker = self.invoker();
        invoker.validate_mappings()?;
        for plan_axis in &self.axes {
            for subject in &self.subjects {
                for value in plan_axis.axis.values() {
                    invoker.validate(&RunSpec::for_point(
                        subject,
                        &self.baseline,
                        plan_axis.axis.name(),
                        value,
                    ))?;
                }
            }
        }
        Ok(())
    }

    /// Validate, create the fixture, and sweep every axis against the real
    /// system environment.
    ///
    /// # Errors
    ///
    /// The first validation, invocation, aggregation or sink error.
    pub fn execute(&self) -> Result<Vec<AxisOutcome>> {
        self.execute_with(SystemEnvironment::new(self.environment.clone()))
    }

    /// [`execute`](Self::execute) with a caller-supplied environment
    /// controller.
    ///
    /// When a sweep aborts its manifest is still written before the error is
    /// returned, so the failing command can be rerun by hand.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn execute_with<E: EnvironmentController>(
        &self,
        environment: E,
    ) -> Result<Vec<AxisOutcome>> {
        let span = info_span!("plan", name = %self.name);
        let _enter = span.enter();

        self.validate()?;
        if let Some(fixture) = &self.fixture {
            fixture.ensure()?;
        }
        fs::create_dir_all(&self.output_dir)?;

        let mut engine = SweepEngine::new(self.invoker(), environment)
            .with_ports(PortAllocator::new(self.port_base))
            .with_timeout(self.timeout());

        let mut outcomes = Vec::with_capacity(self.axes.len());
        for plan_axis in &self.axes {
            let stem = format!("{}_{}", self.name, plan_axis.axis.name());
            let manifest_path = self.output_dir.join(format!("{stem}.manifest.json"));

            let result = engine.run_named(&stem, &plan_axis.axis, &self.baseline, &self.subjects);
            let (mut manifest, result) = with_manifest(engine.take_manifest(), result, &stem)?;

            let written = result.and_then(|results| {
                let table = results
                    .aggregate(&self.metric.key)?
                    .scaled(self.metric.scale);
                let chart = ChartSink::new(self.chart_style(plan_axis));
                let artifacts = sink::write_all(
                    &[&CsvSink, &ParquetSink, &chart],
                    &table,
                    &self.output_dir,
                    &stem,
                )?;
                Ok((table, artifacts))
            });

            let (table, artifacts) = match written {
                Ok(done) => done,
                Err(e) => {
                    if let Err(write_err) = manifest.write_json(&manifest_path) {
                        warn!(error = %write_err, "failed to write manifest of aborted sweep");
                    }
                    return Err(e);
                }
            };
            for artifact in &artifacts {
                manifest.add_artifact(artifact.clone());
            }
            manifest.write_json(&manifest_path)?;
            info!(axis = plan_axis.axis.name(), manifest = %manifest_path.display(), "axis complete");

            outcomes.push(AxisOutcome {
                axis: plan_axis.axis.name().to_string(),
                table,
                artifacts,
                manifest: manifest_path,
            });
        }
        Ok(outcomes)
    }

    fn chart_style(&self, plan_axis: &PlanAxis) -> ChartStyle {
        let title = plan_axis.title.clone().unwrap_or_else(|| {
            format!("{}: {} vs {}", self.title, plan_axis.label, self.metric.label)
        });
        ChartStyle::new(title, plan_axis.label.clone(), self.metric.label.clone())
            .with_x_scale(plan_axis.scale)
            .with_y_scale(self.y_scale)
    }
}

/// Pair a sweep's outcome with its manifest. A sweep rejected before it
/// started has no manifest, and its own error is the one reported.
fn with_manifest<T>(
    manifest: Option<SweepManifest>,
    result: Result<T>,
    stem: &str,
) -> Result<(SweepManifest, Result<T>)> {
    match manifest {
        Some(manifest) => Ok((manifest, result)),
        None => {
            result?;
            Err(Error::Config(format!("sweep `{stem}` left no manifest")))
        }
    }
}
