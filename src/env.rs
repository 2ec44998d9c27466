//! Environment controller: deterministic OS conditions before each run
//!
//! Before every timed invocation the engine asks the controller to
//! [`prepare`](EnvironmentController::prepare) the host (page-cache drop) and
//! for a [`Placement`] (CPU pinning and priority) for the processes it is about
//! to start. These mutate process-wide OS state, so only one invocation may be
//! in flight per host; the engine's sequential loop guarantees that.
//!
//! Failures here are [`EnvError`]s, which the engine logs as warnings and then
//! carries on: a run without a cold cache is still informative.

use std::fmt;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::invoke::CommandLine;

/// Shell command that drops the page cache, dentries and inodes.
pub const DROP_CACHES_SCRIPT: &str = "echo 3 > /proc/sys/vm/drop_caches";

/// Non-fatal environment preparation failure.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The privileged helper could not be started at all.
    #[error("privileged command `{command}` unavailable: {source}")]
    PrivilegeUnavailable {
        /// Command that was attempted
        command: String,
        /// Spawn error
        #[source]
        source: std::io::Error,
    },

    /// The cache drop ran but failed (usually missing permission).
    #[error("failed to drop page cache ({status}): {stderr}")]
    CacheDropFailed {
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// Not enough CPUs to give the subject an exclusive core.
    #[error("cannot reserve an exclusive core: only {available} CPU(s) available")]
    InsufficientCores {
        /// CPUs in the affinity set
        available: usize,
    },
}

/// Which process of an invocation a placement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The subject under measurement (or the server in a paired run).
    Subject,
    /// The load generator in a paired run.
    LoadGenerator,
}

/// An explicit CPU list, rendered as `taskset -c` expects (`1,2,3`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuList(pub Vec<usize>);

impl fmt::Display for CpuList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cpu) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{cpu}")?;
        }
        Ok(())
    }
}

/// CPU pinning and priority for the processes of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    /// CPUs for the subject / server.
    pub subject_cpus: Option<CpuList>,
    /// CPUs for the load generator.
    pub load_cpus: Option<CpuList>,
    /// `nice` adjustment applied to every process (negative raises priority).
    pub nice: Option<i32>,
}

impl Placement {
    /// Wrap `command` so it starts with this placement.
    ///
    /// `taskset` and `nice` both exec their target, so the wrapped process
    /// keeps the pid the invoker sees.
    #[must_use]
    pub fn apply(&self, role: Role, command: CommandLine) -> CommandLine {
        let cpus = match role {
            Role::Subject => self.subject_cpus.as_ref(),
            Role::LoadGenerator => self.load_cpus.as_ref(),
        };
        let mut command = command;
        if let Some(cpus) = cpus {
            command = command.wrapped("taskset", ["-c".to_string(), cpus.to_string()]);
        }
        if let Some(nice) = self.nice {
            command = command.wrapped("nice", ["-n".to_string(), nice.to_string()]);
        }
        command
    }
}

/// Interface the engine uses to condition the host.
///
/// Alternate backends (direct syscalls, cgroup settings) implement this
/// without touching the engine.
pub trait EnvironmentController {
    /// Condition the host immediately before a timed invocation.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvError`] the caller treats as a warning.
    fn prepare(&mut self) -> Result<(), EnvError>;

    /// CPU placement for the next invocation. `paired` is true when a load
    /// generator will run on this host alongside the subject.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvError`] when the requested pinning cannot be honoured;
    /// the caller falls back to no pinning.
    fn placement(&self, paired: bool) -> Result<Placement, EnvError>;
}

/// Environment settings carried in a sweep plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvSettings {
    /// Drop the page cache before each invocation (I/O benchmarks).
    pub drop_caches: bool,
    /// Pin server and load generator to disjoint CPUs in paired runs.
    pub pin_cpus: bool,
    /// `nice` adjustment for subject processes.
    pub nice: Option<i32>,
    /// Command run to drop the page cache.
    pub drop_caches_command: Vec<String>,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            drop_caches: false,
            pin_cpus: true,
            nice: None,
            drop_caches_command: vec![
                "sudo".into(),
                "-n".into(),
                "sh".into(),
                "-c".into(),
                DROP_CACHES_SCRIPT.into(),
            ],
        }
    }
}

impl EnvSettings {
    /// Settings for I/O benchmarks that must start from a cold cache.
    #[must_use]
    pub fn cold_cache() -> Self {
        Self {
            drop_caches: true,
            ..Self::default()
        }
    }
}

/// Controller backed by external commands (`sync`, `sudo`, `taskset`, `nice`).
#[derive(Debug, Clone)]
pub struct SystemEnvironment {
    settings: EnvSettings,
    cpus: Vec<usize>,
}

impl SystemEnvironment {
    /// Create a controller, reading the CPUs this process may run on.
    #[must_use]
    pub fn new(settings: EnvSettings) -> Self {
        let cpus = available_cpus();
        debug!(?cpus, "available CPU set");
        Self { settings, cpus }
    }

    /// Create a controller over an explicit CPU set.
    #[must_use]
    pub const fn with_cpus(settings: EnvSettings, cpus: Vec<usize>) -> Self {
        Self { settings, cpus }
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &EnvSettings {
        &self.settings
    }

    fn drop_caches(&self) -> Result<(), EnvError> {
        let Some((program, args)) = self.settings.drop_caches_command.split_first() else {
            return Ok(());
        };

        // Flush dirty pages first so the drop actually empties the cache.
        if let Err(e) = Command::new("sync").status() {
            debug!(error = %e, "sync unavailable");
        }

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EnvError::PrivilegeUnavailable {
                command: self.settings.drop_caches_command.join(" "),
                source,
            })?;

        if output.status.success() {
            debug!("page cache dropped");
            Ok(())
        } else {
            Err(EnvError::CacheDropFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl EnvironmentController for SystemEnvironment {
    fn prepare(&mut self) -> Result<(), EnvError> {
        if self.settings.drop_caches {
            self.drop_caches()?;
        }
        Ok(())
    }

    fn placement(&self, paired: bool) -> Result<Placement, EnvError> {
        let mut placement = Placement {
            nice: self.settings.nice,
            ..Placement::default()
        };
        if !(paired && self.settings.pin_cpus) {
            return Ok(placement);
        }

        match self.cpus.split_first() {
            Some((first, rest)) if !rest.is_empty() => {
                placement.subject_cpus = Some(CpuList(vec![*first]));
                placement.load_cpus = Some(CpuList(rest.to_vec()));
                Ok(placement)
            }
            _ => Err(EnvError::InsufficientCores {
                available: self.cpus.len(),
            }),
        }
    }
}

/// Controller that leaves the host untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnvironment;

impl EnvironmentController for NoopEnvironment {
    fn prepare(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    fn placement(&self, _paired: bool) -> Result<Placement, EnvError> {
        Ok(Placement::default())
    }
}

/// CPUs in this process's affinity mask, in ascending order.
#[must_use]
pub fn available_cpus() -> Vec<usize> {
    #[cfg(target_os = "linux")]
    {
        use nix::sched::{sched_getaffinity, CpuSet};
        use nix::unistd::Pid;

        match sched_getaffinity(Pid::from_raw(0)) {
            Ok(set) => {
                return (0..CpuSet::count())
                    .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
                    .collect();
            }
            Err(e) => warn!(error = %e, "sched_getaffinity failed, assuming CPUs 0..n"),
        }
    }

    let count = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    (0..count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pin: bool, nice: Option<i32>) -> EnvSettings {
        EnvSettings {
            pin_cpus: pin,
            nice,
            ..EnvSettings::default()
        }
    }

    #[test]
    fn test_paired_placement_reserves_first_core() {
        let env = SystemEnvironment::with_cpus(settings(true, None), vec![0, 1, 2, 3]);
        let placement = env.placement(true).unwrap();
        assert_eq!(placement.subject_cpus, Some(CpuList(vec![0])));
        assert_eq!(placement.load_cpus, Some(CpuList(vec![1, 2, 3])));
    }

    #[test]
    fn test_transient_placement_does_not_pin() {
        let env = SystemEnvironment::with_cpus(settings(true, Some(-5)), vec![0, 1]);
        let placement = env.placement(false).unwrap();
        assert!(placement.subject_cpus.is_none());
        assert_eq!(placement.nice, Some(-5));
    }

    #[test]
    fn test_single_core_cannot_reserve() {
        let env = SystemEnvironment::with_cpus(settings(true, None), vec![3]);
        assert!(matches!(
            env.placement(true),
            Err(EnvError::InsufficientCores { available: 1 })
        ));
    }

    #[test]
    fn test_apply_wraps_taskset_then_nice() {
        let placement = Placement {
            subject_cpus: Some(CpuList(vec![0])),
            load_cpus: Some(CpuList(vec![1, 2])),
            nice: Some(-5),
        };
        let cmd = CommandLine::new("echo_server_condy").args(["0.0.0.0", "12345"]);
        let wrapped = placement.apply(Role::Subject, cmd);
        assert_eq!(
            wrapped.to_string(),
            "nice -n -5 taskset -c 0 echo_server_condy 0.0.0.0 12345"
        );

        let load = placement.apply(Role::LoadGenerator, CommandLine::new("echo_stress"));
        assert_eq!(load.to_string(), "nice -n -5 taskset -c 1,2 echo_stress");
    }

    #[test]
    fn test_failed_cache_drop_is_reported() {
        let mut env = SystemEnvironment::with_cpus(
            EnvSettings {
                drop_caches: true,
                drop_caches_command: vec!["false".into()],
                ..EnvSettings::default()
            },
            vec![0],
        );
        assert!(matches!(
            env.prepare(),
            Err(EnvError::CacheDropFailed { .. })
        ));
    }

    #[test]
    fn test_missing_privileged_helper_is_reported() {
        let mut env = SystemEnvironment::with_cpus(
            EnvSettings {
                drop_caches: true,
                drop_caches_command: vec!["/nonexistent/sudo".into()],
                ..EnvSettings::default()
            },
            vec![0],
        );
        assert!(matches!(
            env.prepare(),
            Err(EnvError::PrivilegeUnavailable { .. })
        ));
    }

    #[test]
    fn test_available_cpus_nonempty() {
        assert!(!available_cpus().is_empty());
    }
}
