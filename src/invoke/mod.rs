//! Subject invoker
//!
//! Two invocation shapes:
//!
//! - **Transient**: the subject runs to completion and prints its report;
//!   a non-zero exit is a [`Error::SubjectFailure`] carrying stderr.
//! - **Server-paired**: the subject is a server started in the background,
//!   given a fixed settle delay (no readiness handshake, so a slow server can
//!   make the load generator fail to connect), then a load generator runs
//!   against it and its report is captured. The server is terminated and
//!   reaped on every exit path before [`Invoke::invoke`] returns.
//!
//! Argument vectors are built from the run's parameters through
//! [`FlagMapping`]s; unknown parameters are rejected by
//! [`Invoke::validate`] before anything is spawned.

mod process;

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::axis::RunSpec;
use crate::env::{Placement, Role};
use crate::params::{FlagMapping, ParamMap, Scalar};
use crate::{Error, Result};

pub use process::DEFAULT_SHUTDOWN_GRACE;

/// Parameter the invoker fills with the bind/connect address in paired runs.
pub const ADDRESS_PARAM: &str = "address";
/// Parameter the invoker fills with the allocated port in paired runs.
pub const PORT_PARAM: &str = "port";

/// Upper bound on the server settle delay.
pub const MAX_SETTLE: Duration = Duration::from_secs(1);

/// A program and its arguments, displayed shell-quoted so it can be pasted
/// into a terminal to reproduce a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prefix this command with a wrapper program that execs it
    /// (`taskset -c 0 <self>`).
    #[must_use]
    pub fn wrapped<I, S>(self, wrapper: impl Into<String>, wrapper_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args: Vec<String> = wrapper_args.into_iter().map(Into::into).collect();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: wrapper.into(),
            args,
        }
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Build a [`Command`] for this line.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./,:=+@%".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Captured report of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Standard output of the reporting process
    pub stdout: String,
    /// Standard error of the reporting process
    pub stderr: String,
    /// Command lines run, server first when paired
    pub commands: Vec<String>,
}

/// Runs one subject invocation.
pub trait Invoke {
    /// Whether invocations pair the subject with a load generator (and so
    /// need a port and an exclusive core).
    fn is_paired(&self) -> bool {
        false
    }

    /// Check that `spec` can be turned into command lines, without spawning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`] or [`Error::Config`].
    fn validate(&self, spec: &RunSpec<'_>) -> Result<()>;

    /// Run the subject described by `spec` and capture its report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`], [`Error::SubjectFailure`] or
    /// [`Error::Timeout`], each with the invocation's context.
    fn invoke(
        &mut self,
        spec: &RunSpec<'_>,
        placement: &Placement,
        timeout: Option<Duration>,
    ) -> Result<RawOutput>;
}

/// Load generator paired with a server subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPairing {
    /// Path of the load generator binary
    pub load_generator: PathBuf,
    /// Arguments placed before mapped parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_generator_args: Vec<String>,
    /// Parameter → flag mapping of the load generator
    pub load_flags: FlagMapping,
    /// Delay between starting the server and starting the load generator
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Address the server binds
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Address the load generator connects to
    #[serde(default = "default_connect_address")]
    pub connect_address: String,
    /// SIGTERM → SIGKILL grace period when stopping the server
    #[serde(default = "default_grace_ms")]
    pub shutdown_grace_ms: u64,
}

const fn default_settle_ms() -> u64 {
    500
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_connect_address() -> String {
    "127.0.0.1".into()
}

#[allow(clippy::cast_possible_truncation)]
const fn default_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE.as_millis() as u64
}

impl ServerPairing {
    /// Pairing with the default settle delay and addresses.
    #[must_use]
    pub fn new(load_generator: impl Into<PathBuf>, load_flags: FlagMapping) -> Self {
        Self {
            load_generator: load_generator.into(),
            load_generator_args: Vec::new(),
            load_flags,
            settle_ms: default_settle_ms(),
            bind_address: default_bind_address(),
            connect_address: default_connect_address(),
            shutdown_grace_ms: default_grace_ms(),
        }
    }

    /// Settle delay, capped at [`MAX_SETTLE`].
    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms).min(MAX_SETTLE)
    }

    fn grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// [`Invoke`] implementation that spawns real processes.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    flags: FlagMapping,
    pairing: Option<ServerPairing>,
}

impl ProcessInvoker {
    /// Invoker for transient subjects.
    #[must_use]
    pub const fn transient(flags: FlagMapping) -> Self {
        Self {
            flags,
            pairing: None,
        }
    }

    /// Invoker for server subjects driven by a load generator.
    #[must_use]
    pub const fn server_paired(flags: FlagMapping, pairing: ServerPairing) -> Self {
        Self {
            flags,
            pairing: Some(pairing),
        }
    }

    /// Check the flag mappings themselves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a broken mapping, or a paired mapping
    /// that cannot receive the address and port.
    pub fn validate_mappings(&self) -> Result<()> {
        self.flags.validate()?;
        if let Some(pairing) = &self.pairing {
            pairing.load_flags.validate()?;
            for (mapping, role) in [(&self.flags, "server"), (&pairing.load_flags, "load generator")] {
                for param in [ADDRESS_PARAM, PORT_PARAM] {
                    if !mapping.contains(param) {
                        return Err(Error::Config(format!(
                            "{role} flag mapping has no `{param}` entry"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn transient_command(&self, spec: &RunSpec<'_>) -> Result<CommandLine> {
        let subject = spec.subject();
        let args = self.flags.render(&spec.params(), subject.label())?;
        Ok(CommandLine::new(subject.program().display().to_string())
            .args(subject.leading_args().iter().cloned())
            .args(args))
    }

    fn paired_commands(
        &self,
        spec: &RunSpec<'_>,
        pairing: &ServerPairing,
        port: u16,
    ) -> Result<(CommandLine, CommandLine)> {
        let subject = spec.subject();
        let mut server = ParamMap::new();
        let mut load = ParamMap::new();

        for (name, value) in spec.params() {
            let for_server = self.flags.contains(&name);
            let for_load = pairing.load_flags.contains(&name);
            if !for_server && !for_load {
                return Err(Error::UnknownParameter {
                    param: name,
                    target: subject.label().to_string(),
                });
            }
            if for_load {
                load.insert(name.clone(), value.clone());
            }
            if for_server {
                server.insert(name, value);
            }
        }

        let port = Scalar::Int(i64::from(port));
        server.insert(ADDRESS_PARAM.into(), Scalar::Text(pairing.bind_address.clone()));
        server.insert(PORT_PARAM.into(), port.clone());
        load.insert(ADDRESS_PARAM.into(), Scalar::Text(pairing.connect_address.clone()));
        load.insert(PORT_PARAM.into(), port);

        let server_args = self.flags.render(&server, subject.label())?;
        let load_args = pairing.load_flags.render(&load, "load generator")?;

        Ok((
            CommandLine::new(subject.program().display().to_string())
                .args(subject.leading_args().iter().cloned())
                .args(server_args),
            CommandLine::new(pairing.load_generator.display().to_string())
                .args(pairing.load_generator_args.iter().cloned())
                .args(load_args),
        ))
    }

    fn invoke_transient(
        &self,
        spec: &RunSpec<'_>,
        placement: &Placement,
        timeout: Option<Duration>,
    ) -> Result<RawOutput> {
        let command = placement.apply(Role::Subject, self.transient_command(spec)?);
        let commands = vec![command.to_string()];
        info!(command = %command, "running subject");

        let captured = process::run_captured(&command, timeout)
            .map_err(|e| e.into_error(spec.context(commands.clone())))?;

        if !captured.status.success() {
            return Err(Error::SubjectFailure {
                context: Box::new(spec.context(commands)),
                status: captured.status.to_string(),
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }

        debug!(bytes = captured.stdout.len(), "subject report captured");
        Ok(RawOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
            commands,
        })
    }

    fn invoke_paired(
        &self,
        spec: &RunSpec<'_>,
        pairing: &ServerPairing,
        placement: &Placement,
        timeout: Option<Duration>,
    ) -> Result<RawOutput> {
        let port = spec
            .port()
            .ok_or_else(|| Error::Config("server-paired invocation without a port".into()))?;
        let (server_cmd, load_cmd) = self.paired_commands(spec, pairing, port)?;
        let server_cmd = placement.apply(Role::Subject, server_cmd);
        let load_cmd = placement.apply(Role::LoadGenerator, load_cmd);
        let commands = vec![server_cmd.to_string(), load_cmd.to_string()];

        let mut server = process::ServerGuard::spawn(&server_cmd, pairing.grace()).map_err(
            |source| Error::Spawn {
                context: Box::new(spec.context(commands.clone())),
                source,
            },
        )?;
        info!(command = %server_cmd, pid = server.pid(), port, "server started");

        thread::sleep(pairing.settle());

        match server.try_wait() {
            Ok(Some(status)) => {
                let stderr = server.shutdown().unwrap_or_default();
                return Err(Error::SubjectFailure {
                    context: Box::new(spec.context(commands)),
                    status: format!("server exited early: {status}"),
                    stdout: String::new(),
                    stderr,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not poll server status"),
        }

        info!(command = %load_cmd, "running load generator");
        let result = process::run_captured(&load_cmd, timeout);

        // Stop the server before anything else, whatever the load generator did.
        if let Err(e) = server.shutdown() {
            warn!(error = %e, port, "failed to terminate server");
        }

        let captured = result.map_err(|e| e.into_error(spec.context(commands.clone())))?;
        if !captured.status.success() {
            return Err(Error::SubjectFailure {
                context: Box::new(spec.context(commands)),
                status: format!("load generator exited with {}", captured.status),
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }

        Ok(RawOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
            commands,
        })
    }
}

impl Invoke for ProcessInvoker {
    fn is_paired(&self) -> bool {
        self.pairing.is_some()
    }

    fn validate(&self, spec: &RunSpec<'_>) -> Result<()> {
        match &self.pairing {
            None => self.transient_command(spec).map(drop),
            Some(pairing) => {
                let port = spec.port().unwrap_or(0);
                self.paired_commands(spec, pairing, port).map(drop)
            }
        }
    }

    fn invoke(
        &mut self,
        spec: &RunSpec<'_>,
        placement: &Placement,
        timeout: Option<Duration>,
    ) -> Result<RawOutput> {
        match &self.pairing {
            None => self.invoke_transient(spec, placement, timeout),
            Some(pairing) => self.invoke_paired(spec, pairing, placement, timeout),
        }
    }
}
