//! Host capability probing
//!
//! Before anything touches the service-definition files we make sure Docker
//! is installed, its daemon answers, and some flavor of Compose is present.
//! The Compose v2 plugin (`docker compose`) is preferred; the legacy
//! standalone `docker-compose` script is the one-time fallback.

use anyhow::{bail, Result};
use bloodhound_core::process::{self, CommandSpec};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// The container runtime binary
pub const RUNTIME_PROGRAM: &str = "docker";

/// The legacy standalone Compose script
pub const LEGACY_COMPOSE_PROGRAM: &str = "docker-compose";

/// Environment problems that stop every command
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Docker is not installed on this system, so please install Docker and try again")]
    RuntimeMissing,

    #[error("Docker is installed on this system, but the daemon is not running")]
    DaemonUnreachable,

    #[error("Docker Compose is not installed, so please install it and try again: https://docs.docker.com/compose/install/")]
    ComposeMissing,
}

/// How Compose gets invoked on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeInvocation {
    /// `docker compose ...`
    Plugin,
    /// `docker-compose ...`
    Standalone,
}

impl ComposeInvocation {
    pub fn program(&self) -> &'static str {
        match self {
            ComposeInvocation::Plugin => RUNTIME_PROGRAM,
            ComposeInvocation::Standalone => LEGACY_COMPOSE_PROGRAM,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            ComposeInvocation::Plugin => "docker compose",
            ComposeInvocation::Standalone => "docker-compose",
        }
    }

    /// Command prefix targeting `compose_file`: `<tool> [compose] -f <file>`
    pub fn command(&self, compose_file: &Path) -> CommandSpec {
        let mut command = CommandSpec::new(self.program());
        if *self == ComposeInvocation::Plugin {
            command = command.arg("compose");
        }
        command
            .arg("-f")
            .arg(compose_file.to_string_lossy().into_owned())
    }
}

/// Whether a command may assume the service-definition files already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Service files must already be in place
    Standard,
    /// The command creates or removes the service files itself (install, uninstall, check)
    Bootstrap,
}

/// Outcome of a successful probe, held for the rest of the invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub invocation: ComposeInvocation,
    pub mode: ProbeMode,
}

impl Capability {
    pub fn requires_service_files(&self) -> bool {
        self.mode == ProbeMode::Standard
    }
}

/// What the prober needs to know about the host
pub trait Host {
    fn has_executable(&self, name: &str) -> bool;
    fn command_succeeds(&self, program: &str, args: &[&str]) -> bool;
}

/// The machine we are running on
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn has_executable(&self, name: &str) -> bool {
        process::is_available(name)
    }

    fn command_succeeds(&self, program: &str, args: &[&str]) -> bool {
        match process::run_basic(program, args) {
            Ok(_) => true,
            Err(e) => {
                debug!(program, ?args, error = %e, "probe command failed");
                false
            }
        }
    }
}

/// Check Docker, its daemon, and Compose, in that order
pub fn probe(host: &dyn Host, mode: ProbeMode) -> Result<Capability> {
    if !host.has_executable(RUNTIME_PROGRAM) {
        bail!(ProbeError::RuntimeMissing);
    }

    if !host.command_succeeds(RUNTIME_PROGRAM, &["info"]) {
        bail!(ProbeError::DaemonUnreachable);
    }

    let invocation = if host.command_succeeds(RUNTIME_PROGRAM, &["compose", "version"]) {
        ComposeInvocation::Plugin
    } else {
        info!("the `compose` plugin is not installed, trying the legacy `docker-compose` script");
        if !host.has_executable(LEGACY_COMPOSE_PROGRAM) {
            bail!(ProbeError::ComposeMissing);
        }
        ComposeInvocation::Standalone
    };

    debug!(invocation = invocation.name(), ?mode, "host capabilities resolved");
    Ok(Capability { invocation, mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeHost {
        executables: HashSet<&'static str>,
        succeeding: HashSet<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeHost {
        fn with_executable(mut self, name: &'static str) -> Self {
            self.executables.insert(name);
            self
        }

        fn with_success(mut self, line: &str) -> Self {
            self.succeeding.insert(line.to_string());
            self
        }
    }

    impl Host for FakeHost {
        fn has_executable(&self, name: &str) -> bool {
            self.calls.borrow_mut().push(format!("which {}", name));
            self.executables.contains(name)
        }

        fn command_succeeds(&self, program: &str, args: &[&str]) -> bool {
            let line = format!("{} {}", program, args.join(" "));
            self.calls.borrow_mut().push(line.clone());
            self.succeeding.contains(&line)
        }
    }

    fn healthy_docker() -> FakeHost {
        FakeHost::default()
            .with_executable("docker")
            .with_success("docker info")
    }

    #[test]
    fn test_prefers_compose_plugin() {
        let host = healthy_docker().with_success("docker compose version");
        let capability = probe(&host, ProbeMode::Standard).unwrap();

        assert_eq!(capability.invocation, ComposeInvocation::Plugin);
        assert!(capability.requires_service_files());
        assert!(!host.calls.borrow().contains(&"which docker-compose".to_string()));
    }

    #[test]
    fn test_falls_back_to_legacy_script() {
        let host = healthy_docker().with_executable("docker-compose");
        let capability = probe(&host, ProbeMode::Bootstrap).unwrap();

        assert_eq!(capability.invocation, ComposeInvocation::Standalone);
        assert!(!capability.requires_service_files());
    }

    #[test]
    fn test_missing_runtime_stops_first() {
        let host = FakeHost::default();
        let err = probe(&host, ProbeMode::Standard).unwrap_err();

        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::RuntimeMissing)));
        assert_eq!(host.calls.borrow().len(), 1);
    }

    #[test]
    fn test_daemon_down() {
        let host = FakeHost::default().with_executable("docker");
        let err = probe(&host, ProbeMode::Standard).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::DaemonUnreachable)));
    }

    #[test]
    fn test_no_compose_at_all() {
        let host = healthy_docker();
        let err = probe(&host, ProbeMode::Standard).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProbeError>(), Some(ProbeError::ComposeMissing)));
    }

    #[test]
    fn test_command_prefix() {
        let file = Path::new("/home/op/.config/bloodhound/docker-compose.yml");

        let plugin = ComposeInvocation::Plugin.command(file).arg("pull");
        assert_eq!(plugin.program, "docker");
        assert_eq!(
            plugin.args,
            vec!["compose", "-f", "/home/op/.config/bloodhound/docker-compose.yml", "pull"]
        );

        let legacy = ComposeInvocation::Standalone.command(file).arg("pull");
        assert_eq!(legacy.program, "docker-compose");
        assert_eq!(
            legacy.args,
            vec!["-f", "/home/op/.config/bloodhound/docker-compose.yml", "pull"]
        );
    }
}
