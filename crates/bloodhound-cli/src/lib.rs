//! BloodHound CLI library
//!
//! Installs and operates a BloodHound Community Edition deployment (the
//! application server plus its graph and relational databases) by driving
//! Docker Compose against downloaded service-definition files.
//!
//! Every command follows the same path: the host is probed for Docker and a
//! compose implementation, the service-definition file is resolved, and the
//! matching compose invocation is streamed to the console.

pub mod config;
pub mod containers;
pub mod orchestrator;
pub mod probe;
pub mod prompt;
pub mod remote;
pub mod service_files;

pub use config::{ConfigEntry, ConfigError, ConfigStore, ConfigValue};
pub use containers::{ContainerRuntime, ContainerSummary, DockerCli};
pub use orchestrator::{AdminLogin, CommandRunner, ComposeAction, Orchestrator, StreamingRunner};
pub use probe::{Capability, ComposeInvocation, ProbeError, ProbeMode, SystemHost};
pub use prompt::{Confirm, Prompter};
pub use remote::{Fetch, HttpFetcher, RemoteError};
pub use service_files::{ServiceFileError, ServiceFiles};

/// Version of this CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped in by the release pipeline, if any
pub const BUILD_DATE: Option<&str> = option_env!("BLOODHOUND_CLI_BUILD_DATE");

/// Version line for this build, with the build date when one was stamped in
pub fn local_version_label() -> String {
    match BUILD_DATE {
        Some(date) => format!("BloodHound CLI v{} ({})", VERSION, date),
        None => format!("BloodHound CLI v{}", VERSION),
    }
}
