//! Container listing and log retrieval
//!
//! Containers belonging to the deployment are recognized by their `name`
//! label, which the service-definition files set to one of
//! [`SERVICE_NAMES`].

use crate::probe::RUNTIME_PROGRAM;
use anyhow::{Context, Result};
use bloodhound_core::process::{self, CommandSpec};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// `name` labels of the managed services
pub const SERVICE_NAMES: [&str; 3] = ["bhce_bloodhound", "bhce_neo4j", "bhce_postgres"];

/// Prefix shared by every managed service name
pub const SERVICE_PREFIX: &str = "bhce_";

/// Selects every managed service in [`fetch_logs`]
pub const ALL_SERVICES: &str = "all";

/// Default number of log lines per container
pub const DEFAULT_LOG_LINES: u32 = 500;

const PS_FORMAT: &str = "{{.ID}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}\t{{.Label \"name\"}}";

/// A container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub image: String,
    pub status: String,
    pub ports: String,
    /// Value of the `name` label, empty when unlabeled
    pub service: String,
}

/// Read access to the container runtime
pub trait ContainerRuntime {
    /// Running containers, or every container when `all` is set
    fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;
    /// The last `lines` lines of stdout and stderr, interleaved as text
    fn logs(&self, id: &str, lines: u32) -> Result<String>;
}

/// Talks to the runtime through the `docker` CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerCli;

impl ContainerRuntime for DockerCli {
    fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut args = vec!["ps"];
        if all {
            args.push("-a");
        }
        args.extend(["--format", PS_FORMAT]);

        let output = process::run_basic(RUNTIME_PROGRAM, &args)
            .context("Failed to get the container list from Docker")?;
        Ok(parse_ps_output(&output))
    }

    fn logs(&self, id: &str, lines: u32) -> Result<String> {
        let tail = lines.to_string();
        let spec = CommandSpec::new(RUNTIME_PROGRAM).args(["logs", "--tail", tail.as_str(), id]);
        let sink = Arc::new(Mutex::new(Vec::new()));
        process::run_streaming_to(&spec, Arc::clone(&sink))
            .with_context(|| format!("Failed to get the logs of container {}", id))?;

        let captured = match sink.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(String::from_utf8_lossy(&captured).into_owned())
    }
}

/// Parse `docker ps` output produced with the tab-separated list format
pub fn parse_ps_output(output: &str) -> Vec<ContainerSummary> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            let field = |i: usize| parts.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
            ContainerSummary {
                id: field(0),
                image: field(1),
                status: field(2),
                ports: field(3),
                service: field(4),
            }
        })
        .collect()
}

pub fn is_managed(service: &str) -> bool {
    SERVICE_NAMES.contains(&service)
}

/// Whether a container labeled `service` answers to `requested`
///
/// `requested` may be the full label, the label without its `bhce_`
/// prefix, or `all` for every managed service.
pub fn matches_service(service: &str, requested: &str) -> bool {
    if requested == ALL_SERVICES {
        return is_managed(service);
    }
    !service.is_empty()
        && (service == requested
            || service.strip_prefix(SERVICE_PREFIX) == Some(requested))
}

/// Containers of the managed services, sorted by image
///
/// Stopped containers are included only when `all` is set.
pub fn running_services(runtime: &dyn ContainerRuntime, all: bool) -> Result<Vec<ContainerSummary>> {
    let mut running: Vec<ContainerSummary> = runtime
        .list_containers(all)?
        .into_iter()
        .filter(|c| is_managed(&c.service))
        .collect();
    running.sort_by(|a, b| a.image.cmp(&b.image));
    Ok(running)
}

/// Logs of one running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLogs {
    pub service: String,
    pub text: String,
}

/// Fetch the last `lines` log lines of every running container matching `requested`
pub fn fetch_logs(
    runtime: &dyn ContainerRuntime,
    requested: &str,
    lines: u32,
) -> Result<Vec<ServiceLogs>> {
    let mut sections = Vec::new();
    for container in runtime.list_containers(false)? {
        if !matches_service(&container.service, requested) {
            continue;
        }
        debug!(id = %container.id, service = %container.service, lines, "fetching logs");
        let text = runtime.logs(&container.id, lines)?;
        sections.push(ServiceLogs {
            service: container.service,
            text,
        });
    }
    Ok(sections)
}
