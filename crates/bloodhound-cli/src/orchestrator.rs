//! Orchestration of the deployment through Compose
//!
//! Every named operation maps to a fixed sequence of compose invocations.
//! The first failing invocation aborts the rest of the sequence and nothing
//! already done is rolled back.

use crate::config::{ConfigStore, PASSWORD_KEY, PRINCIPAL_NAME_KEY, ROOT_URL_KEY};
use crate::probe::Capability;
use crate::prompt::Confirm;
use crate::remote::Fetch;
use crate::service_files::{FetchSummary, ServiceFiles};
use anyhow::{Context, Result};
use bloodhound_core::process::{self, CommandSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Tells the application server to recreate its default admin account on start
pub const RECREATE_ADMIN_ENV: &str = "bhe_recreate_default_admin";

/// Appended to `root_url` to form the login page address
pub const LOGIN_PATH: &str = "/ui/login";

/// Runs a fully built external command
pub trait CommandRunner {
    fn run(&self, command: &CommandSpec) -> Result<()>;
}

/// Streams the command's output to the console
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingRunner;

impl CommandRunner for StreamingRunner {
    fn run(&self, command: &CommandSpec) -> Result<()> {
        process::run_streaming(command)
    }
}

/// A single compose subcommand with its fixed flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Pull,
    Up,
    Down { volumes: bool },
    /// Remove containers, images, volumes, and orphans
    Purge,
    Build,
    Start,
    Stop,
    Restart,
}

impl ComposeAction {
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            ComposeAction::Pull => &["pull"],
            ComposeAction::Up => &["up", "-d"],
            ComposeAction::Down { volumes: false } => &["down"],
            ComposeAction::Down { volumes: true } => &["down", "--volumes"],
            ComposeAction::Purge => &["down", "--rmi", "all", "-v", "--remove-orphans"],
            ComposeAction::Build => &["build"],
            ComposeAction::Start => &["start"],
            ComposeAction::Stop => &["stop"],
            ComposeAction::Restart => &["restart"],
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ComposeAction::Pull => "pull the container images",
            ComposeAction::Up => "bring up the containers",
            ComposeAction::Down { volumes: false } => "bring down the containers",
            ComposeAction::Down { volumes: true } => "bring down the containers and their volumes",
            ComposeAction::Purge => "remove the containers, images, and volumes",
            ComposeAction::Build => "build the containers",
            ComposeAction::Start => "start the containers",
            ComposeAction::Stop => "stop the services",
            ComposeAction::Restart => "restart the containers",
        }
    }
}

/// Where and how to log in once the services are up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminLogin {
    pub principal: String,
    pub password: String,
    pub url: String,
}

impl AdminLogin {
    pub fn from_store(store: &ConfigStore) -> Self {
        let root = store.get_string(ROOT_URL_KEY);
        Self {
            principal: store.get_string(PRINCIPAL_NAME_KEY),
            password: store.get_string(PASSWORD_KEY),
            url: format!("{}{}", root.trim_end_matches('/'), LOGIN_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    /// The operator backed out before anything ran
    Cancelled,
    /// Containers, images, and volumes are gone; the config directory stays
    ContainersRemoved,
    ConfigDirectoryRemoved(PathBuf),
}

/// Announces each compose invocation before it runs
pub type Announce<'a> = &'a dyn Fn(ComposeAction, &str, &Path);

/// Named deployment operations for one CLI invocation
pub struct Orchestrator<'a> {
    store: &'a mut ConfigStore,
    capability: Capability,
    files: ServiceFiles,
    runner: &'a dyn CommandRunner,
    announce: Option<Announce<'a>>,
}

impl<'a> Orchestrator<'a> {
    /// Set up an orchestrator, checking the service file unless in bootstrap mode
    pub fn new(
        store: &'a mut ConfigStore,
        capability: Capability,
        files: ServiceFiles,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self> {
        if capability.requires_service_files() {
            ServiceFiles::require(&files.resolve()?)?;
        }
        Ok(Self {
            store,
            capability,
            files,
            runner,
            announce: None,
        })
    }

    pub fn with_announce(mut self, announce: Announce<'a>) -> Self {
        self.announce = Some(announce);
        self
    }

    /// Resolved service file, which must exist
    pub fn service_file(&self) -> Result<PathBuf> {
        let path = self.files.resolve()?;
        ServiceFiles::require(&path)?;
        Ok(path)
    }

    /// Fetch the service files, asking before replacing existing ones
    pub fn check(&self, fetcher: &dyn Fetch, confirm: &mut dyn Confirm) -> Result<FetchSummary> {
        self.files.fetch(fetcher, confirm)
    }

    /// First-time setup: fetch the service files, pull images, start everything
    pub fn install(&self, fetcher: &dyn Fetch, confirm: &mut dyn Confirm) -> Result<AdminLogin> {
        self.files.fetch(fetcher, confirm)?;
        let path = self.service_file()?;
        self.compose(&path, ComposeAction::Pull, &[])?;
        self.compose(&path, ComposeAction::Up, &[])?;
        Ok(self.admin_login())
    }

    pub fn rebuild(&self) -> Result<()> {
        let path = self.service_file()?;
        for action in [
            ComposeAction::Down { volumes: false },
            ComposeAction::Build,
            ComposeAction::Up,
        ] {
            self.compose(&path, action, &[])?;
        }
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.single(ComposeAction::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.single(ComposeAction::Stop)
    }

    pub fn restart(&self) -> Result<()> {
        self.single(ComposeAction::Restart)
    }

    pub fn up(&self) -> Result<()> {
        self.single(ComposeAction::Up)
    }

    pub fn down(&self, volumes: bool) -> Result<()> {
        self.single(ComposeAction::Down { volumes })
    }

    pub fn pull(&self) -> Result<()> {
        self.single(ComposeAction::Pull)
    }

    /// Remove every container, image, and volume, then optionally the config directory
    pub fn uninstall(&self, confirm: &mut dyn Confirm) -> Result<UninstallOutcome> {
        if !confirm.confirm(
            "This command removes all containers, images, and volume data. Are you sure you want to uninstall?",
        )? {
            return Ok(UninstallOutcome::Cancelled);
        }

        let path = self.service_file()?;
        self.compose(&path, ComposeAction::Purge, &[])?;

        let dir = self.store.config_dir();
        let question = format!(
            "Do you want to also delete the config directory, {}, and its contents?",
            dir.display()
        );
        if !confirm.confirm(&question)? {
            return Ok(UninstallOutcome::ContainersRemoved);
        }

        fs::remove_dir_all(&dir).with_context(|| {
            format!("Error trying to delete the config directory {}", dir.display())
        })?;
        info!(dir = %dir.display(), "config directory removed");
        Ok(UninstallOutcome::ConfigDirectoryRemoved(dir))
    }

    /// Bring services down, issue a new admin credential, and recreate the account
    pub fn reset_admin_password(&mut self) -> Result<AdminLogin> {
        let path = self.service_file()?;
        self.compose(&path, ComposeAction::Down { volumes: false }, &[])?;

        self.store
            .regenerate_password()
            .context("Failed to store the new admin password")?;

        self.compose(&path, ComposeAction::Up, &[(RECREATE_ADMIN_ENV, "true")])?;
        Ok(self.admin_login())
    }

    pub fn admin_login(&self) -> AdminLogin {
        AdminLogin::from_store(&*self.store)
    }

    fn single(&self, action: ComposeAction) -> Result<()> {
        let path = self.service_file()?;
        self.compose(&path, action, &[])
    }

    fn compose(&self, path: &Path, action: ComposeAction, extra_env: &[(&str, &str)]) -> Result<()> {
        let invocation = self.capability.invocation;
        if let Some(announce) = self.announce {
            announce(action, invocation.name(), path);
        }

        let mut command = invocation
            .command(path)
            .args(action.args().iter().copied())
            .current_dir(self.store.config_dir());
        for (key, value) in self.store.env_exports() {
            command = command.env(key, value);
        }
        for (key, value) in extra_env {
            command = command.env(*key, *value);
        }

        info!(command = %command.display(), "running compose");
        self.runner.run(&command).with_context(|| {
            format!("Error trying to {} with {}", action.describe(), path.display())
        })
    }
}
