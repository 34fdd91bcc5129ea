//! Service-definition (Compose YAML) file management
//!
//! The YAML files normally live in the config directory. An operator can
//! point the container commands at another file with `--file`; that path
//! is validated but otherwise used as given.

use crate::prompt::Confirm;
use crate::remote::Fetch;
use anyhow::{bail, Context, Result};
use bloodhound_core::Paths;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Production Compose file
pub const PRODUCTION_FILE: &str = "docker-compose.yml";

/// Development Compose file
pub const DEVELOPMENT_FILE: &str = "docker-compose.dev.yml";

/// Where a managed YAML file is downloaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFileSource {
    pub label: &'static str,
    pub file_name: &'static str,
    pub url: &'static str,
}

pub const SOURCES: [ServiceFileSource; 2] = [
    ServiceFileSource {
        label: "production",
        file_name: PRODUCTION_FILE,
        url: "https://raw.githubusercontent.com/SpecterOps/BloodHound_CLI/refs/heads/main/docker-compose.yml",
    },
    ServiceFileSource {
        label: "development",
        file_name: DEVELOPMENT_FILE,
        url: "https://raw.githubusercontent.com/SpecterOps/BloodHound_CLI/refs/heads/main/docker-compose.dev.yml",
    },
];

#[derive(Error, Debug)]
pub enum ServiceFileError {
    #[error("The override path '{0}' does not exist")]
    OverrideMissing(PathBuf),

    #[error("The provided override path '{0}' is a directory instead of a YAML file")]
    OverrideIsDirectory(PathBuf),

    #[error("The YAML file {0} does not exist! To continue, move your YAML file into the config directory or run `bloodhound-cli check` to download the necessary YAML file")]
    Missing(PathBuf),
}

/// What a fetch did with each managed file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub downloaded: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
}

/// Locates and fetches the YAML files
#[derive(Debug, Clone)]
pub struct ServiceFiles {
    dir: PathBuf,
    override_path: Option<PathBuf>,
}

impl ServiceFiles {
    pub fn new(dir: impl Into<PathBuf>, override_path: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            override_path,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The production file inside the config directory
    pub fn default_path(&self) -> PathBuf {
        Paths::with_config_dir(&self.dir).service_file(PRODUCTION_FILE)
    }

    /// The file the container commands should use
    ///
    /// An override must exist and must not be a directory. It is returned
    /// as an absolute path because compose runs from the config directory.
    pub fn resolve(&self) -> Result<PathBuf> {
        let Some(path) = &self.override_path else {
            return Ok(self.default_path());
        };

        info!(path = %path.display(), "using the override file path");
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail!(ServiceFileError::OverrideMissing(path.clone()))
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("There was an error checking the override path '{}'", path.display())
                })
            }
        };
        if metadata.is_dir() {
            bail!(ServiceFileError::OverrideIsDirectory(path.clone()));
        }

        path.canonicalize()
            .with_context(|| format!("Failed to resolve the override path '{}'", path.display()))
    }

    /// Fail unless `path` is an existing regular file
    pub fn require(path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!(ServiceFileError::Missing(path.to_path_buf()));
        }
        Ok(())
    }

    /// Download every managed YAML file into the config directory
    ///
    /// Files already present are only replaced if the operator agrees.
    pub fn fetch(&self, fetcher: &dyn Fetch, confirm: &mut dyn Confirm) -> Result<FetchSummary> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).with_context(|| {
                format!("Failed to create the config directory {}", self.dir.display())
            })?;
        }

        let paths = Paths::with_config_dir(&self.dir);
        let mut summary = FetchSummary::default();
        for source in &SOURCES {
            let dest = paths.service_file(source.file_name);
            if dest.exists() {
                let question = format!(
                    "A {} YAML file already exists at {}. Do you want to overwrite it?",
                    source.label,
                    dest.display()
                );
                if !confirm.confirm(&question)? {
                    summary.kept.push(dest);
                    continue;
                }
            }

            info!(url = source.url, dest = %dest.display(), "downloading the {} YAML file", source.label);
            fetcher.download(source.url, &dest).with_context(|| {
                format!("Error trying to download the {} YAML file", source.label)
            })?;
            summary.downloaded.push(dest);
        }

        Ok(summary)
    }
}
