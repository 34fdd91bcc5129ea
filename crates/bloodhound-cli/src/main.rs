//! bloodhound-cli - install and operate BloodHound Community Edition
//!
//! Commands:
//! - check: verify Docker and Compose, fetch the service files
//! - config: show, read, or change the JSON configuration
//! - install / uninstall: first-time setup and complete removal
//! - update: pull the latest container images
//! - resetpwd: issue a new default admin password
//! - logs: show container logs
//! - containers: build, up, down, start, stop, restart, running
//! - version: local and latest released versions

use anyhow::Result;
use bloodhound_core::format::truncate;
use bloodhound_core::{Colors, Paths};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use bloodhound_cli::containers::{self, DEFAULT_LOG_LINES};
use bloodhound_cli::orchestrator::UninstallOutcome;
use bloodhound_cli::probe::{self, ProbeMode};
use bloodhound_cli::remote::{self, RELEASES_URL};
use bloodhound_cli::{
    local_version_label, AdminLogin, ComposeAction, ConfigStore, DockerCli, HttpFetcher,
    Orchestrator, Prompter, ServiceFiles, StreamingRunner, SystemHost, VERSION,
};

#[derive(Parser)]
#[command(name = "bloodhound-cli")]
#[command(about = "Install and manage BloodHound Community Edition with Docker Compose")]
#[command(version = VERSION)]
#[command(after_help = r#"EXAMPLES:
    bloodhound-cli install                  # Fetch the YAML files, pull images, start
    bloodhound-cli containers running       # What is up right now
    bloodhound-cli logs neo4j -l 100        # Last 100 lines from the graph database
    bloodhound-cli config get default_password
    bloodhound-cli -f ./custom.yml containers up

CONFIGURATION:
    Settings live in bloodhound.config.json inside the config directory
    (CONFIG_DIRECTORY, or the user config dir + /bloodhound). Any key can be
    overridden for one run with its upper-cased name, e.g. BIND_ADDR.
"#)]
struct Cli {
    /// Use this service-definition YAML file instead of the one in the config directory
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check Docker and Compose, and download any missing YAML files
    Check,

    /// Display or change the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Fetch the YAML files, pull the images, and bring everything up
    Install,

    /// Remove all containers, images, and volumes
    Uninstall,

    /// Pull the latest container images
    Update,

    /// Generate a new default admin password and recreate the account
    Resetpwd,

    /// Show logs of a service container ("all" for every service)
    Logs {
        /// Service name, with or without the bhce_ prefix
        container: String,

        /// Number of lines to display per container
        #[arg(short, long, default_value_t = DEFAULT_LOG_LINES)]
        lines: u32,
    },

    /// Manage the service containers
    Containers {
        #[command(subcommand)]
        action: ContainerAction,
    },

    /// Show the local and the latest released version
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set { key: String, value: String },

    /// Print one or more configuration values
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ContainerAction {
    /// Bring down, rebuild, and bring up the containers
    Build,
    /// Bring up the containers in the background
    Up,
    /// Bring down the containers
    Down {
        /// Also delete the data volumes
        #[arg(long)]
        volumes: bool,
    },
    Start,
    Stop,
    Restart,
    /// List the running service containers
    Running {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },
}

fn main() {
    // Logs go to stderr; stdout carries compose output and JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let colors = Colors::new();

    if let Err(e) = run(cli, &colors) {
        eprintln!("{}error:{} {:#}", colors.red, colors.reset, e);
        std::process::exit(1);
    }
}

fn run(cli: Cli, colors: &Colors) -> Result<()> {
    if let Commands::Version = cli.command {
        return cmd_version(colors);
    }

    let paths = Paths::new()?;
    let mut store = ConfigStore::open(paths.config_dir())?;
    let file = cli.file;

    match cli.command {
        Commands::Check => orchestrate(&mut store, ProbeMode::Bootstrap, file, colors, |o| {
            cmd_check(o, colors)
        }),
        Commands::Config { action } => cmd_config(&mut store, action, colors),
        Commands::Install => orchestrate(&mut store, ProbeMode::Bootstrap, file, colors, |o| {
            println!("{}info:{} Starting BloodHound environment installation", colors.blue, colors.reset);
            let fetcher = HttpFetcher::new()?;
            let login = o.install(&fetcher, &mut Prompter::stdio())?;
            print_login(&login, colors);
            Ok(())
        }),
        Commands::Uninstall => orchestrate(&mut store, ProbeMode::Bootstrap, file, colors, |o| {
            cmd_uninstall(o, colors)
        }),
        Commands::Update => orchestrate(&mut store, ProbeMode::Standard, file, colors, |o| {
            println!("{}info:{} Checking for BloodHound image updates...", colors.blue, colors.reset);
            o.pull()
        }),
        Commands::Resetpwd => orchestrate(&mut store, ProbeMode::Standard, file, colors, |o| {
            println!("{}info:{} Resetting the default admin password...", colors.blue, colors.reset);
            let login = o.reset_admin_password()?;
            print_login(&login, colors);
            Ok(())
        }),
        Commands::Logs { container, lines } => cmd_logs(&container, lines, colors),
        Commands::Containers { action } => cmd_containers(&mut store, action, file, colors),
        Commands::Version => cmd_version(colors),
    }
}

/// Probe the host, then hand an orchestrator for the resolved service file to `op`
fn orchestrate<T>(
    store: &mut ConfigStore,
    mode: ProbeMode,
    file: Option<PathBuf>,
    colors: &Colors,
    op: impl FnOnce(&mut Orchestrator<'_>) -> Result<T>,
) -> Result<T> {
    let capability = check_host(mode, colors)?;
    let files = ServiceFiles::new(store.config_dir(), file);
    let runner = StreamingRunner;
    let announce = |action: ComposeAction, tool: &str, path: &Path| {
        println!(
            "{}info:{} Running `{}` to {} with {}...",
            colors.blue,
            colors.reset,
            tool,
            action.describe(),
            path.display()
        );
    };

    let mut orchestrator =
        Orchestrator::new(store, capability, files, &runner)?.with_announce(&announce);
    op(&mut orchestrator)
}

fn check_host(mode: ProbeMode, colors: &Colors) -> Result<probe::Capability> {
    println!(
        "{}info:{} Checking the status of Docker and the Compose plugin...",
        colors.blue, colors.reset
    );
    let capability = probe::probe(&SystemHost, mode)?;
    println!(
        "{}ok:{} Docker and the Compose plugin checks have passed ({})",
        colors.green,
        colors.reset,
        capability.invocation.name()
    );
    Ok(capability)
}

fn cmd_check(orchestrator: &mut Orchestrator<'_>, colors: &Colors) -> Result<()> {
    println!("{}info:{} Checking for the Docker YAML files...", colors.blue, colors.reset);
    let fetcher = HttpFetcher::new()?;
    let summary = orchestrator.check(&fetcher, &mut Prompter::stdio())?;

    for path in &summary.downloaded {
        println!("{}ok:{} Downloaded {}", colors.green, colors.reset, path.display());
    }
    for path in &summary.kept {
        println!("{}info:{} Kept the existing {}", colors.blue, colors.reset, path.display());
    }
    Ok(())
}

fn cmd_config(store: &mut ConfigStore, action: Option<ConfigAction>, colors: &Colors) -> Result<()> {
    match action {
        None => {
            println!("{}", store.get_all()?);
        }
        Some(ConfigAction::Get { keys }) => {
            for entry in store.get(&keys)? {
                println!("{}{}{}\t{}", colors.bold, entry.key, colors.reset, entry.value);
            }
        }
        Some(ConfigAction::Set { key, value }) => {
            let entry = store.set(&key, &value)?;
            let kind = if entry.value.as_bool().is_some() { "boolean " } else { "" };
            println!(
                "{}ok:{} Set {} to {}{} in {}",
                colors.green,
                colors.reset,
                entry.key,
                kind,
                entry.value,
                store.path().display()
            );
        }
    }
    Ok(())
}

fn cmd_uninstall(orchestrator: &mut Orchestrator<'_>, colors: &Colors) -> Result<()> {
    println!("{}info:{} Starting BloodHound environment removal", colors.blue, colors.reset);
    match orchestrator.uninstall(&mut Prompter::stdio())? {
        UninstallOutcome::Cancelled => {
            println!("Uninstall cancelled, nothing was removed");
        }
        UninstallOutcome::ContainersRemoved => {
            println!("{}ok:{} Uninstall was successful", colors.green, colors.reset);
        }
        UninstallOutcome::ConfigDirectoryRemoved(dir) => {
            println!(
                "{}ok:{} Successfully deleted the BloodHound config directory {}",
                colors.green,
                colors.reset,
                dir.display()
            );
            println!("{}ok:{} Uninstall was successful. You can re-install with `bloodhound-cli install`", colors.green, colors.reset);
            println!("The config directory and JSON config file will be recreated if you continue using BloodHound CLI.");
        }
    }
    Ok(())
}

fn cmd_containers(
    store: &mut ConfigStore,
    action: ContainerAction,
    file: Option<PathBuf>,
    colors: &Colors,
) -> Result<()> {
    if let ContainerAction::Running { all } = action {
        return cmd_running(all, colors);
    }

    orchestrate(store, ProbeMode::Standard, file, colors, |o| match action {
        ContainerAction::Build => {
            o.rebuild()?;
            println!("{}ok:{} All containers have been built!", colors.green, colors.reset);
            Ok(())
        }
        ContainerAction::Up => o.up(),
        ContainerAction::Down { volumes } => o.down(volumes),
        ContainerAction::Start => o.start(),
        ContainerAction::Stop => o.stop(),
        ContainerAction::Restart => o.restart(),
        ContainerAction::Running { .. } => Ok(()),
    })
}

fn cmd_running(all: bool, colors: &Colors) -> Result<()> {
    check_host(ProbeMode::Standard, colors)?;
    let running = containers::running_services(&DockerCli, all)?;

    println!("{}BloodHound Containers{}", colors.bold, colors.reset);
    println!();

    if running.is_empty() {
        println!("No BloodHound containers are running. Start them with: bloodhound-cli containers up");
        return Ok(());
    }

    println!(
        "{:<14} {:<40} {:<25} {:<30} {}",
        "ID", "IMAGE", "STATUS", "PORTS", "NAME"
    );
    println!("{}", "-".repeat(125));
    for c in &running {
        println!(
            "{:<14} {:<40} {:<25} {:<30} {}",
            truncate(&c.id, 12),
            truncate(&c.image, 38),
            truncate(&c.status, 23),
            truncate(&c.ports, 28),
            c.service
        );
    }
    Ok(())
}

fn cmd_logs(container: &str, lines: u32, colors: &Colors) -> Result<()> {
    check_host(ProbeMode::Standard, colors)?;
    println!(
        "{}info:{} Fetching up to {} lines of logs for `{}`...",
        colors.blue, colors.reset, lines, container
    );

    let sections = containers::fetch_logs(&DockerCli, container, lines)?;
    if sections.is_empty() {
        println!("\n*** No logs found for requested container '{}' ***", container);
        return Ok(());
    }

    for section in sections {
        println!("\n{}*** Logs for `{}` ***{}\n", colors.bold, section.service, colors.reset);
        print!("{}", section.text);
    }
    Ok(())
}

fn cmd_version(colors: &Colors) -> Result<()> {
    let fetcher = HttpFetcher::new()?;
    let stdout = std::io::stdout();
    remote::write_version_report(
        &fetcher,
        RELEASES_URL,
        &local_version_label(),
        colors,
        &mut stdout.lock(),
    )
}

fn print_login(login: &AdminLogin, colors: &Colors) {
    println!("{}ok:{} BloodHound is ready to go!", colors.green, colors.reset);
    println!(
        "{}info:{} You can log in as `{}` with this password: {}",
        colors.blue, colors.reset, login.principal, login.password
    );
    println!(
        "{}info:{} You can get your admin password by running: bloodhound-cli config get default_password",
        colors.blue, colors.reset
    );
    println!(
        "{}info:{} You can access the BloodHound UI at: {}",
        colors.blue, colors.reset, login.url
    );
}
