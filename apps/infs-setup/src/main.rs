#![warn(clippy::pedantic)]

//! # Inference Toolchain Setup (infs-setup)
//!
//! `infs-setup` installs the `infs` toolchain from the published release
//! manifest and manages which version is active.
//!
//! ## Subcommands
//!
//! - `install` - Download, verify and install the newest release
//! - `update` - Switch to the newest version if one is available
//! - `select` - Make a specific version the default
//! - `versions` - List versions available for this platform
//! - `doctor` - Run the toolchain self-check
//! - `detect` - Print the `infs` binary in use and check its version
//!
//! ## Examples
//!
//! ```bash
//! infs-setup install
//! infs-setup --channel latest install
//! infs-setup select 0.2.0
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use commands::{detect, doctor, install, select, update, versions};
use inference_provisioner::{Channel, ProvisionConfig, Provisioner, config::releases_url};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Inference toolchain installer.
#[derive(Parser)]
#[command(
    name = "infs-setup",
    author,
    version,
    about = "Installs and manages the Inference toolchain",
    after_help = "\
BINARY DETECTION:
    The infs binary is located using the following priority order:
    1. INFS_PATH environment variable or --infs (explicit override)
    2. System PATH (via 'which infs')
    3. Managed location (~/.inference/bin/infs)

ENVIRONMENT VARIABLES:
    INFERENCE_HOME          Toolchain directory (default: ~/.inference)
    INFS_DIST_SERVER        Distribution server URL (default: https://inference-lang.org)
    INFS_CHANNEL            Release channel: stable or latest (default: stable)
    INFS_PATH               Explicit path to the infs binary
    RUST_LOG                Log filter (default: warn)"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand. Each overrides its environment
/// variable.
#[derive(Args)]
pub struct GlobalArgs {
    /// Release channel (`stable` or `latest`).
    #[clap(long, global = true)]
    pub channel: Option<String>,

    /// Toolchain directory.
    #[clap(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Full URL of the release manifest.
    #[clap(long, global = true, value_name = "URL")]
    pub manifest_url: Option<String>,

    /// Distribution server root; `/releases.json` is appended.
    #[clap(long, global = true, value_name = "URL", conflicts_with = "manifest_url")]
    pub dist_server: Option<String>,

    /// Explicit path to the infs binary.
    #[clap(long, global = true, value_name = "PATH")]
    pub infs: Option<PathBuf>,

    /// Log progress details to stderr.
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    fn config(&self) -> Result<ProvisionConfig> {
        let mut config = ProvisionConfig::from_env().context("Failed to read configuration")?;
        if let Some(home) = &self.home {
            config.inference_home.clone_from(home);
        }
        if let Some(server) = &self.dist_server {
            config.manifest_url = releases_url(server);
        }
        if let Some(url) = &self.manifest_url {
            config.manifest_url.clone_from(url);
        }
        if let Some(channel) = &self.channel {
            config.channel = Channel::from_setting(channel);
        }
        if let Some(infs) = &self.infs {
            config.binary_override = Some(infs.clone());
        }
        Ok(config)
    }
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Install the newest toolchain release.
    ///
    /// Fetches the release manifest, downloads the archive for this
    /// platform, verifies its SHA-256 checksum, extracts it into
    /// INFERENCE_HOME/bin and runs 'infs install' and 'infs doctor'.
    Install,

    /// Update to the newest available version.
    ///
    /// Compares the active version with the versions the installed toolchain
    /// offers for this platform and switches to the newest one.
    Update,

    /// Make a specific version the default.
    ///
    /// Installs the version through the toolchain if needed, then sets it as
    /// the default.
    Select(select::SelectArgs),

    /// List versions available for this platform.
    Versions(versions::VersionsArgs),

    /// Run the toolchain self-check.
    Doctor,

    /// Print the path of the infs binary in use and check its version.
    Detect,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let provisioner = Provisioner::new(cli.global.config()?)?;

    match cli.command {
        Commands::Install => install::execute(&provisioner).await,
        Commands::Update => update::execute(&provisioner).await,
        Commands::Select(args) => select::execute(&provisioner, &args).await,
        Commands::Versions(args) => versions::execute(&provisioner, &args).await,
        Commands::Doctor => doctor::execute(&provisioner).await,
        Commands::Detect => detect::execute(&provisioner).await,
    }
}
