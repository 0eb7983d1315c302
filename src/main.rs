//! tutum-deploy - declarative deployments for the Tutum container cloud
//!
//! This is the main CLI entry point.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tutum_deploy::batch::Batch;
use tutum_deploy::config::{ConfigLoader, DeployConfig};
use tutum_deploy::context::{DeployContext, DeployOptions};
use tutum_deploy::error::{DeployError, Result};
use tutum_deploy::status;

/// Deploy clusters, nodes and services described in a tutum.yml file
#[derive(Parser)]
#[command(name = "tutum")]
#[command(version)]
#[command(about = "Declarative deployments for the Tutum container cloud", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// API host, overrides TUTUM_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, deploy and start everything in the configuration
    Up {
        /// Configuration file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Skip building and pushing images
        #[arg(long)]
        no_build: bool,
        /// Redeploy running services even without a new image
        #[arg(long)]
        redeploy: bool,
    },

    /// Show the remote state of everything in the configuration
    Ps {
        /// Configuration file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Build and push service images
    Build {
        /// Configuration file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Locate and load the configuration file
fn load_config(
    file: Option<PathBuf>,
    env: &HashMap<String, String>,
) -> Result<(DeployConfig, PathBuf)> {
    let path = match file {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir()?;
            ConfigLoader::find_config_file(&cwd).ok_or_else(|| {
                DeployError::ConfigRead(format!(
                    "no tutum.yaml or tutum.yml in {}",
                    cwd.display()
                ))
            })?
        }
    };

    tracing::debug!("using configuration file {}", path.display());

    let config = ConfigLoader::load(&path, env)?;
    let work_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((config, work_dir))
}

async fn run(cli: Cli) -> Result<()> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Commands::Up {
            file,
            no_build,
            redeploy,
        } => {
            let (mut config, work_dir) = load_config(file, &env)?;
            let options = DeployOptions {
                build: !no_build,
                force_redeploy: redeploy,
            };

            let batch = Batch::up(&config, &options);
            let mut ctx = DeployContext::from_env(&env, api_url, work_dir, options)?;
            batch.run(&mut ctx, &mut config).await?;

            tracing::info!("deployment successful");
        }

        Commands::Ps { file } => {
            let (mut config, work_dir) = load_config(file, &env)?;

            let batch = Batch::status(&config);
            let mut ctx =
                DeployContext::from_env(&env, api_url, work_dir, DeployOptions::default())?;
            batch.run(&mut ctx, &mut config).await?;

            print!("{}", status::render(&status::rows(&config)));
        }

        Commands::Build { file } => {
            let (mut config, work_dir) = load_config(file, &env)?;

            let batch = Batch::images(&config);
            if batch.is_empty() {
                tracing::info!("no service has a build path");
                return Ok(());
            }

            let mut ctx = DeployContext::local(work_dir, DeployOptions::default())?;
            batch.run(&mut ctx, &mut config).await?;

            tracing::info!("images built and pushed");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let is_up = matches!(cli.command, Commands::Up { .. });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if is_up {
                tracing::error!("deployment failed: {}", e);
            } else {
                tracing::error!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}
