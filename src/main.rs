use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "dual")]
#[command(version, about = "Context-scoped ports and environment for git branches and worktrees")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Operate on this directory instead of the current one
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Context to operate on (defaults to the current git branch)
    #[arg(short, long, global = true)]
    pub context: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the .dual/ directory for this project
    Init,
    /// Manage contexts (branches/worktrees with reserved port blocks)
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },
    /// Print the port of one service in the current context
    Port {
        /// Service name from [services.<name>] in .dual/config.toml
        service: String,
    },
    /// Print the ports of every configured service in the current context
    Ports,
    /// Manage per-context environment overrides
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    /// Run a configured service with its port and environment applied
    Run {
        /// Service name from [services.<name>] in .dual/config.toml
        service: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show registry health for this project
    Status,
}

#[derive(Subcommand, Clone)]
pub enum ContextCommands {
    /// Register a new context and reserve a port block for it
    Create {
        /// Context name (defaults to the current git branch)
        name: Option<String>,
        /// Claim this base port instead of the next free block
        #[arg(long)]
        base_port: Option<u32>,
    },
    /// List the contexts of this project
    List,
    /// Show one context in detail, including its service ports
    Show {
        /// Context name (defaults to the current git branch)
        name: Option<String>,
    },
    /// Remove a context and free its port block
    Remove {
        /// Context name (defaults to the current git branch)
        name: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum EnvCommands {
    /// Set an override for the context (global, or one service with --service)
    Set {
        /// KEY=VALUE pair
        assignment: String,
        /// Apply only to this service
        #[arg(short, long)]
        service: Option<String>,
    },
    /// Remove an override
    Unset {
        key: String,
        /// Remove from this service's overrides instead of the globals
        #[arg(short, long)]
        service: Option<String>,
    },
    /// List the overrides of the context
    List,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default config.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Context { command } => match command {
            ContextCommands::Create { name, base_port } => {
                let name = name.as_deref().or(cli.context.as_deref());
                cmd::cmd_context_create(&project_dir, name, *base_port).await?;
            }
            ContextCommands::List => cmd::cmd_context_list(&project_dir)?,
            ContextCommands::Show { name } => {
                let name = name.as_deref().or(cli.context.as_deref());
                cmd::cmd_context_show(&project_dir, name)?;
            }
            ContextCommands::Remove { name, force } => {
                let name = name.as_deref().or(cli.context.as_deref());
                cmd::cmd_context_remove(&project_dir, name, *force).await?;
            }
        },
        Commands::Port { service } => {
            cmd::cmd_port(&project_dir, cli.context.as_deref(), service)?;
        }
        Commands::Ports => cmd::cmd_ports(&project_dir, cli.context.as_deref())?,
        Commands::Env { command } => match command {
            EnvCommands::Set {
                assignment,
                service,
            } => {
                cmd::cmd_env_set(
                    &project_dir,
                    cli.context.as_deref(),
                    assignment,
                    service.as_deref(),
                )?;
            }
            EnvCommands::Unset { key, service } => {
                cmd::cmd_env_unset(&project_dir, cli.context.as_deref(), key, service.as_deref())?;
            }
            EnvCommands::List => cmd::cmd_env_list(&project_dir, cli.context.as_deref())?,
        },
        Commands::Run { service } => {
            let code = cmd::cmd_run(&project_dir, cli.context.as_deref(), service).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::Status => cmd::cmd_status(&project_dir)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "dual=debug" } else { "dual=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
