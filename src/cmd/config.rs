//! Configuration view and validation commands — `dual config`.

use anyhow::Result;
use console::style;
use std::path::Path;

use dual::dual_config::{DualToml, config_path, dual_dir};
use dual::errors::ProjectError;
use dual::project::resolve_project_identity;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let root = match resolve_project_identity(project_dir) {
        Ok(identity) => identity,
        Err(ProjectError::NotAGitRepository { .. }) => project_dir.to_path_buf(),
        Err(err) => return Err(err.into()),
    };
    let path = config_path(&root);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("dual Configuration");
            println!("==================");
            println!();

            if !path.exists() {
                println!("No config.toml found at {}", path.display());
                println!();
                println!("Using default configuration:");
                let cfg = DualToml::default();
                print_defaults(&cfg);
                println!();
                println!("Run 'dual config init' to create a config.toml file.");
                println!();
                return Ok(());
            }

            println!("Config file: {}", path.display());
            println!();
            let cfg = DualToml::load(&path)?;

            if let Some(name) = &cfg.project.name {
                println!("[project]");
                println!("  name = \"{name}\"");
                println!();
            }

            print_defaults(&cfg);
            println!();

            if cfg.services.is_empty() {
                println!("No services configured.");
            } else {
                for (name, service) in &cfg.services {
                    println!("[services.{name}]");
                    if let Some(command) = &service.command {
                        println!("  command = \"{command}\"");
                    }
                }
            }
            if !cfg.hooks.is_empty() {
                println!();
                for hook in &cfg.hooks {
                    println!("[[hooks]]");
                    println!("  event = \"{}\"", hook.event);
                    println!("  command = \"{}\"", hook.command);
                    println!("  timeout_secs = {}", hook.timeout_secs);
                }
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !path.exists() {
                println!("No config.toml found at {}; defaults are valid.", path.display());
                println!();
                return Ok(());
            }

            let cfg = DualToml::load(&path)?;
            let warnings = cfg.validate();
            if warnings.is_empty() {
                println!("{} configuration is valid", style("OK").bold().green());
            } else {
                for warning in &warnings {
                    println!("{} {warning}", style("warning:").bold().yellow());
                }
                println!();
                println!("{} warning(s)", warnings.len());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("config.toml already exists at {}", path.display());
                return Ok(());
            }
            std::fs::create_dir_all(dual_dir(&root))?;
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string());
            std::fs::write(&path, super::project::default_config_template(&name))?;
            println!("Created {}", path.display());
        }
    }
    Ok(())
}

fn print_defaults(cfg: &DualToml) {
    println!("[defaults]");
    println!("  base_port = {}", cfg.defaults.base_port);
    println!("  port_increment = {}", cfg.defaults.port_increment);
    println!("  lock_timeout_secs = {}", cfg.defaults.lock_timeout_secs);
}
