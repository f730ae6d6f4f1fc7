//! Registry health report — `dual status`.
//!
//! Filesystem-level checks only: stale worktree paths and duplicate base
//! ports (possible in a hand-edited registry). dual never probes sockets.

use anyhow::Result;
use console::style;
use std::collections::BTreeMap;
use std::path::Path;

use dual::registry::{Registry, identity_key};

use super::open_project;

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let (identity, config) = open_project(project_dir)?;
    let key = identity_key(&identity);

    let mut registry = Registry::load_with_timeout(&identity, config.defaults.lock_timeout())?;
    let projects = registry.all_projects()?;
    let registry_path = registry.path().to_path_buf();
    registry.close();

    println!("Project:  {key}");
    println!("Registry: {}", registry_path.display());
    println!();

    let Some(project) = projects.get(&key) else {
        println!("No contexts registered yet.");
        return Ok(());
    };

    // basePort -> context names, across every project in this registry file.
    let mut by_port: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for (project_key, entry) in &projects {
        for (name, ctx) in &entry.contexts {
            by_port
                .entry(ctx.base_port)
                .or_default()
                .push(format!("{project_key}:{name}"));
        }
    }

    let mut problems = 0usize;
    for (name, ctx) in &project.contexts {
        let mut notes = Vec::new();
        match &ctx.path {
            Some(path) if !path.exists() => {
                notes.push(format!("path {} no longer exists", path.display()));
            }
            _ => {}
        }
        if by_port[&ctx.base_port].len() > 1 {
            notes.push(format!(
                "base port {} is shared with {}",
                ctx.base_port,
                by_port[&ctx.base_port].join(", ")
            ));
        }

        if notes.is_empty() {
            println!("{} {:<24} {}", style("ok").green(), name, ctx.base_port);
        } else {
            problems += 1;
            println!("{} {:<24} {}", style("!!").bold().yellow(), name, ctx.base_port);
            for note in notes {
                println!("     {note}");
            }
        }
    }

    println!();
    if problems == 0 {
        println!("{} context(s), no problems found", project.contexts.len());
    } else {
        println!(
            "{} context(s), {problems} with problems; \
             'dual context remove <name>' frees a stale entry",
            project.contexts.len()
        );
    }
    Ok(())
}
