//! Layered environment construction for `dual run`.
//!
//! The environment handed to a spawned service is built from dotenv files in
//! the working copy plus the context's registry overrides, lowest to highest
//! precedence:
//!
//! 1. `.env`
//! 2. `.env.local`
//! 3. `.env.<context>`
//! 4. registry overrides, flat legacy map (global)
//! 5. registry overrides, structured globals
//! 6. registry overrides, per-service map
//! 7. the computed `PORT`
//!
//! Later layers win key-by-key. Nothing here mutates the dual process's own
//! environment; the result is a plain map merged into the child's inherited
//! environment at spawn time.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use anyhow::Result;

use crate::registry::Context;

/// Parse one dotenv file into `env`, overwriting earlier values.
///
/// A missing file is an empty layer. A malformed line abandons the rest of
/// that file with a warning; dotenv files are user-edited and must not take
/// the whole command down.
fn apply_env_file(env: &mut BTreeMap<String, String>, path: &Path) -> Result<()> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    for item in iter {
        match item {
            Ok((key, value)) => {
                env.insert(key, value);
            }
            Err(err) => {
                tracing::warn!("skipping rest of {}: {err}", path.display());
                break;
            }
        }
    }
    Ok(())
}

/// Build the full environment overlay for one service of one context.
pub fn merged_env(
    workdir: &Path,
    context_name: &str,
    context: &Context,
    service: &str,
    port: u16,
) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();

    apply_env_file(&mut env, &workdir.join(".env"))?;
    apply_env_file(&mut env, &workdir.join(".env.local"))?;
    apply_env_file(&mut env, &workdir.join(format!(".env.{context_name}")))?;

    for (key, value) in &context.env_overrides {
        env.insert(key.clone(), value.clone());
    }
    for (key, value) in &context.env_overrides_v2.global {
        env.insert(key.clone(), value.clone());
    }
    if let Some(service_overrides) = context.env_overrides_v2.services.get(service) {
        for (key, value) in service_overrides {
            env.insert(key.clone(), value.clone());
        }
    }

    env.insert("PORT".to_string(), port.to_string());
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context_with_overrides() -> Context {
        let mut ctx = Context::new(None, 4100);
        ctx.env_overrides.insert("FLAT".into(), "flat".into());
        ctx.env_overrides.insert("SHADOWED".into(), "flat".into());
        ctx.env_overrides_v2
            .global
            .insert("SHADOWED".into(), "v2-global".into());
        ctx.env_overrides_v2
            .services
            .entry("api".into())
            .or_default()
            .insert("SHADOWED".into(), "service".into());
        ctx
    }

    #[test]
    fn later_layers_win_key_by_key() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(".env"),
            "BASE=one\nSHADOWED=dotenv\nPORT=9999\n",
        )
        .unwrap();
        std::fs::write(tmp.path().join(".env.local"), "LOCAL=yes\n").unwrap();
        std::fs::write(tmp.path().join(".env.feature"), "CTX_FILE=yes\n").unwrap();

        let ctx = context_with_overrides();
        let env = merged_env(tmp.path(), "feature", &ctx, "api", 4201).unwrap();

        assert_eq!(env["BASE"], "one");
        assert_eq!(env["LOCAL"], "yes");
        assert_eq!(env["CTX_FILE"], "yes");
        assert_eq!(env["FLAT"], "flat");
        // service override beats v2 global beats flat beats dotenv
        assert_eq!(env["SHADOWED"], "service");
        // computed PORT always wins
        assert_eq!(env["PORT"], "4201");
    }

    #[test]
    fn context_file_is_selected_by_name() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".env.feature"), "WHICH=feature\n").unwrap();
        std::fs::write(tmp.path().join(".env.main"), "WHICH=main\n").unwrap();

        let ctx = Context::new(None, 4100);
        let env = merged_env(tmp.path(), "main", &ctx, "api", 4101).unwrap();
        assert_eq!(env["WHICH"], "main");
    }

    #[test]
    fn missing_files_are_empty_layers() {
        let tmp = TempDir::new().unwrap();
        let ctx = Context::new(None, 4100);
        let env = merged_env(tmp.path(), "main", &ctx, "api", 4101).unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env["PORT"], "4101");
    }

    #[test]
    fn service_overrides_apply_only_to_their_service() {
        let tmp = TempDir::new().unwrap();
        let ctx = context_with_overrides();

        let api = merged_env(tmp.path(), "main", &ctx, "api", 4101).unwrap();
        let web = merged_env(tmp.path(), "main", &ctx, "web", 4102).unwrap();

        assert_eq!(api["SHADOWED"], "service");
        assert_eq!(web["SHADOWED"], "v2-global");
    }
}
