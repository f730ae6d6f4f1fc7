//! Integration tests for dual
//!
//! These tests drive the CLI end to end against throwaway project
//! directories. A bare `.git` directory is enough for identity resolution;
//! it is not a usable repository, so branch detection falls back to the
//! `default` context name.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a dual Command
fn dual() -> Command {
    Command::cargo_bin("dual").unwrap()
}

/// Helper to create a temporary project directory with a `.git` entry
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    dir
}

/// The project root as dual sees it (identity resolution canonicalizes)
fn project_root(dir: &TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}

/// Helper to initialize a dual project in a temp directory
fn init_dual_project(dir: &TempDir) {
    dual()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Helper to write a config with three services
fn write_services_config(root: &Path) {
    fs::create_dir_all(root.join(".dual")).unwrap();
    fs::write(
        root.join(".dual/config.toml"),
        r#"
[project]
name = "it"

[services.api]
command = 'printf "api on %s" "$PORT"'

[services.web]

[services.worker]
"#,
    )
    .unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_dual_help() {
        dual().arg("--help").assert().success();
    }

    #[test]
    fn test_dual_version() {
        dual().arg("--version").assert().success();
    }

    #[test]
    fn test_dual_init_creates_structure() {
        let dir = create_temp_project();

        dual()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized dual project"));

        let root = project_root(&dir);
        assert!(root.join(".dual").exists());
        assert!(root.join(".dual/config.toml").exists());
        assert!(root.join(".dual/.gitignore").exists());
    }

    #[test]
    fn test_dual_init_idempotent() {
        let dir = create_temp_project();

        init_dual_project(&dir);
        dual()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_commands_fail_outside_any_project() {
        let dir = TempDir::new().unwrap();

        dual()
            .current_dir(dir.path())
            .args(["context", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No git repository"));
    }
}

// =============================================================================
// Context Lifecycle Tests
// =============================================================================

mod context_lifecycle {
    use super::*;

    #[test]
    fn test_create_reserves_the_first_block() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("4100-4199"));

        assert!(project_root(&dir).join(".dual/registry.json").exists());
    }

    #[test]
    fn test_second_context_gets_the_next_block() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "feature"])
            .assert()
            .success()
            .stdout(predicate::str::contains("4200-4299"));
    }

    #[test]
    fn test_duplicate_create_fails_with_hint() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_explicit_base_port_is_validated_and_reserved() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "low", "--base-port", "80"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("1024-65535"));

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main", "--base-port", "5000"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "clash", "--base-port", "5000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already reserved"));
    }

    #[test]
    fn test_list_marks_contexts() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No contexts registered"));

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["context", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("main"))
            .stdout(predicate::str::contains("4100"));
    }

    #[test]
    fn test_remove_frees_the_block() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["context", "remove", "main", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("free again"));

        // Block is reusable immediately.
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "other"])
            .assert()
            .success()
            .stdout(predicate::str::contains("4100-4199"));
    }

    #[test]
    fn test_remove_missing_context_fails_with_hint() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["context", "remove", "ghost", "--force"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("dual context create ghost"));
    }

    #[test]
    fn test_worktree_shares_the_parent_registry() {
        let parent = create_temp_project();
        init_dual_project(&parent);
        dual()
            .current_dir(parent.path())
            .args(["context", "create", "main"])
            .assert()
            .success();

        // Fake worktree checkout linked to the parent repository.
        let wt = TempDir::new().unwrap();
        fs::write(
            wt.path().join(".git"),
            format!(
                "gitdir: {}\n",
                parent.path().join(".git/worktrees/feature").display()
            ),
        )
        .unwrap();
        fs::create_dir_all(parent.path().join(".git/worktrees/feature")).unwrap();

        dual()
            .current_dir(wt.path())
            .args(["context", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("main"));
    }
}

// =============================================================================
// Port Calculation Tests
// =============================================================================

mod port_calculation {
    use super::*;

    fn project_with_services() -> TempDir {
        let dir = create_temp_project();
        write_services_config(&project_root(&dir));
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dir
    }

    #[test]
    fn test_ports_are_assigned_alphabetically() {
        let dir = project_with_services();

        for (service, port) in [("api", "4101"), ("web", "4102"), ("worker", "4103")] {
            dual()
                .current_dir(dir.path())
                .args(["-c", "main", "port", service])
                .assert()
                .success()
                .stdout(predicate::str::diff(format!("{port}\n")));
        }
    }

    #[test]
    fn test_port_is_deterministic_across_invocations() {
        let dir = project_with_services();

        for _ in 0..3 {
            dual()
                .current_dir(dir.path())
                .args(["-c", "main", "port", "web"])
                .assert()
                .success()
                .stdout(predicate::str::diff("4102\n"));
        }
    }

    #[test]
    fn test_ports_lists_every_service() {
        let dir = project_with_services();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "ports"])
            .assert()
            .success()
            .stdout(predicate::str::contains("api"))
            .stdout(predicate::str::contains("4101"))
            .stdout(predicate::str::contains("4103"));
    }

    #[test]
    fn test_unknown_service_lists_the_configured_ones() {
        let dir = project_with_services();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "port", "db"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("api, web, worker"));
    }

    #[test]
    fn test_missing_context_suggests_creating_it() {
        let dir = create_temp_project();
        write_services_config(&project_root(&dir));

        dual()
            .current_dir(dir.path())
            .args(["-c", "nope", "port", "api"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("dual context create nope"));
    }

    #[test]
    fn test_show_includes_service_ports() {
        let dir = project_with_services();

        dual()
            .current_dir(dir.path())
            .args(["context", "show", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("base port: 4100"))
            .stdout(predicate::str::contains("4101"));
    }
}

// =============================================================================
// Env Override Tests
// =============================================================================

mod env_overrides {
    use super::*;

    fn project_with_context() -> TempDir {
        let dir = create_temp_project();
        init_dual_project(&dir);
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dir
    }

    #[test]
    fn test_set_list_unset_round_trip() {
        let dir = project_with_context();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "set", "DEBUG=1"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("DEBUG=1"));
        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "unset", "DEBUG"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Unset DEBUG"));
        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No overrides"));
    }

    #[test]
    fn test_service_overrides_are_listed_separately() {
        let dir = project_with_context();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "set", "WORKERS=2", "--service", "api"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[service api]"))
            .stdout(predicate::str::contains("WORKERS=2"));
    }

    #[test]
    fn test_malformed_assignment_is_rejected() {
        let dir = project_with_context();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "set", "NOEQUALS"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("KEY=VALUE"));
    }

    #[test]
    fn test_env_set_requires_an_existing_context() {
        let dir = create_temp_project();
        init_dual_project(&dir);

        dual()
            .current_dir(dir.path())
            .args(["-c", "ghost", "env", "set", "A=1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("dual context create ghost"));
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_cmd {
    use super::*;

    #[test]
    fn test_config_show_without_file_prints_defaults() {
        let dir = create_temp_project();

        dual()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("base_port = 4100"))
            .stdout(predicate::str::contains("dual config init"));
    }

    #[test]
    fn test_config_init_then_show() {
        let dir = create_temp_project();

        dual()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        dual()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file:"));
    }

    #[test]
    fn test_config_validate_flags_risky_settings() {
        let dir = create_temp_project();
        let root = project_root(&dir);
        fs::create_dir_all(root.join(".dual")).unwrap();
        fs::write(
            root.join(".dual/config.toml"),
            "[defaults]\nbase_port = 80\n",
        )
        .unwrap();

        dual()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("warning:"));
    }
}

// =============================================================================
// Run Command Tests
// =============================================================================

mod run_cmd {
    use super::*;

    fn write_run_config(root: &Path, command: &str) {
        fs::create_dir_all(root.join(".dual")).unwrap();
        fs::write(
            root.join(".dual/config.toml"),
            format!("[services.api]\ncommand = '''{command}'''\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_run_injects_the_computed_port() {
        let dir = create_temp_project();
        let root = project_root(&dir);
        write_run_config(&root, "printf 'port=%s' \"$PORT\"");
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "run", "api"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port=4101"));
    }

    #[test]
    fn test_run_applies_env_layers_in_order() {
        let dir = create_temp_project();
        let root = project_root(&dir);
        write_run_config(&root, "printf '%s/%s' \"$FROM_FILE\" \"$SHARED\"");
        fs::write(root.join(".env"), "FROM_FILE=dotenv\nSHARED=dotenv\n").unwrap();
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();
        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "env", "set", "SHARED=override"])
            .assert()
            .success();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "run", "api"])
            .assert()
            .success()
            .stdout(predicate::str::contains("dotenv/override"));
    }

    #[test]
    fn test_run_propagates_the_exit_code() {
        let dir = create_temp_project();
        let root = project_root(&dir);
        write_run_config(&root, "exit 7");
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "run", "api"])
            .assert()
            .code(7);
    }

    #[test]
    fn test_run_without_command_explains_the_fix() {
        let dir = create_temp_project();
        let root = project_root(&dir);
        fs::create_dir_all(root.join(".dual")).unwrap();
        fs::write(root.join(".dual/config.toml"), "[services.api]\n").unwrap();
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();

        dual()
            .current_dir(dir.path())
            .args(["-c", "main", "run", "api"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("has no command"));
    }
}

// =============================================================================
// Status Tests
// =============================================================================

mod status_cmd {
    use super::*;

    #[test]
    fn test_status_reports_healthy_contexts() {
        let dir = create_temp_project();
        init_dual_project(&dir);
        dual()
            .current_dir(dir.path())
            .args(["context", "create", "main"])
            .assert()
            .success();

        dual()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("no problems found"));
    }

    #[test]
    fn test_status_flags_duplicate_base_ports() {
        let dir = create_temp_project();
        init_dual_project(&dir);
        let root = project_root(&dir);
        // Hand-edited registry with a duplicated block.
        fs::write(
            root.join(".dual/registry.json"),
            format!(
                r#"{{"projects":{{"{key}":{{"contexts":{{
                    "a":{{"created":"2026-01-01T00:00:00Z","basePort":4100}},
                    "b":{{"created":"2026-01-01T00:00:00Z","basePort":4100}}
                }}}}}}}}"#,
                key = root.display()
            ),
        )
        .unwrap();

        dual()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("is shared with"));
    }
}
