//! Startup preflight
//!
//! Optionally runs an external diagnose script (and, when allowed, an
//! initialization script) before resources are loaded. The policy is chosen
//! by configuration; nothing here waits on a terminal.

use std::path::{Path, PathBuf};
use std::process::Command;

use clap::ValueEnum;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StartupPolicy {
    /// Run the diagnose script and abort if it fails
    FailFast,
    /// Run the diagnose script; on failure run the init script once
    AutoRepair,
    /// Run nothing
    #[default]
    Skip,
}

#[derive(Debug, Clone)]
pub struct PreflightConfig {
    pub policy: StartupPolicy,
    /// Program the scripts are passed to; `None` executes them directly
    pub interpreter: Option<String>,
    pub diagnose_script: PathBuf,
    pub init_script: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightOutcome {
    Skipped,
    Healthy,
    Repaired,
}

#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("diagnostic script not found: {0}")]
    DiagnoseScriptMissing(PathBuf),

    #[error("system diagnosis failed")]
    DiagnosisFailed,

    #[error("system initialization failed")]
    InitializationFailed,

    #[error("failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Gate startup according to `config.policy`.
pub fn run(config: &PreflightConfig) -> Result<PreflightOutcome, PreflightError> {
    if config.policy == StartupPolicy::Skip {
        tracing::info!("Pre-flight check skipped");
        return Ok(PreflightOutcome::Skipped);
    }

    tracing::info!(
        "Running system diagnosis: {}",
        config.diagnose_script.display()
    );
    if !config.diagnose_script.exists() {
        tracing::error!(
            "Diagnostic script not found: {}",
            config.diagnose_script.display()
        );
        return Err(PreflightError::DiagnoseScriptMissing(
            config.diagnose_script.clone(),
        ));
    }

    if run_script(config.interpreter.as_deref(), &config.diagnose_script)? {
        tracing::info!("System is healthy");
        return Ok(PreflightOutcome::Healthy);
    }

    match config.policy {
        StartupPolicy::AutoRepair => {
            tracing::warn!(
                "System diagnosis failed, running initialization: {}",
                config.init_script.display()
            );
            if run_script(config.interpreter.as_deref(), &config.init_script)? {
                tracing::info!("Initialization complete");
                Ok(PreflightOutcome::Repaired)
            } else {
                tracing::error!("Initialization failed");
                Err(PreflightError::InitializationFailed)
            }
        }
        _ => {
            tracing::error!("System diagnosis failed");
            Err(PreflightError::DiagnosisFailed)
        }
    }
}

/// Run one script to completion; `Ok(false)` on a non-zero exit.
fn run_script(interpreter: Option<&str>, script: &Path) -> Result<bool, PreflightError> {
    let mut command = match interpreter {
        Some(program) => {
            let mut cmd = Command::new(program);
            cmd.arg(script);
            cmd
        }
        None => Command::new(script),
    };

    let status = command.status().map_err(|source| PreflightError::Launch {
        path: script.to_path_buf(),
        source,
    })?;
    Ok(status.success())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn config(policy: StartupPolicy, diagnose: PathBuf, init: PathBuf) -> PreflightConfig {
        PreflightConfig {
            policy,
            interpreter: Some("sh".to_string()),
            diagnose_script: diagnose,
            init_script: init,
        }
    }

    #[test]
    fn test_skip_runs_nothing() {
        let cfg = config(
            StartupPolicy::Skip,
            PathBuf::from("/nonexistent/diagnose.sh"),
            PathBuf::from("/nonexistent/init.sh"),
        );
        assert_eq!(run(&cfg).unwrap(), PreflightOutcome::Skipped);
    }

    #[test]
    fn test_healthy_system() {
        let dir = tempdir().unwrap();
        let ok = script(dir.path(), "diagnose.sh", "exit 0\n");
        let cfg = config(StartupPolicy::FailFast, ok, dir.path().join("init.sh"));
        assert_eq!(run(&cfg).unwrap(), PreflightOutcome::Healthy);
    }

    #[test]
    fn test_fail_fast_aborts() {
        let dir = tempdir().unwrap();
        let bad = script(dir.path(), "diagnose.sh", "exit 3\n");
        let marker = dir.path().join("ran-init");
        let init = script(
            dir.path(),
            "init.sh",
            &format!("touch {}\n", marker.display()),
        );

        let cfg = config(StartupPolicy::FailFast, bad, init);
        assert!(matches!(run(&cfg), Err(PreflightError::DiagnosisFailed)));
        assert!(!marker.exists());
    }

    #[test]
    fn test_auto_repair_runs_init() {
        let dir = tempdir().unwrap();
        let bad = script(dir.path(), "diagnose.sh", "exit 1\n");
        let init = script(dir.path(), "init.sh", "exit 0\n");

        let cfg = config(StartupPolicy::AutoRepair, bad, init);
        assert_eq!(run(&cfg).unwrap(), PreflightOutcome::Repaired);
    }

    #[test]
    fn test_auto_repair_failure() {
        let dir = tempdir().unwrap();
        let bad = script(dir.path(), "diagnose.sh", "exit 1\n");
        let init = script(dir.path(), "init.sh", "exit 1\n");

        let cfg = config(StartupPolicy::AutoRepair, bad, init);
        assert!(matches!(
            run(&cfg),
            Err(PreflightError::InitializationFailed)
        ));
    }

    #[test]
    fn test_missing_diagnose_script() {
        let dir = tempdir().unwrap();
        let cfg = config(
            StartupPolicy::AutoRepair,
            dir.path().join("missing.sh"),
            dir.path().join("init.sh"),
        );
        assert!(matches!(
            run(&cfg),
            Err(PreflightError::DiagnoseScriptMissing(_))
        ));
    }

    #[test]
    fn test_missing_interpreter_is_launch_error() {
        let dir = tempdir().unwrap();
        let ok = script(dir.path(), "diagnose.sh", "exit 0\n");
        let mut cfg = config(StartupPolicy::FailFast, ok, dir.path().join("init.sh"));
        cfg.interpreter = Some("pickgok-no-such-interpreter".to_string());
        assert!(matches!(run(&cfg), Err(PreflightError::Launch { .. })));
    }
}
