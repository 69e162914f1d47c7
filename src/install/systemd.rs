// src/install/systemd.rs

//! Service manager integration
//!
//! The install engine only needs to stop every unit in the live wants
//! directory before archiving it. Setup additionally reloads the daemon and
//! starts the new units.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// `systemctl` exit status for a unit that is not loaded
const UNIT_NOT_LOADED: i32 = 5;

/// Hooks the install engine calls around a swap
pub trait ServiceManager {
    /// Stop every unit file in `unit_dir`, tolerating units that were never loaded
    fn stop_all(&self, unit_dir: &Path) -> Result<()>;

    /// Enable and start every unit file in `unit_dir`
    fn start_all(&self, unit_dir: &Path) -> Result<()> {
        for unit in unit_names(unit_dir)? {
            self.enable(&unit)?;
            self.start(&unit)?;
        }
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()>;

    fn start(&self, unit: &str) -> Result<()>;

    fn daemon_reload(&self) -> Result<()>;
}

/// Unit file names in `unit_dir`, sorted; directories are skipped
///
/// A missing directory has no units.
pub fn unit_names(unit_dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(unit_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        // Follows symlinks: a link to a directory is still a directory
        if entry.path().is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Unit name as passed to `enable`/`start`
pub fn service_name(unit: &str) -> &str {
    unit.strip_suffix(".service").unwrap_or(unit)
}

/// Drives the host's systemd through `systemctl`
#[derive(Debug, Clone)]
pub struct Systemctl {
    block: bool,
}

impl Systemctl {
    /// `block = false` passes `--no-block` so jobs are queued, not awaited
    pub fn new(block: bool) -> Self {
        Self { block }
    }

    fn program() -> Result<PathBuf> {
        which::which("systemctl")
            .map_err(|e| Error::NotFound(format!("systemctl not found in PATH: {e}")))
    }

    /// Run `systemctl <args>`; `tolerated` exit codes count as success
    fn run(&self, args: &[&str], tolerated: &[i32]) -> Result<()> {
        let mut cmd = Command::new(Self::program()?);
        cmd.args(args);
        if !self.block {
            cmd.arg("--no-block");
        }

        let rendered = format!("systemctl {}", args.join(" "));
        debug!("Running {}", rendered);
        let output = cmd
            .output()
            .map_err(|e| Error::IoError(format!("Failed to run {rendered}: {e}")))?;

        if output.status.success() {
            return Ok(());
        }
        match output.status.code() {
            Some(code) if tolerated.contains(&code) => {
                debug!("{} exited with tolerated status {}", rendered, code);
                Ok(())
            }
            code => Err(Error::CommandFailed {
                command: rendered,
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl ServiceManager for Systemctl {
    fn stop_all(&self, unit_dir: &Path) -> Result<()> {
        for unit in unit_names(unit_dir)? {
            info!("Stopping {}", unit);
            // Not loaded means never started, e.g. the first activation after bootstrap
            self.run(&["stop", &unit], &[UNIT_NOT_LOADED])?;
        }
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.run(&["enable", service_name(unit)], &[])
    }

    fn start(&self, unit: &str) -> Result<()> {
        info!("Starting {}", service_name(unit));
        self.run(&["start", service_name(unit)], &[])
    }

    fn daemon_reload(&self) -> Result<()> {
        let mut cmd = Command::new(Self::program()?);
        let status = cmd
            .arg("daemon-reload")
            .status()
            .map_err(|e| Error::IoError(format!("Failed to run systemctl daemon-reload: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command: "systemctl daemon-reload".to_string(),
                code: status.code(),
                stderr: String::new(),
            })
        }
    }
}

/// Service management disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServiceManager;

impl ServiceManager for NoServiceManager {
    fn stop_all(&self, unit_dir: &Path) -> Result<()> {
        debug!("Service management disabled, not stopping units in {}", unit_dir.display());
        Ok(())
    }

    fn start_all(&self, _unit_dir: &Path) -> Result<()> {
        Ok(())
    }

    fn enable(&self, _unit: &str) -> Result<()> {
        Ok(())
    }

    fn start(&self, _unit: &str) -> Result<()> {
        Ok(())
    }

    fn daemon_reload(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl ServiceManager for Recorder {
        fn stop_all(&self, unit_dir: &Path) -> Result<()> {
            for unit in unit_names(unit_dir)? {
                self.calls.borrow_mut().push(format!("stop {unit}"));
            }
            Ok(())
        }

        fn enable(&self, unit: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("enable {}", service_name(unit)));
            Ok(())
        }

        fn start(&self, unit: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("start {}", service_name(unit)));
            Ok(())
        }

        fn daemon_reload(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_service_name() {
        assert_eq!(service_name("dcos-mesos-master.service"), "dcos-mesos-master");
        assert_eq!(service_name("dcos-logrotate.timer"), "dcos-logrotate.timer");
    }

    #[test]
    fn test_unit_names_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.service"), "").unwrap();
        fs::write(temp.path().join("a.service"), "").unwrap();
        fs::create_dir(temp.path().join("a.service.d")).unwrap();

        assert_eq!(unit_names(temp.path()).unwrap(), vec!["a.service", "b.service"]);
        assert!(unit_names(&temp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_default_start_all_enables_then_starts() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("mesos.service"), "").unwrap();

        let recorder = Recorder::default();
        recorder.start_all(temp.path()).unwrap();
        assert_eq!(
            recorder.calls.borrow().as_slice(),
            ["enable mesos", "start mesos"]
        );
    }
}
