//! Sanity checks of the user configuration

use super::env::EnvReport;
use crate::config::{locate_in, user_config_dir, MANAGER_FILE, SCHEDULER_FILE};
use crate::manager::TaskManager;
use crate::qadapter::QueueType;
use crate::scheduler::SchedulerConfig;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Find `cmd` in the directories of `PATH`
pub fn which(cmd: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(cmd);
            full_path.is_file().then_some(full_path)
        })
    })
}

/// Outcome of loading one configuration file
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// Loaded and validated
    Valid(PathBuf),
    /// Found but rejected
    Invalid(PathBuf, String),
    /// Not found, expected at this path
    Missing(PathBuf),
}

impl FileStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, FileStatus::Valid(_))
    }
}

/// Result of `abiqueue check`
#[derive(Debug, Clone)]
pub struct ConfigCheck {
    pub manager: FileStatus,
    pub scheduler: FileStatus,
    /// Queue commands used by the manager and not found on `PATH`
    pub missing_commands: Vec<(QueueType, &'static str)>,
    pub env: EnvReport,
}

impl ConfigCheck {
    /// Check the files visible from the working directory
    pub fn run() -> Self {
        let cwd = env::current_dir().ok();
        Self::run_in(cwd.as_deref(), &user_config_dir())
    }

    pub fn run_in(cwd: Option<&Path>, config_dir: &Path) -> Self {
        let lookup = locate_in(MANAGER_FILE, cwd, config_dir);
        let mut qtypes: Vec<QueueType> = Vec::new();
        let manager = match lookup.found {
            None => FileStatus::Missing(lookup.user_path),
            Some(path) => match TaskManager::from_file(&path) {
                Ok(manager) => {
                    for qad in manager.qads() {
                        if !qtypes.contains(&qad.qtype()) {
                            qtypes.push(qad.qtype());
                        }
                    }
                    FileStatus::Valid(path)
                }
                Err(e) => FileStatus::Invalid(path, e.to_string()),
            },
        };

        let lookup = locate_in(SCHEDULER_FILE, cwd, config_dir);
        let scheduler = match lookup.found {
            None => FileStatus::Missing(lookup.user_path),
            Some(path) => match SchedulerConfig::from_file(&path) {
                Ok(_) => FileStatus::Valid(path),
                Err(e) => FileStatus::Invalid(path, e.to_string()),
            },
        };

        let missing_commands = qtypes
            .iter()
            .flat_map(|&qtype| qtype.commands().iter().map(move |&cmd| (qtype, cmd)))
            .filter(|(_, cmd)| which(cmd).is_none())
            .collect();

        Self {
            manager,
            scheduler,
            missing_commands,
            env: EnvReport::from_env(),
        }
    }

    /// Both files valid and every command available
    pub fn is_ok(&self) -> bool {
        self.manager.is_valid() && self.scheduler.is_valid() && self.missing_commands.is_empty()
    }
}

fn write_status(f: &mut fmt::Formatter<'_>, name: &str, status: &FileStatus) -> fmt::Result {
    match status {
        FileStatus::Valid(path) => writeln!(f, "{}: OK ({})", name, path.display()),
        FileStatus::Invalid(path, err) => writeln!(f, "{}: INVALID ({})\n  {}", name, path.display(), err),
        FileStatus::Missing(path) => writeln!(f, "{}: MISSING (expected in {})", name, path.display()),
    }
}

impl fmt::Display for ConfigCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_status(f, MANAGER_FILE, &self.manager)?;
        write_status(f, SCHEDULER_FILE, &self.scheduler)?;
        for (qtype, cmd) in &self.missing_commands {
            writeln!(f, "{}: command `{}` not found in PATH", qtype, cmd)?;
        }
        write!(f, "\n{}", self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SIMPLE_MANAGER;
    use crate::scheduler::SIMPLE_SCHEDULER;
    use std::fs;

    #[test]
    fn test_valid_files() {
        let config = tempfile::tempdir().unwrap();
        fs::write(config.path().join(MANAGER_FILE), SIMPLE_MANAGER).unwrap();
        fs::write(config.path().join(SCHEDULER_FILE), SIMPLE_SCHEDULER).unwrap();

        let check = ConfigCheck::run_in(None, config.path());
        assert!(check.manager.is_valid());
        assert!(check.scheduler.is_valid());
        assert!(check.missing_commands.iter().all(|(q, _)| *q == QueueType::Shell));
    }

    #[test]
    fn test_missing_and_invalid() {
        let config = tempfile::tempdir().unwrap();
        fs::write(config.path().join(SCHEDULER_FILE), "seconds: 0").unwrap();

        let check = ConfigCheck::run_in(None, config.path());
        assert_eq!(check.manager, FileStatus::Missing(config.path().join(MANAGER_FILE)));
        assert!(matches!(check.scheduler, FileStatus::Invalid(..)));
        assert!(!check.is_ok());
        assert!(check.to_string().contains("MISSING"));
    }

    #[test]
    fn test_which() {
        assert!(which("surely-not-a-command-on-this-system").is_none());
    }
}
