//! Location of the user configuration files

use std::env;
use std::path::{Path, PathBuf};

/// File name of the task manager configuration
pub const MANAGER_FILE: &str = "manager.yml";

/// File name of the scheduler configuration
pub const SCHEDULER_FILE: &str = "scheduler.yml";

/// Environment variable overriding the user configuration directory
pub const CONFIG_DIR_ENV: &str = "ABIQUEUE_CONFIG_DIR";

/// User configuration directory (`~/.abinit/abipy` unless overridden)
pub fn user_config_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".abinit").join("abipy")
}

/// Where a configuration file was looked for
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The file found, if any
    pub found: Option<PathBuf>,
    /// Path in the user configuration directory
    pub user_path: PathBuf,
}

/// Look for `filename` in `cwd` first, then in the user configuration directory
pub fn locate_in(filename: &str, cwd: Option<&Path>, config_dir: &Path) -> Lookup {
    let user_path = config_dir.join(filename);

    let found = cwd
        .map(|dir| dir.join(filename))
        .filter(|p| p.is_file())
        .or_else(|| Some(user_path.clone()).filter(|p| p.is_file()));

    if let Some(path) = &found {
        tracing::debug!("Using {} from {}", filename, path.display());
    }

    Lookup { found, user_path }
}

/// Look for `filename` in the working directory and the user configuration directory
pub fn locate(filename: &str) -> Lookup {
    // The working directory may have been removed under us.
    let cwd = env::current_dir().ok();
    locate_in(filename, cwd.as_deref(), &user_config_dir())
}
