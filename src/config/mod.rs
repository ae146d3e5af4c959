//! Configuration: command line, file lookup and YAML helpers

mod docs;
mod paths;
mod settings;
pub mod yaml;

pub use docs::doc;
pub use paths::{locate, locate_in, user_config_dir, Lookup, CONFIG_DIR_ENV, MANAGER_FILE, SCHEDULER_FILE};
pub use settings::{CliArgs, Commands, DocTopic, JobArgs};
