//! `scheduler.yml`

use crate::config::yaml::{bool_like, from_document};
use crate::config::{locate, Lookup, SCHEDULER_FILE};
use crate::error::{AbiQueueError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Minimal scheduler polling every 5 seconds
pub const SIMPLE_SCHEDULER: &str = "seconds: 5   # number of seconds to wait between two iterations\n";

fn default_max_njobs_inqueue() -> usize {
    200
}

fn default_max_nlaunches() -> i64 {
    -1
}

fn default_safety_ratio() -> u32 {
    5
}

fn default_remindme_s() -> u64 {
    24 * 3600
}

fn yes() -> bool {
    true
}

/// Options of the submission loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub weeks: u64,
    #[serde(default)]
    pub days: u64,
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
    /// Maximum number of jobs in the queue
    #[serde(default = "default_max_njobs_inqueue")]
    pub max_njobs_inqueue: usize,
    /// Maximum number of cores used by the submitted jobs
    #[serde(default)]
    pub max_ncores_used: Option<u32>,
    /// Maximum number of launches per iteration, negative for no limit
    #[serde(default = "default_max_nlaunches")]
    pub max_nlaunches: i64,
    /// Submission errors tolerated before stopping
    #[serde(default)]
    pub max_num_pyexcs: u32,
    /// Failed jobs tolerated before stopping
    #[serde(default)]
    pub max_num_abierrs: u32,
    /// Total launches may not exceed `safety_ratio` times the number of jobs
    #[serde(default = "default_safety_ratio")]
    pub safety_ratio: u32,
    /// Recorded only, no mail is sent
    #[serde(default)]
    pub mailto: Option<String>,
    #[serde(default)]
    pub verbose: u8,
    /// Resubmit jobs rejected by the queue with more resources
    #[serde(default = "yes", deserialize_with = "bool_like")]
    pub fix_qcritical: bool,
    /// Remove the job directories once every job completed
    #[serde(default, deserialize_with = "bool_like")]
    pub rmflow: bool,
    #[serde(default)]
    pub debug: u8,
    /// Seconds between two status reports
    #[serde(default = "default_remindme_s")]
    pub remindme_s: u64,
    /// Cancel the jobs still in the queue when stopping on errors
    #[serde(default = "yes", deserialize_with = "bool_like")]
    pub killjobs_if_errors: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weeks: 0,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            max_njobs_inqueue: default_max_njobs_inqueue(),
            max_ncores_used: None,
            max_nlaunches: default_max_nlaunches(),
            max_num_pyexcs: 0,
            max_num_abierrs: 0,
            safety_ratio: default_safety_ratio(),
            mailto: None,
            verbose: 0,
            fix_qcritical: true,
            rmflow: false,
            debug: 0,
            remindme_s: default_remindme_s(),
            killjobs_if_errors: true,
        }
    }
}

impl SchedulerConfig {
    /// Config polling every `seconds`
    pub fn every(seconds: u64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    fn interval_secs(&self) -> Option<u64> {
        self.weeks
            .checked_mul(7)?
            .checked_add(self.days)?
            .checked_mul(24)?
            .checked_add(self.hours)?
            .checked_mul(60)?
            .checked_add(self.minutes)?
            .checked_mul(60)?
            .checked_add(self.seconds)
    }

    /// Time between two iterations
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs().unwrap_or(u64::MAX))
    }

    pub fn validate(&self) -> Result<()> {
        match self.interval_secs() {
            None => return Err(AbiQueueError::config("scheduler: the polling interval is too large")),
            Some(0) => {
                return Err(AbiQueueError::config(
                    "scheduler: at least one of weeks, days, hours, minutes, seconds must be > 0",
                ))
            }
            Some(_) => {}
        }
        if self.max_njobs_inqueue == 0 {
            return Err(AbiQueueError::config("scheduler: max_njobs_inqueue must be > 0"));
        }
        if self.safety_ratio == 0 {
            return Err(AbiQueueError::config("scheduler: safety_ratio must be > 0"));
        }
        Ok(())
    }

    /// Launches allowed in one iteration, `None` when unlimited
    pub fn max_nlaunches(&self) -> Option<usize> {
        usize::try_from(self.max_nlaunches).ok()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_path(path)?;
        Self::from_yaml(&text, &path.display().to_string())
    }

    fn from_yaml(text: &str, origin: &str) -> Result<Self> {
        let config: Self = from_document(text, origin)?;
        config.validate()?;
        Ok(config)
    }

    /// Look for `scheduler.yml` in the working directory, then in the user
    /// configuration directory
    pub fn from_user_config() -> Result<Self> {
        Self::from_lookup(locate(SCHEDULER_FILE))
    }

    pub(crate) fn from_lookup(lookup: Lookup) -> Result<Self> {
        match lookup.found {
            Some(path) => Self::from_file(path),
            None => Err(AbiQueueError::MissingConfig {
                filename: SCHEDULER_FILE.to_string(),
                searched: lookup.user_path,
                example: SIMPLE_SCHEDULER.to_string(),
            }),
        }
    }
}

impl FromStr for SchedulerConfig {
    type Err = AbiQueueError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_yaml(s, "<string>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::locate_in;

    #[test]
    fn test_defaults() {
        let config: SchedulerConfig = "minutes: 1\nseconds: 30".parse().unwrap();
        assert_eq!(config.interval(), Duration::from_secs(90));
        assert_eq!(config.max_njobs_inqueue, 200);
        assert_eq!(config.max_nlaunches(), None);
        assert_eq!(config.safety_ratio, 5);
        assert_eq!(config.remindme_s, 86400);
        assert!(config.fix_qcritical);
        assert!(!config.rmflow);
        assert!(config.killjobs_if_errors);
        assert_eq!(SchedulerConfig::every(5).interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_interval_must_be_positive() {
        assert!("max_njobs_inqueue: 10".parse::<SchedulerConfig>().is_err());
        assert!("seconds: 0".parse::<SchedulerConfig>().is_err());
        assert!("weeks: 18446744073709551615".parse::<SchedulerConfig>().is_err());
        assert_eq!(
            "weeks: 1\ndays: 1\nhours: 1".parse::<SchedulerConfig>().unwrap().interval(),
            Duration::from_secs(8 * 86400 + 3600)
        );
    }

    #[test]
    fn test_unknown_key_and_flags() {
        assert!("seconds: 5\nmax_cores: 10".parse::<SchedulerConfig>().is_err());

        let config: SchedulerConfig = "seconds: 5\nrmflow: yes\nmax_nlaunches: 3\nmailto: a@b.org"
            .parse()
            .unwrap();
        assert!(config.rmflow);
        assert_eq!(config.max_nlaunches(), Some(3));
        assert_eq!(config.mailto.as_deref(), Some("a@b.org"));
    }

    #[test]
    fn test_from_user_config() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::from_lookup(locate_in(SCHEDULER_FILE, None, dir.path())).unwrap_err();
        assert!(err.to_string().contains("seconds: 5"));

        fs::write(dir.path().join(SCHEDULER_FILE), SIMPLE_SCHEDULER).unwrap();
        let config = SchedulerConfig::from_lookup(locate_in(SCHEDULER_FILE, None, dir.path())).unwrap();
        assert_eq!(config.seconds, 5);
    }
}
