//! clusterpool.toml configuration.
//!
//! Every field is optional in the file; missing sections take the defaults
//! below. Durations are strings such as `"500ms"`, `"5s"`, `"2m"`, `"4h"`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use clusterpool_health::{StalenessPolicy, parse_duration};
use clusterpool_scheduler::ReclaimConfig;
use clusterpool_state::IndexedNamer;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub pool: PoolSection,
    pub reclaim: ReclaimSection,
    pub maintenance: MaintenanceSection,
    pub backend: BackendSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub size: usize,
    pub prefix: String,
    pub members: Vec<String>,
}

impl Default for PoolSection {
    fn default() -> Self {
        let namer = IndexedNamer::default();
        Self {
            size: 3,
            prefix: namer.prefix,
            members: namer.members,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimSection {
    pub timeout: String,
    pub shutdown_grace: String,
}

impl Default for ReclaimSection {
    fn default() -> Self {
        Self {
            timeout: "5m".to_string(),
            shutdown_grace: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub interval: String,
    pub stale_lock_after: String,
    pub stale_health_check_after: String,
}

impl Default for MaintenanceSection {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            stale_lock_after: "4h".to_string(),
            stale_health_check_after: "5m".to_string(),
        }
    }
}

/// Delays for the simulated cluster backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub bootstrap_delay: String,
    pub reset_delay: String,
    /// Cluster ids whose resets always fail.
    pub failing_resets: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            bootstrap_delay: "1s".to_string(),
            reset_delay: "2s".to_string(),
            failing_resets: Vec::new(),
        }
    }
}

/// Validated configuration with parsed durations.
#[derive(Debug, Clone)]
pub struct Settings {
    pub size: usize,
    pub namer: IndexedNamer,
    pub reclaim: ReclaimConfig,
    pub staleness: StalenessPolicy,
    pub maintenance_interval: Duration,
    pub bootstrap_delay: Duration,
    pub reset_delay: Duration,
    pub failing_resets: Vec<String>,
}

impl PoolConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        if self.pool.size == 0 {
            bail!("pool.size must be at least 1");
        }
        if self.pool.prefix.is_empty() {
            bail!("pool.prefix must not be empty");
        }

        let reclaim = ReclaimConfig {
            timeout: nonzero("reclaim.timeout", &self.reclaim.timeout)?,
            shutdown_grace: duration("reclaim.shutdown_grace", &self.reclaim.shutdown_grace)?,
        };
        let staleness = StalenessPolicy {
            stale_lock_after: nonzero(
                "maintenance.stale_lock_after",
                &self.maintenance.stale_lock_after,
            )?,
            stale_health_check_after: nonzero(
                "maintenance.stale_health_check_after",
                &self.maintenance.stale_health_check_after,
            )?,
        };

        Ok(Settings {
            size: self.pool.size,
            namer: IndexedNamer::new(self.pool.prefix.clone(), self.pool.members.clone()),
            reclaim,
            staleness,
            maintenance_interval: nonzero("maintenance.interval", &self.maintenance.interval)?,
            bootstrap_delay: duration("backend.bootstrap_delay", &self.backend.bootstrap_delay)?,
            reset_delay: duration("backend.reset_delay", &self.backend.reset_delay)?,
            failing_resets: self.backend.failing_resets.clone(),
        })
    }
}

fn duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).with_context(|| format!("{field}: invalid duration {value:?}"))
}

fn nonzero(field: &str, value: &str) -> anyhow::Result<Duration> {
    let d = duration(field, value)?;
    if d.is_zero() {
        bail!("{field} must be greater than zero");
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = PoolConfig::parse("").unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.size, 3);
        assert_eq!(settings.namer.prefix, "cluster");
        assert_eq!(settings.reclaim.timeout, Duration::from_secs(300));
        assert_eq!(settings.staleness.stale_lock_after, Duration::from_secs(4 * 3600));
        assert_eq!(settings.maintenance_interval, Duration::from_secs(30));
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = PoolConfig::parse(
            r#"
[pool]
size = 8
prefix = "kind"

[reclaim]
timeout = "90s"
"#,
        )
        .unwrap();
        let settings = config.settings().unwrap();
        assert_eq!(settings.size, 8);
        assert_eq!(settings.namer.prefix, "kind");
        assert_eq!(settings.namer.members, vec!["control-plane", "worker"]);
        assert_eq!(settings.reclaim.timeout, Duration::from_secs(90));
        assert_eq!(settings.reclaim.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_size_and_bad_durations() {
        let zero = PoolConfig::parse("[pool]\nsize = 0\n").unwrap();
        assert!(zero.settings().is_err());

        let bad = PoolConfig::parse("[reclaim]\ntimeout = \"soon\"\n").unwrap();
        let err = bad.settings().unwrap_err().to_string();
        assert!(err.contains("reclaim.timeout"), "{err}");

        let zero_timeout = PoolConfig::parse("[reclaim]\ntimeout = \"0s\"\n").unwrap();
        assert!(zero_timeout.settings().is_err());
    }

    #[test]
    fn unknown_type_is_a_parse_error() {
        assert!(PoolConfig::parse("[pool]\nsize = \"three\"\n").is_err());
    }

    #[test]
    fn from_file_and_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nreset_delay = \"250ms\"").unwrap();

        let config = PoolConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.settings().unwrap().reset_delay,
            Duration::from_millis(250)
        );

        let rendered = config.to_toml().unwrap();
        let reparsed = PoolConfig::parse(&rendered).unwrap();
        assert_eq!(reparsed.backend.reset_delay, "250ms");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PoolConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
