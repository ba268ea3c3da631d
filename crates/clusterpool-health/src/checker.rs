//! Staleness policy applied on every maintenance tick.
//!
//! The policy is pure: it looks at one resource and the current time and
//! decides whether the resource deserves operator attention.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use clusterpool_state::{AttentionFlag, Resource, ResourceStatus};

/// Thresholds after which a resource is flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// A `Locked` resource held at least this long is flagged `StaleLock`.
    pub stale_lock_after: Duration,
    /// A previous health check at least this old is flagged `StaleHealthCheck`.
    pub stale_health_check_after: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            stale_lock_after: Duration::from_secs(4 * 60 * 60),
            stale_health_check_after: Duration::from_secs(5 * 60),
        }
    }
}

impl StalenessPolicy {
    /// Decide the attention flag for `resource` at `now` (epoch millis).
    ///
    /// A stale lock takes precedence over a stale health check.
    pub fn evaluate(&self, resource: &Resource, now: u64) -> Option<AttentionFlag> {
        if resource.status == ResourceStatus::Locked {
            if let Some(locked_at) = resource.locked_at {
                let held_ms = now.saturating_sub(locked_at);
                if held_ms >= duration_millis(self.stale_lock_after) {
                    debug!(resource_id = %resource.id, held_ms, "lock is stale");
                    return Some(AttentionFlag::StaleLock { held_ms });
                }
            }
        }

        let last = resource.last_health_check?;
        let gap_ms = now.saturating_sub(last);
        if gap_ms >= duration_millis(self.stale_health_check_after) {
            debug!(resource_id = %resource.id, gap_ms, "health check is stale");
            return Some(AttentionFlag::StaleHealthCheck { gap_ms });
        }
        None
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Parse a duration string like "5s", "500ms", "2m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 60 * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
