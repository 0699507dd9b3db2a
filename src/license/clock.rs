use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

/// Detects backward clock manipulation between runs.
///
/// Offline grace periods are only as trustworthy as the system clock; rolling
/// the clock back after the program last ran would silently extend them. The
/// guard compares the current time against the reference written on every
/// record save and flags any rollback beyond the jitter tolerance.
pub struct ClockGuard {
    reference_path: PathBuf,
    tolerance: Duration,
}

impl ClockGuard {
    pub fn new(reference_path: PathBuf, tolerance: Duration) -> Self {
        Self {
            reference_path,
            tolerance,
        }
    }

    /// True unless the clock has moved backward past the tolerance since the
    /// last persisted reference. No reference means no evidence of tampering.
    pub fn is_valid(&self) -> bool {
        let Ok(data) = fs::read_to_string(&self.reference_path) else {
            return true;
        };
        let Ok(last_known) = data.trim().parse::<i64>() else {
            warn!("Unreadable clock reference file, ignoring it");
            return true;
        };

        let now = Utc::now().timestamp();
        last_known - now <= self.tolerance.as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn guard_with_reference(contents: Option<&str>) -> (tempfile::TempDir, ClockGuard) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".last_known_time");
        if let Some(contents) = contents {
            fs::write(&path, contents).unwrap();
        }
        let guard = ClockGuard::new(path, Duration::from_secs(300));
        (dir, guard)
    }

    #[test]
    fn missing_reference_is_valid() {
        let (_dir, guard) = guard_with_reference(None);
        assert!(guard.is_valid());
    }

    #[test]
    fn unparseable_reference_is_valid() {
        let (_dir, guard) = guard_with_reference(Some("definitely not a number"));
        assert!(guard.is_valid());
    }

    #[test]
    fn reference_in_the_past_is_valid() {
        let past = (Utc::now().timestamp() - 3600).to_string();
        let (_dir, guard) = guard_with_reference(Some(&past));
        assert!(guard.is_valid());
    }

    #[test]
    fn small_forward_drift_is_tolerated() {
        // Reference a minute ahead of now: within NTP jitter tolerance.
        let slightly_ahead = (Utc::now().timestamp() + 60).to_string();
        let (_dir, guard) = guard_with_reference(Some(&slightly_ahead));
        assert!(guard.is_valid());
    }

    #[test]
    fn rollback_beyond_tolerance_is_caught() {
        // Reference an hour ahead of now: the clock was rolled back.
        let far_ahead = (Utc::now().timestamp() + 3600).to_string();
        let (_dir, guard) = guard_with_reference(Some(&far_ahead));
        assert!(!guard.is_valid());
    }
}
