use std::path::PathBuf;
use std::time::Duration;

/// Policy knobs and file locations for the license engine.
///
/// Constructed once in main and handed to `LicenseEngine::new`; tests substitute
/// short intervals, a scratch `data_dir` and a local mock server URL.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    /// Base URL of the license API, without a trailing slash.
    pub api_url: String,
    /// Days between mandatory re-verifications against the server.
    pub reverify_interval_days: i64,
    /// Days a previously-verified license keeps working without server contact.
    pub grace_period_days: i64,
    /// TCP connect timeout for license API calls.
    pub connect_timeout: Duration,
    /// Overall per-request timeout for license API calls.
    pub request_timeout: Duration,
    /// How far backward the system clock may move between runs before we
    /// treat it as manipulation. Absorbs NTP jitter, nothing more.
    pub clock_drift_tolerance: Duration,
    /// Directory holding the license record and the clock reference file.
    pub data_dir: PathBuf,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            api_url: "https://wizado.app/api".to_string(),
            reverify_interval_days: 7,
            grace_period_days: 14,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            clock_drift_tolerance: Duration::from_secs(5 * 60),
            data_dir: default_data_dir(),
        }
    }
}

impl LicenseConfig {
    pub fn license_path(&self) -> PathBuf {
        self.data_dir.join("license.json")
    }

    pub fn clock_reference_path(&self) -> PathBuf {
        self.data_dir.join(".last_known_time")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wizado")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_constants() {
        let cfg = LicenseConfig::default();
        assert_eq!(cfg.reverify_interval_days, 7);
        assert_eq!(cfg.grace_period_days, 14);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.clock_drift_tolerance, Duration::from_secs(300));
        assert!(cfg.api_url.starts_with("https://"));
    }

    #[test]
    fn paths_live_under_data_dir() {
        let cfg = LicenseConfig {
            data_dir: PathBuf::from("/tmp/wizado-test"),
            ..Default::default()
        };
        assert_eq!(
            cfg.license_path(),
            PathBuf::from("/tmp/wizado-test/license.json")
        );
        assert_eq!(
            cfg.clock_reference_path(),
            PathBuf::from("/tmp/wizado-test/.last_known_time")
        );
    }
}
