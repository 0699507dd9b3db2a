// License validation, activation, and storage.

mod clock;
mod signer;
mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ActivationResult, ApiError, LicenseApiClient};
use crate::config::LicenseConfig;
use crate::machine;

use clock::ClockGuard;
use signer::Signer;
use store::LicenseStore;

/// A stored license record, bound to one machine by its fingerprint and a
/// machine-keyed HMAC signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    #[serde(rename = "license")]
    pub key: String,
    pub email: String,
    pub machine_id: String,
    pub activated_at: DateTime<Utc>,
    pub last_verified: DateTime<Utc>,
    pub signature: String,
}

/// Terminal outcome of a license check. Callers are expected to present a
/// distinct message per variant rather than collapsing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Valid,
    OfflineGrace,
    NoLicense,
    Invalid,
    Expired,
    MachineMismatch,
    OfflineExpired,
    Tampered,
    ClockTampered,
}

impl Status {
    /// True for the two states that authorize the session to run.
    pub fn is_licensed(&self) -> bool {
        matches!(self, Status::Valid | Status::OfflineGrace)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Valid => "valid",
            Status::OfflineGrace => "offline_grace",
            Status::NoLicense => "no_license",
            Status::Invalid => "invalid",
            Status::Expired => "expired",
            Status::MachineMismatch => "machine_mismatch",
            Status::OfflineExpired => "offline_expired",
            Status::Tampered => "tampered",
            Status::ClockTampered => "clock_tampered",
        };
        write!(f, "{}", s)
    }
}

/// Result of a `check()` call: the terminal status plus, where one survived
/// the checks, the stored record.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: Status,
    pub license: Option<License>,
}

impl CheckOutcome {
    fn bare(status: Status) -> Self {
        Self {
            status,
            license: None,
        }
    }

    fn with_license(status: Status, license: License) -> Self {
        Self {
            status,
            license: Some(license),
        }
    }
}

/// The license engine: the only surface the rest of the program depends on.
///
/// One instance is constructed at startup and passed to whatever needs it; the
/// file paths and API endpoint come from the config so tests can point both at
/// scratch state and a local mock server.
pub struct LicenseEngine {
    config: LicenseConfig,
    signer: Signer,
    store: LicenseStore,
    clock: ClockGuard,
    api: LicenseApiClient,
}

impl LicenseEngine {
    pub fn new(config: LicenseConfig) -> Result<Self> {
        let api = LicenseApiClient::new(&config)?;
        let store = LicenseStore::new(config.license_path(), config.clock_reference_path());
        let clock = ClockGuard::new(config.clock_reference_path(), config.clock_drift_tolerance);

        Ok(Self {
            config,
            signer: Signer::machine_bound(),
            store,
            clock,
            api,
        })
    }

    /// Validate the stored license. Never errors and never panics: every
    /// failure path maps to one of the terminal statuses.
    ///
    /// Ordering matters. The clock is checked before any time math, or a
    /// rolled-back clock could make an expired license look freshly verified.
    /// The signature is checked before the machine-id comparison, or a forged
    /// record could manufacture a match.
    pub async fn check(&self) -> CheckOutcome {
        if !self.clock.is_valid() {
            warn!("System clock moved backward past tolerance");
            return CheckOutcome::bare(Status::ClockTampered);
        }

        let Some(mut license) = self.store.load() else {
            return CheckOutcome::bare(Status::NoLicense);
        };

        if !self.signer.verify(&license) {
            warn!("License signature mismatch, discarding record");
            self.store.clear();
            return CheckOutcome::bare(Status::Tampered);
        }

        // Mismatch does not discard the record: it may still be valid
        // evidence of a purchase, and the user is expected to re-activate.
        let current_machine = machine::fingerprint();
        if license.machine_id != current_machine {
            return CheckOutcome::with_license(Status::MachineMismatch, license);
        }

        let days_since_verified = (Utc::now() - license.last_verified).num_days();
        let within_grace = days_since_verified < self.config.grace_period_days;

        if days_since_verified >= self.config.reverify_interval_days {
            debug!(
                "Re-verification due ({} days since last contact)",
                days_since_verified
            );
            match self.api.verify(&license.email, &license.key).await {
                Ok(true) => {
                    license.last_verified = Utc::now();
                    if let Err(e) = self.store.save(&license) {
                        // The verification itself succeeded; a failed refresh
                        // only means the next run re-verifies again.
                        warn!("Failed to persist refreshed license: {}", e);
                    }
                    info!("License re-verified with server");
                    CheckOutcome::with_license(Status::Valid, license)
                }
                Ok(false) => {
                    info!("Server reports license invalid, discarding record");
                    self.store.clear();
                    CheckOutcome::bare(Status::Invalid)
                }
                Err(e) => {
                    // A down server must never look like a revoked key.
                    debug!("License server unreachable: {}", e);
                    if within_grace {
                        CheckOutcome::with_license(Status::OfflineGrace, license)
                    } else {
                        CheckOutcome::with_license(Status::OfflineExpired, license)
                    }
                }
            }
        } else if within_grace {
            CheckOutcome::with_license(Status::Valid, license)
        } else {
            CheckOutcome::with_license(Status::Expired, license)
        }
    }

    /// Activate a key on this machine. On server-side failure nothing is
    /// written locally; on success the new record overwrites any prior one.
    pub async fn activate(&self, email: &str, key: &str) -> Result<ActivationResult> {
        let machine_id = machine::fingerprint();

        let result = self.api.activate(email, key, &machine_id).await?;
        if !result.activated {
            info!("Activation rejected by server: {}", result.message);
            return Ok(result);
        }

        let now = Utc::now();
        let mut license = License {
            key: key.to_string(),
            email: email.to_string(),
            machine_id,
            activated_at: now,
            last_verified: now,
            signature: String::new(),
        };
        license.signature = self.signer.sign(
            &license.key,
            &license.email,
            &license.machine_id,
            license.activated_at,
        );

        self.store.save(&license)?;
        info!("License activated and saved");

        Ok(result)
    }

    /// Look up the license key registered for an email address.
    pub async fn recover(&self, email: &str) -> Result<String, ApiError> {
        self.api.recover(email).await
    }

    /// Delete the stored license and clock reference. Idempotent.
    pub fn clear(&self) {
        self.store.clear();
    }
}
