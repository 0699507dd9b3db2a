use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::machine;

use super::License;

type HmacSha256 = Hmac<Sha256>;

// Compiled into the binary; bump the version to deliberately invalidate
// records signed by older builds.
const SIGNING_SALT: &str = "wizado-license-signing-key-v1";

/// Computes and verifies the HMAC-SHA256 signature on license records.
///
/// The key is derived from identifiers of the machine the program is running
/// on, so a record copied to another machine fails verification even before
/// the machine-id comparison runs.
pub struct Signer {
    secret: String,
}

impl Signer {
    /// Signer bound to the current machine.
    pub fn machine_bound() -> Self {
        let mut material = String::new();
        if let Some(id) = machine::machine_id() {
            material.push_str(&id);
        }
        if let Some(uuid) = machine::product_uuid() {
            material.push_str(&uuid);
        }
        if let Some(host) = machine::host_name() {
            material.push_str(&host);
        }
        material.push_str(SIGNING_SALT);

        Self {
            secret: hex::encode(Sha256::digest(material.as_bytes())),
        }
    }

    /// Signer with an explicit secret; used by tests to simulate a record
    /// produced on a different machine.
    #[cfg(test)]
    pub fn with_secret(secret: &str) -> Self {
        Self {
            secret: secret.to_string(),
        }
    }

    /// HMAC-SHA256 over the record's identifying fields, hex encoded.
    pub fn sign(
        &self,
        key: &str,
        email: &str,
        machine_id: &str,
        activated_at: DateTime<Utc>,
    ) -> String {
        let data = format!(
            "{}|{}|{}|{}",
            key,
            email,
            machine_id,
            activated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Recompute the expected signature from the record's own fields and
    /// compare in constant time. Any mismatch means the record was edited or
    /// came from another machine.
    pub fn verify(&self, license: &License) -> bool {
        if license.signature.is_empty() {
            return false;
        }
        let Ok(sig_bytes) = hex::decode(&license.signature) else {
            return false;
        };

        let data = format!(
            "{}|{}|{}|{}",
            license.key,
            license.email,
            license.machine_id,
            license.activated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        mac.verify_slice(&sig_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_license(signer: &Signer) -> License {
        let activated_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut license = License {
            key: "KEY-1234".to_string(),
            email: "user@example.com".to_string(),
            machine_id: "abc123".to_string(),
            activated_at,
            last_verified: activated_at,
            signature: String::new(),
        };
        license.signature = signer.sign(
            &license.key,
            &license.email,
            &license.machine_id,
            license.activated_at,
        );
        license
    }

    #[test]
    fn signed_record_verifies() {
        let signer = Signer::machine_bound();
        let license = sample_license(&signer);
        assert!(signer.verify(&license));
    }

    #[test]
    fn any_field_edit_breaks_the_signature() {
        let signer = Signer::machine_bound();

        let mut edited = sample_license(&signer);
        edited.key.push('X');
        assert!(!signer.verify(&edited));

        let mut edited = sample_license(&signer);
        edited.email = "other@example.com".to_string();
        assert!(!signer.verify(&edited));

        let mut edited = sample_license(&signer);
        edited.machine_id = "def456".to_string();
        assert!(!signer.verify(&edited));

        let mut edited = sample_license(&signer);
        edited.activated_at += chrono::Duration::seconds(1);
        assert!(!signer.verify(&edited));
    }

    #[test]
    fn record_from_another_machine_fails() {
        let theirs = Signer::with_secret("someone-elses-machine");
        let license = sample_license(&theirs);

        let ours = Signer::with_secret("our-machine");
        assert!(!ours.verify(&license));
    }

    #[test]
    fn empty_or_garbage_signature_fails() {
        let signer = Signer::machine_bound();

        let mut license = sample_license(&signer);
        license.signature = String::new();
        assert!(!signer.verify(&license));

        let mut license = sample_license(&signer);
        license.signature = "not-hex-at-all".to_string();
        assert!(!signer.verify(&license));
    }

    #[test]
    fn last_verified_is_not_covered_by_the_signature() {
        // Re-verification refreshes lastVerified without re-activating; the
        // signature must stay valid across that update.
        let signer = Signer::machine_bound();
        let mut license = sample_license(&signer);
        license.last_verified += chrono::Duration::days(3);
        assert!(signer.verify(&license));
    }
}
