use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::License;

/// Durable, permission-restricted persistence of the license record and the
/// clock reference.
///
/// Writes go to a temp file in the same directory and are renamed into place,
/// so a concurrent check never observes a half-written record and a crash
/// mid-save leaves the previous record intact.
pub struct LicenseStore {
    license_path: PathBuf,
    clock_reference_path: PathBuf,
}

impl LicenseStore {
    pub fn new(license_path: PathBuf, clock_reference_path: PathBuf) -> Self {
        Self {
            license_path,
            clock_reference_path,
        }
    }

    /// Read the stored record. Absent, unreadable and unparseable files are
    /// all equivalent to "no record" - a partial record is never surfaced.
    pub fn load(&self) -> Option<License> {
        let data = match fs::read_to_string(&self.license_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read license file: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(license) => Some(license),
            Err(e) => {
                warn!("License file is corrupt: {}", e);
                None
            }
        }
    }

    /// Persist the record (already signed) and refresh the clock reference.
    pub fn save(&self, license: &License) -> Result<()> {
        let dir = self
            .license_path
            .parent()
            .context("license path has no parent directory")?;
        fs::create_dir_all(dir).context("Failed to create license directory")?;
        restrict_dir_permissions(dir)?;

        let data = serde_json::to_string_pretty(license).context("Failed to serialize license")?;
        write_atomically(&self.license_path, data.as_bytes())
            .context("Failed to write license file")?;

        // Clock-rollback detection is anchored to the time of the last save.
        let now = Utc::now().timestamp().to_string();
        write_atomically(&self.clock_reference_path, now.as_bytes())
            .context("Failed to write clock reference")?;

        debug!("License saved to {:?}", self.license_path);
        Ok(())
    }

    /// Remove both persisted files. Idempotent; missing files are not errors.
    pub fn clear(&self) {
        for path in [&self.license_path, &self.clock_reference_path] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }
}

fn write_atomically(path: &PathBuf, data: &[u8]) -> Result<()> {
    let dir = path.parent().context("path has no parent directory")?;

    // Each writer gets its own uniquely-named temp file, so two concurrent
    // saves cannot truncate each other's staging file; the loser of the final
    // rename race still leaves a complete record in place.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    restrict_file_permissions(tmp.path())?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_file_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(dir)?.permissions();
    perms.set_mode(0o700);
    fs::set_permissions(dir, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &std::path::Path) -> Result<()> {
    Ok(())
}
