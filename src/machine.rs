use std::fs;
use std::path::Path;
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Generate a stable, hardware-based identifier for this machine.
///
/// Combines several independent sources and hashes them with SHA-256. No single
/// source is authoritative: MACs change with dongles, DMI UUIDs can be absent in
/// containers, disk serials may be virtualized. Sources that cannot be read are
/// simply skipped, so this never fails - but the same machine state always
/// produces the same digest.
pub fn fingerprint() -> String {
    let sources: [Option<String>; 8] = [
        machine_id(),
        product_uuid(),
        root_disk_serial(),
        primary_mac(),
        cpu_info(),
        gpu_info(),
        host_name(),
        user_name(),
    ];

    let mut hasher = Sha256::new();
    let mut available = 0;
    for value in sources.into_iter().flatten() {
        hasher.update(value.as_bytes());
        available += 1;
    }
    debug!("Machine fingerprint built from {} sources", available);

    hex::encode(hasher.finalize())
}

/// Systemd machine id, the most stable software identifier on Linux.
pub fn machine_id() -> Option<String> {
    read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id"))
}

/// DMI product UUID (hardware-backed, harder to fake than machine-id).
pub fn product_uuid() -> Option<String> {
    read_trimmed("/sys/class/dmi/id/product_uuid").or_else(|| {
        // dmidecode typically needs root; fine to miss
        command_stdout("dmidecode", &["-s", "system-uuid"])
    })
}

/// Serial number of the disk backing the root filesystem.
fn root_disk_serial() -> Option<String> {
    let df = command_stdout("df", &["/"])?;
    let device = df.lines().nth(1)?.split_whitespace().next()?;

    // Strip the partition suffix: /dev/sda1 -> sda, /dev/nvme0n1p2 -> nvme0n1p
    let mut name = Path::new(device).file_name()?.to_str()?.to_string();
    while name.ends_with(|c: char| c.is_ascii_digit()) {
        name.pop();
    }

    if let Some(serial) = read_trimmed(&format!("/sys/block/{}/device/serial", name)) {
        return Some(serial);
    }

    let out = command_stdout("udevadm", &["info", "--query=property", &format!("--name=/dev/{}", name)])?;
    out.lines()
        .find_map(|line| line.strip_prefix("ID_SERIAL="))
        .map(str::to_string)
}

/// MAC address of the interface carrying the default route.
fn primary_mac() -> Option<String> {
    let route = command_stdout("ip", &["route", "get", "1.1.1.1"])?;
    let fields: Vec<&str> = route.split_whitespace().collect();
    let iface = fields
        .iter()
        .position(|f| *f == "dev")
        .and_then(|i| fields.get(i + 1))?;

    read_trimmed(&format!("/sys/class/net/{}/address", iface))
}

/// CPU model name and family from /proc/cpuinfo.
fn cpu_info() -> Option<String> {
    let data = fs::read_to_string("/proc/cpuinfo").ok()?;
    let mut parts = Vec::new();
    for line in data.lines() {
        if line.starts_with("model name") || line.starts_with("cpu family") {
            if let Some((_, value)) = line.split_once(':') {
                parts.push(value.trim().to_string());
            }
            if parts.len() >= 2 {
                break;
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("|"))
    }
}

/// First VGA/3D/display controller line from lspci.
fn gpu_info() -> Option<String> {
    let out = command_stdout("lspci", &[])?;
    out.lines()
        .find(|line| {
            let lower = line.to_lowercase();
            lower.contains("vga") || lower.contains("3d") || lower.contains("display")
        })
        .map(|line| line.trim().to_string())
}

pub fn host_name() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}

fn user_name() -> Option<String> {
    // Resolved through the user database first: systemd units and cron jobs
    // don't export $USER, and the fingerprint must not change with the
    // launching environment.
    command_stdout("id", &["-un"]).or_else(|| {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
    })
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(fingerprint(), fingerprint());
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint();
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn username_comes_from_the_user_database() {
        // Wherever `id` exists, its answer wins over whatever the launching
        // environment exported (or failed to export).
        if let Some(expected) = command_stdout("id", &["-un"]) {
            assert_eq!(user_name().as_deref(), Some(expected.as_str()));
        }
    }

    #[test]
    fn missing_sources_are_skipped_not_fatal() {
        // Even if every probe fails the digest of the empty input is returned,
        // which is still 64 hex chars.
        let empty = hex::encode(Sha256::digest(b""));
        assert_eq!(empty.len(), 64);
    }
}
