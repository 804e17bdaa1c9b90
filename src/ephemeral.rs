//! Ephemeral sessions: browser processes whose lifetime is owned by a
//! profile, pinned by an on-disk record and reclaimed by mtime-based GC.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::browser::{self, BrowserError, LaunchOptions};
use crate::config::{Config, DEFAULT_EPHEMERAL_TIMEOUT, parse_go_duration};

/// On-disk record pinning a launched browser to a profile, stored at
/// `<config>/ephemeral/<profile>.json`. The file's mtime doubles as
/// "last used".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub pid: u32,
    pub port: u16,
    pub data_dir: String,
    /// Go-style duration string; a record older than this (by mtime) with a
    /// dead pid is garbage.
    pub timeout: String,
}

impl SessionRecord {
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        parse_go_duration(&self.timeout).unwrap_or(DEFAULT_EPHEMERAL_TIMEOUT)
    }
}

#[derive(Debug)]
pub enum EphemeralError {
    Io(std::io::Error),
    Launch(BrowserError),
}

impl fmt::Display for EphemeralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "ephemeral session file error: {e}"),
            Self::Launch(e) => write!(f, "ephemeral launch failed: {e}"),
        }
    }
}

impl std::error::Error for EphemeralError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Launch(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for EphemeralError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<BrowserError> for EphemeralError {
    fn from(e: BrowserError) -> Self {
        Self::Launch(e)
    }
}

impl From<EphemeralError> for crate::error::AppError {
    fn from(e: EphemeralError) -> Self {
        match e {
            EphemeralError::Io(_) => crate::error::AppError::general(e.to_string()),
            EphemeralError::Launch(inner) => inner.into(),
        }
    }
}

/// Profile names are user input; reduce them to a filesystem-safe form
/// before using them as a file stem. Unsafe characters become `-` and a
/// short hash of the original is appended so distinct names cannot collide.
#[must_use]
pub fn sanitize_profile_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned == name && !cleaned.is_empty() {
        cleaned
    } else {
        format!("{cleaned}-{:08x}", fnv1a(name.as_bytes()))
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn record_path(config_dir: &Path, profile: &str) -> PathBuf {
    config_dir
        .join("ephemeral")
        .join(format!("{}.json", sanitize_profile_name(profile)))
}

/// Read a record; `Ok(None)` when absent or unparseable (a corrupt record
/// is treated as absent and will be replaced on the next launch).
fn read_record(path: &Path) -> Option<SessionRecord> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Write a record atomically (temp file + rename). Also serves as the
/// mtime touch: rewriting the same contents bumps "last used".
fn write_record(path: &Path, record: &SessionRecord) -> Result<(), EphemeralError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json =
        serde_json::to_string_pretty(record).map_err(|e| EphemeralError::Io(e.into()))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Ensure a browser bound to the resolved profile is running, returning its
/// debug port.
///
/// Reuses the recorded browser when its port still answers (touching the
/// record's mtime); otherwise launches per the profile's settings, detaches
/// the process, and writes a fresh record.
///
/// # Errors
///
/// Returns `EphemeralError::Launch` when no browser can be started, or
/// `EphemeralError::Io` when the record cannot be written.
pub async fn ensure_running(config: &Config) -> Result<u16, EphemeralError> {
    let profile = config.profile.as_deref().unwrap_or("default");
    let path = record_path(&config.config_dir, profile);

    if let Some(record) = read_record(&path) {
        if browser::is_port_open(&config.host, record.port) {
            write_record(&path, &record)?;
            return Ok(record.port);
        }
    }

    let chrome_path = browser::find_binary(config.chrome_path.as_deref())?;
    let port = match config.port {
        0 => browser::find_available_port()?,
        p if browser::is_port_open("127.0.0.1", p) => browser::find_available_port()?,
        p => p,
    };

    let instance = browser::launcher::launch(LaunchOptions {
        chrome_path,
        port,
        headless: config.headless,
        data_dir: config.data_dir.clone(),
    })
    .await?;

    let (pid, port, data_dir) = instance.detach();
    let record = SessionRecord {
        pid,
        port,
        data_dir: data_dir.display().to_string(),
        timeout: format!("{}s", config.ephemeral_timeout.as_secs()),
    };
    write_record(&path, &record)?;

    tracing::debug!("launched ephemeral browser pid={pid} port={port} for profile {profile}");
    Ok(port)
}

/// Garbage-collect stale ephemeral records under `<config>/ephemeral/`.
///
/// A record is garbage only when its mtime is older than its own timeout
/// AND its pid is not a live process; the mtime guard protects freshly
/// written records against races with slow browser startup. Garbage gets a
/// best-effort kill, its record file removed, and its data dir removed when
/// the launcher created it (under the system temp dir).
///
/// Errors are logged and skipped; this runs at the top of every invocation.
pub fn cleanup_stale(config_dir: &Path) {
    cleanup_stale_at(config_dir, SystemTime::now());
}

/// Testable variant of [`cleanup_stale`] with an injected clock.
pub fn cleanup_stale_at(config_dir: &Path, now: SystemTime) {
    let dir = config_dir.join("ephemeral");
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(record) = read_record(&path) else {
            continue;
        };

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok());
        let Some(age) = age else {
            continue;
        };

        if age <= record.timeout_duration() {
            continue;
        }
        if browser::is_pid_alive(record.pid) {
            continue;
        }

        tracing::debug!(
            "reclaiming stale ephemeral session {} (pid {})",
            path.display(),
            record.pid
        );
        browser::terminate_pid(record.pid);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!("could not remove {}: {e}", path.display());
            continue;
        }

        let data_dir = PathBuf::from(&record.data_dir);
        if data_dir.starts_with(std::env::temp_dir()) {
            let _ = std::fs::remove_dir_all(&data_dir);
        }
    }
}
