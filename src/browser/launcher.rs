use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use super::BrowserError;

/// Poll interval for the post-launch readiness probe.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long the readiness probe waits before giving up and killing the child.
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period between SIGTERM and SIGKILL during teardown.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Options for launching a browser process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Path to the browser executable.
    pub chrome_path: PathBuf,
    /// Remote debugging port to bind.
    pub port: u16,
    /// Launch with `--headless=new`.
    pub headless: bool,
    /// User data directory. A fresh temporary directory is created (and
    /// recorded for cleanup) when omitted.
    pub data_dir: Option<PathBuf>,
}

/// A handle to a launched browser process.
pub struct BrowserInstance {
    child: Option<std::process::Child>,
    port: u16,
    data_dir: PathBuf,
    /// True when the launcher created the data dir and owns its removal.
    owns_data_dir: bool,
}

impl BrowserInstance {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.as_ref().map_or(0, std::process::Child::id)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Terminate the browser: SIGTERM, wait up to five seconds, SIGKILL.
    /// Removes the data dir only if this launcher created it.
    pub fn close(&mut self) {
        if let Some(child) = self.child.take() {
            terminate_pid(child.id());
        }
        if self.owns_data_dir {
            let _ = std::fs::remove_dir_all(&self.data_dir);
            self.owns_data_dir = false;
        }
    }

    /// Release the process so it outlives this handle. Returns
    /// `(pid, port, data_dir)`; the caller owns the process lifetime and
    /// the data dir from here on.
    #[must_use]
    pub fn detach(mut self) -> (u32, u16, PathBuf) {
        let pid = self.pid();
        let port = self.port;
        let data_dir = self.data_dir.clone();
        self.child = None;
        self.owns_data_dir = false;
        (pid, port, data_dir)
    }
}

impl Drop for BrowserInstance {
    fn drop(&mut self) {
        self.close();
    }
}

/// Locate a browser executable. Probes, in order: the explicit path, the
/// `HUBCAP_CHROME` environment variable, then platform well-known install
/// locations. First existing executable wins.
///
/// # Errors
///
/// Returns `BrowserError::NotFound` when no candidate exists.
pub fn find_binary(explicit: Option<&Path>) -> Result<PathBuf, BrowserError> {
    let env_override = std::env::var("HUBCAP_CHROME").ok().map(PathBuf::from);
    find_binary_with(explicit, env_override.as_deref())
}

/// Testable core of [`find_binary`] taking the env override as a parameter.
pub fn find_binary_with(
    explicit: Option<&Path>,
    env_override: Option<&Path>,
) -> Result<PathBuf, BrowserError> {
    for candidate in explicit.into_iter().chain(env_override) {
        if candidate.exists() {
            return Ok(candidate.to_path_buf());
        }
    }

    for candidate in platform_candidates() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(BrowserError::NotFound(
        "no Chromium-family browser located; set HUBCAP_CHROME or pass --chrome-path".into(),
    ))
}

/// Well-known install locations for the current platform.
fn platform_candidates() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
            PathBuf::from("/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        let names = [
            "google-chrome",
            "google-chrome-stable",
            "chromium-browser",
            "chromium",
            "microsoft-edge",
        ];
        let path_dirs: Vec<PathBuf> = std::env::var("PATH")
            .unwrap_or_default()
            .split(':')
            .map(PathBuf::from)
            .collect();
        let mut candidates = Vec::new();
        for name in names {
            for dir in &path_dirs {
                candidates.push(dir.join(name));
            }
        }
        candidates
    }

    #[cfg(target_os = "windows")]
    {
        let program_files = std::env::var("ProgramFiles").unwrap_or_default();
        let program_files_x86 = std::env::var("ProgramFiles(x86)").unwrap_or_default();
        vec![
            PathBuf::from(&program_files).join("Google/Chrome/Application/chrome.exe"),
            PathBuf::from(&program_files_x86).join("Google/Chrome/Application/chrome.exe"),
            PathBuf::from(&program_files).join("Microsoft/Edge/Application/msedge.exe"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}

/// Check whether something is listening on `host:port`.
#[must_use]
pub fn is_port_open(host: &str, port: u16) -> bool {
    let Ok(addr) = format!("{host}:{port}").parse() else {
        return false;
    };
    std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(250)).is_ok()
}

/// Pick an unused TCP port on localhost.
///
/// # Errors
///
/// Returns `BrowserError::LaunchFailed` if binding fails.
pub fn find_available_port() -> Result<u16, BrowserError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(|e| {
        BrowserError::LaunchFailed(format!("could not bind to find a free port: {e}"))
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::LaunchFailed(format!("could not get local address: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}

/// Spawn a browser with the given options and wait for its debug port to
/// open, polling every 50 ms for up to 10 s.
///
/// # Errors
///
/// Returns `BrowserError::LaunchFailed` if the spawn fails or the child
/// exits early, or `BrowserError::StartupTimeout` (after killing the child)
/// if the probe expires.
pub async fn launch(options: LaunchOptions) -> Result<BrowserInstance, BrowserError> {
    let (data_dir, owns_data_dir) = match options.data_dir {
        Some(dir) => (dir, false),
        None => {
            let dir = std::env::temp_dir().join(format!("hubcap-{}", random_suffix()));
            std::fs::create_dir_all(&dir)?;
            (dir, true)
        }
    };

    let mut cmd = Command::new(&options.chrome_path);
    cmd.arg(format!("--remote-debugging-port={}", options.port))
        .arg(format!("--user-data-dir={}", data_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking");

    if options.headless {
        cmd.arg("--headless=new");
    }

    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let child = cmd.spawn().map_err(|e| {
        if owns_data_dir {
            let _ = std::fs::remove_dir_all(&data_dir);
        }
        BrowserError::LaunchFailed(format!(
            "failed to spawn {}: {e}",
            options.chrome_path.display()
        ))
    })?;

    let mut instance = BrowserInstance {
        child: Some(child),
        port: options.port,
        data_dir,
        owns_data_dir,
    };

    let start = tokio::time::Instant::now();
    loop {
        if start.elapsed() > READY_PROBE_TIMEOUT {
            instance.close();
            return Err(BrowserError::StartupTimeout { port: options.port });
        }

        if let Some(child) = instance.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(BrowserError::LaunchFailed(format!(
                    "browser exited with status {status} before becoming ready"
                )));
            }
        }

        if is_port_open("127.0.0.1", options.port) {
            return Ok(instance);
        }

        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// Check whether a pid names a live process. Pids outside the i32 range
/// cannot exist and report dead.
#[must_use]
pub fn is_pid_alive(pid: u32) -> bool {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    if pid_i32 == 0 {
        return false;
    }
    #[cfg(unix)]
    {
        // Signal 0 checks for existence without delivering anything.
        // SAFETY: kill with signal 0 only performs the permission/existence check.
        (unsafe { libc::kill(pid_i32, 0) }) == 0
    }
    #[cfg(windows)]
    {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid_i32}"), "/NH", "/FO", "CSV"])
            .output();
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&pid_i32.to_string()),
            Err(_) => false,
        }
    }
}

/// Terminate a process: SIGTERM to the process group, poll for exit for up
/// to five seconds, then SIGKILL. Best-effort; errors are ignored.
pub fn terminate_pid(pid: u32) {
    let Ok(pid_i32) = i32::try_from(pid) else {
        return;
    };
    if pid_i32 == 0 {
        return;
    }
    #[cfg(unix)]
    {
        // Negative pid targets the whole process group (renderers, GPU,
        // utility processes). Fall back to the main pid when the browser is
        // not a group leader.
        // SAFETY: plain signal delivery; no memory is touched.
        let term_result = unsafe { libc::kill(-pid_i32, libc::SIGTERM) };
        if term_result != 0 {
            unsafe { libc::kill(pid_i32, libc::SIGTERM) };
        }

        let poll_interval = Duration::from_millis(100);
        let start = std::time::Instant::now();
        while start.elapsed() < TERM_GRACE {
            if !is_pid_alive(pid) {
                return;
            }
            std::thread::sleep(poll_interval);
        }

        let kill_result = unsafe { libc::kill(-pid_i32, libc::SIGKILL) };
        if kill_result != 0 {
            unsafe { libc::kill(pid_i32, libc::SIGKILL) };
        }
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid_i32.to_string()])
            .output();
    }
}

/// Random hex suffix for temporary data directory names. Reads
/// `/dev/urandom` where available, falling back to pid + stack address.
fn random_suffix() -> String {
    use std::io::Read;
    let mut buf = [0u8; 8];
    if let Ok(mut f) = std::fs::File::open("/dev/urandom") {
        if f.read_exact(&mut buf).is_ok() {
            return hex_encode(&buf);
        }
    }
    let pid = std::process::id();
    let addr = &raw const buf as usize;
    format!("{pid:x}-{addr:x}")
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_available_port_returns_nonzero() {
        let port = find_available_port().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn is_port_open_true_for_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_open("127.0.0.1", port));
    }

    #[test]
    fn is_port_open_false_for_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!is_port_open("127.0.0.1", port));
    }

    #[test]
    fn explicit_path_wins_when_it_exists() {
        let exe = std::env::current_exe().unwrap();
        let found = find_binary_with(Some(&exe), None).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn env_override_used_when_explicit_missing() {
        let exe = std::env::current_exe().unwrap();
        let missing = Path::new("/nonexistent/hubcap-test-browser");
        let found = find_binary_with(Some(missing), Some(&exe)).unwrap();
        assert_eq!(found, exe);
    }

    #[test]
    fn nonexistent_override_is_skipped() {
        let fake = Path::new("/nonexistent/hubcap-test-browser");
        if let Ok(path) = find_binary_with(Some(fake), Some(fake)) {
            assert_ne!(path.as_path(), fake);
        }
    }

    #[test]
    fn current_process_pid_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_is_not_alive() {
        assert!(!is_pid_alive(0));
    }

    #[test]
    fn random_suffix_is_hex_like() {
        let s = random_suffix();
        assert!(!s.is_empty());
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }
}
