use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Built-in default debug host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Built-in default debug port.
pub const DEFAULT_PORT: u16 = 9222;
/// Built-in default command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Built-in default ephemeral session timeout.
pub const DEFAULT_EPHEMERAL_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// On-disk shapes
// ---------------------------------------------------------------------------

/// A named bundle of connection and launch settings, stored in
/// `<config>/profiles.json`. All fields are optional with zero-value
/// semantics; durations are Go-style strings (`"30s"`, `"10m"`) parsed with
/// a fail-silent fallback.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<String>,
    pub output: Option<String>,
    pub target: Option<String>,
    pub chrome_path: Option<String>,
    pub headless: Option<bool>,
    pub data_dir: Option<String>,
    pub ephemeral: Option<bool>,
    pub ephemeral_timeout: Option<String>,
}

/// The `profiles.json` file: a default profile name plus the profile map.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesFile {
    pub default: String,
    pub profiles: HashMap<String, Profile>,
}

/// A `.hubcaprc` project config file (JSON, CWD then home).
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RcFile {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub timeout: Option<String>,
    pub output: Option<String>,
    pub target: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI flags and environment, as seen by the resolver
// ---------------------------------------------------------------------------

/// The overridable CLI flags. Every field is an `Option` so the resolver
/// can distinguish "explicitly set" from "defaulted" without consulting the
/// parser again.
#[derive(Debug, Default, Clone)]
pub struct Flags {
    pub profile: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<Duration>,
    pub output: Option<String>,
    pub target: Option<String>,
}

/// Environment variables the resolver consults, captured as data so the
/// precedence chain is testable without touching the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub host: Option<String>,
    pub profile: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_process_env() -> Self {
        Self {
            port: std::env::var("HUBCAP_PORT").ok(),
            host: std::env::var("HUBCAP_HOST").ok(),
            profile: std::env::var("HUBCAP_PROFILE").ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved settings for one invocation. Built once per run.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub output: String,
    pub target: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub data_dir: Option<PathBuf>,
    pub ephemeral: bool,
    pub ephemeral_timeout: Duration,
    /// The profile name the resolver settled on, if any.
    pub profile: Option<String>,
    /// The config directory in effect for this run.
    pub config_dir: PathBuf,
}

impl Config {
    fn defaults(config_dir: PathBuf) -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            output: "json".to_owned(),
            target: None,
            chrome_path: None,
            headless: false,
            data_dir: None,
            ephemeral: false,
            ephemeral_timeout: DEFAULT_EPHEMERAL_TIMEOUT,
            profile: None,
            config_dir,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// Could not determine the home directory.
    NoHomeDir,
    /// A profile was named explicitly but does not exist.
    UnknownProfile(String),
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHomeDir => write!(f, "could not determine home directory"),
            Self::UnknownProfile(name) => write!(f, "unknown profile: {name}"),
            Self::Io(e) => write!(f, "config file error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for crate::error::AppError {
    fn from(e: ConfigError) -> Self {
        crate::error::AppError::general(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Go-style durations
// ---------------------------------------------------------------------------

/// Parse a Go-style duration string: one or more `<number><unit>` segments
/// where unit is `ns`, `us`, `ms`, `s`, `m`, or `h` (e.g. `"30s"`,
/// `"1h30m"`, `"1.5s"`). Returns `None` on any malformed input; callers
/// fall back to their default silently.
#[must_use]
pub fn parse_go_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return None;
        }
        let value: f64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];

        let (unit_secs, unit_len) = if rest.starts_with("ns") {
            (1e-9, 2)
        } else if rest.starts_with("us") {
            (1e-6, 2)
        } else if rest.starts_with("ms") {
            (1e-3, 2)
        } else if rest.starts_with('s') {
            (1.0, 1)
        } else if rest.starts_with('m') {
            (60.0, 1)
        } else if rest.starts_with('h') {
            (3600.0, 1)
        } else {
            return None;
        };
        rest = &rest[unit_len..];

        let secs = value * unit_secs;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        total += Duration::from_secs_f64(secs);
    }
    Some(total)
}

fn duration_or(value: Option<&str>, fallback: Duration) -> Duration {
    value.and_then(parse_go_duration).unwrap_or(fallback)
}

// ---------------------------------------------------------------------------
// Config directory and file loading
// ---------------------------------------------------------------------------

/// The hubcap config directory: `HUBCAP_CONFIG_DIR` if set, else
/// `$HOME/.config/hubcap`.
///
/// # Errors
///
/// Returns `ConfigError::NoHomeDir` if neither source resolves.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("HUBCAP_CONFIG_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|h| h.join(".config").join("hubcap"))
        .ok_or(ConfigError::NoHomeDir)
}

/// Load `profiles.json` from a config directory. A missing file yields the
/// empty default; a malformed file warns on stderr and yields the default.
#[must_use]
pub fn load_profiles(config_dir: &Path) -> ProfilesFile {
    let path = config_dir.join("profiles.json");
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(parsed) => parsed,
            Err(e) => {
                eprintln!("warning: could not parse {}: {e}", path.display());
                ProfilesFile::default()
            }
        },
        Err(_) => ProfilesFile::default(),
    }
}

/// Find and load the first `.hubcaprc`: the current directory, then home.
/// Malformed files warn on stderr and are skipped.
#[must_use]
pub fn load_rc_file() -> Option<RcFile> {
    let mut candidates = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(".hubcaprc"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".hubcaprc"));
    }
    load_rc_from(&candidates)
}

/// Testable variant of [`load_rc_file`] taking the candidate list.
#[must_use]
pub fn load_rc_from(candidates: &[PathBuf]) -> Option<RcFile> {
    for path in candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        match serde_json::from_str(&contents) {
            Ok(rc) => return Some(rc),
            Err(e) => {
                eprintln!("warning: could not parse {}: {e}", path.display());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve the configuration for this invocation from every source.
///
/// Precedence, lowest to highest: built-in defaults, named profile,
/// `.hubcaprc` (CWD then home), environment variables (only for fields the
/// caller did not set with an explicit flag), explicit CLI flags.
///
/// # Errors
///
/// Returns `ConfigError::UnknownProfile` when a profile was named via flag
/// or environment but is absent from `profiles.json`, and
/// `ConfigError::NoHomeDir` when no config directory can be determined.
pub fn resolve(flags: &Flags) -> Result<Config, ConfigError> {
    let dir = config_dir()?;
    let profiles = load_profiles(&dir);
    let rc = load_rc_file();
    let env = EnvOverrides::from_process_env();
    resolve_with(flags, &env, rc.as_ref(), &profiles, dir)
}

/// Pure core of [`resolve`]: all sources passed in as data.
///
/// # Errors
///
/// As [`resolve`].
pub fn resolve_with(
    flags: &Flags,
    env: &EnvOverrides,
    rc: Option<&RcFile>,
    profiles: &ProfilesFile,
    config_dir: PathBuf,
) -> Result<Config, ConfigError> {
    let mut config = Config::defaults(config_dir);

    // Profile name: flag > env > stored default.
    let named = flags
        .profile
        .as_deref()
        .or(env.profile.as_deref())
        .filter(|n| !n.is_empty());
    let profile_name = named.or_else(|| {
        (!profiles.default.is_empty() && profiles.profiles.contains_key(&profiles.default))
            .then_some(profiles.default.as_str())
    });

    if let Some(name) = profile_name {
        let Some(profile) = profiles.profiles.get(name) else {
            // A missing default profile is ignored above; only an explicit
            // request can reach this.
            return Err(ConfigError::UnknownProfile(name.to_owned()));
        };
        apply_profile(&mut config, profile);
        config.profile = Some(name.to_owned());
    }

    if let Some(rc) = rc {
        apply_rc(&mut config, rc);
    }

    // Environment applies only to fields with no explicit flag.
    if flags.host.is_none() {
        if let Some(host) = env.host.as_deref().filter(|h| !h.is_empty()) {
            config.host = host.to_owned();
        }
    }
    if flags.port.is_none() {
        if let Some(port) = env.port.as_deref().and_then(|p| p.parse::<u16>().ok()) {
            if port != 0 {
                config.port = port;
            }
        }
    }

    // Explicit flags re-applied last to guarantee top precedence.
    if let Some(host) = &flags.host {
        config.host.clone_from(host);
    }
    if let Some(port) = flags.port {
        config.port = port;
    }
    if let Some(timeout) = flags.timeout {
        config.timeout = timeout;
    }
    if let Some(output) = &flags.output {
        config.output.clone_from(output);
    }
    if let Some(target) = &flags.target {
        config.target = Some(target.clone());
    }

    Ok(config)
}

fn apply_profile(config: &mut Config, profile: &Profile) {
    if let Some(host) = profile.host.as_deref().filter(|h| !h.is_empty()) {
        config.host = host.to_owned();
    }
    if let Some(port) = profile.port.filter(|&p| p != 0) {
        config.port = port;
    }
    config.timeout = duration_or(profile.timeout.as_deref(), config.timeout);
    if let Some(output) = profile.output.as_deref().filter(|o| !o.is_empty()) {
        config.output = output.to_owned();
    }
    if let Some(target) = profile.target.as_deref().filter(|t| !t.is_empty()) {
        config.target = Some(target.to_owned());
    }
    if let Some(path) = profile.chrome_path.as_deref().filter(|p| !p.is_empty()) {
        config.chrome_path = Some(PathBuf::from(path));
    }
    if let Some(headless) = profile.headless {
        config.headless = headless;
    }
    if let Some(dir) = profile.data_dir.as_deref().filter(|d| !d.is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(ephemeral) = profile.ephemeral {
        config.ephemeral = ephemeral;
    }
    config.ephemeral_timeout = duration_or(
        profile.ephemeral_timeout.as_deref(),
        config.ephemeral_timeout,
    );
}

fn apply_rc(config: &mut Config, rc: &RcFile) {
    if let Some(host) = rc.host.as_deref().filter(|h| !h.is_empty()) {
        config.host = host.to_owned();
    }
    if let Some(port) = rc.port.filter(|&p| p != 0) {
        config.port = port;
    }
    config.timeout = duration_or(rc.timeout.as_deref(), config.timeout);
    if let Some(output) = rc.output.as_deref().filter(|o| !o.is_empty()) {
        config.output = output.to_owned();
    }
    if let Some(target) = rc.target.as_deref().filter(|t| !t.is_empty()) {
        config.target = Some(target.to_owned());
    }
}
