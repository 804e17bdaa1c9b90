#![allow(clippy::doc_markdown)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hubcap",
    version,
    about = "Drive Chromium-family browsers over the DevTools Protocol",
    long_about = "hubcap is a command-line client for the Chrome DevTools Protocol. It connects \
        to a running browser's remote debugging endpoint (or launches one on demand), and exposes \
        navigation, DOM queries, input synthesis, capture, emulation, storage, and profiling as \
        subcommands that print JSON, suitable for shell pipelines and CI scripts.",
    term_width = 100
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalOpts {
    /// Remote debugging port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Remote debugging host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Profile name from profiles.json
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Command timeout as a duration string (e.g. 30s, 2m)
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Target tab: an index into the target list or a target id
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Output format: json, ndjson, or text
    #[arg(long, global = true)]
    pub output: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Browser version and debugger endpoint info
    Version,

    /// List, open, close, or activate targets
    Targets(TargetsArgs),

    /// Navigate the target to a URL
    Navigate(NavigateArgs),

    /// Reload the target
    Reload(ReloadArgs),

    /// Go back in history
    Back,

    /// Go forward in history
    Forward,

    /// Evaluate a JavaScript expression in the page
    Eval(EvalArgs),

    /// Query the DOM by CSS selector
    Query(QueryArgs),

    /// Read or extract page content (text, html, table, forms, find)
    Content(ContentArgs),

    /// Click an element or coordinate
    Click(ClickArgs),

    /// Focus a field and replace its value
    Fill(FillArgs),

    /// Type text as key events (C-style escapes \n \t \\)
    Type(TypeArgs),

    /// Press a key combination like Ctrl+Shift+A
    Press(PressArgs),

    /// Capture a screenshot of the page or one element
    Screenshot(ScreenshotArgs),

    /// Render the page to PDF
    Pdf(PdfArgs),

    /// Wait for a page condition
    Wait(WaitArgs),

    /// Emulate a device, viewport, media, or geolocation
    Emulate(EmulateArgs),

    /// Apply a network throttling preset
    Throttle(ThrottleArgs),

    /// Read, set, or clear cookies
    Cookies(CookiesArgs),

    /// Read or write localStorage
    Storage(StorageArgs),

    /// Stream console messages as NDJSON
    Console(StreamArgs),

    /// Stream uncaught exceptions as NDJSON
    Exceptions(StreamArgs),

    /// Stream network events as NDJSON
    Network(StreamArgs),

    /// Block requests matching URL patterns
    Block(BlockArgs),

    /// Intercept matching responses and rewrite their bodies
    Intercept(InterceptArgs),

    /// Collect performance metrics
    Metrics,

    /// Inspect profiles and the resolved configuration
    Profiles(ProfilesArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct TargetsArgs {
    #[command(subcommand)]
    pub command: Option<TargetsCommand>,
}

#[derive(Subcommand)]
pub enum TargetsCommand {
    /// List all targets (default)
    List,
    /// Open a new tab
    New {
        /// URL to open
        #[arg(default_value = "about:blank")]
        url: String,
    },
    /// Close a target
    Close {
        /// Target id (defaults to the resolved target)
        id: Option<String>,
    },
    /// Bring a target to the foreground
    Activate {
        /// Target id (defaults to the resolved target)
        id: Option<String>,
    },
}

#[derive(Args)]
pub struct NavigateArgs {
    /// URL to open
    pub url: String,

    /// Return as soon as the browser accepts the navigation
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args)]
pub struct ReloadArgs {
    /// Bypass the cache
    #[arg(long)]
    pub ignore_cache: bool,
}

#[derive(Args)]
pub struct EvalArgs {
    /// Expression to evaluate
    pub expression: String,
}

#[derive(Args)]
pub struct QueryArgs {
    /// CSS selector
    pub selector: String,

    /// Describe every match instead of the first
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ContentArgs {
    #[command(subcommand)]
    pub command: ContentCommand,
}

#[derive(Subcommand)]
pub enum ContentCommand {
    /// Visible text of the page or an element
    Text {
        /// CSS selector (whole page when omitted)
        selector: Option<String>,
    },
    /// Outer HTML of the document or an element
    Html {
        /// CSS selector (whole document when omitted)
        selector: Option<String>,
    },
    /// Attributes of the first match
    Attrs {
        /// CSS selector
        selector: String,
    },
    /// Computed style of the first match
    Style {
        /// CSS selector
        selector: String,
        /// Property names (a standard set when omitted)
        properties: Vec<String>,
    },
    /// Enumerate forms and fields
    Forms,
    /// Extract a table as row objects
    Table {
        /// CSS selector of the table
        selector: String,
    },
    /// Find visible elements containing text
    Find {
        /// Substring to search for
        text: String,
        /// Maximum matches to report
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Read a form control's value
    Value {
        /// CSS selector
        selector: String,
    },
}

#[derive(Args)]
pub struct ClickArgs {
    /// CSS selector
    pub selector: Option<String>,

    /// Click at viewport coordinates x,y instead of a selector
    #[arg(long, value_name = "X,Y", conflicts_with = "selector")]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct FillArgs {
    /// CSS selector
    pub selector: String,
    /// Replacement value
    pub text: String,
}

#[derive(Args)]
pub struct TypeArgs {
    /// Text to type
    pub text: String,
}

#[derive(Args)]
pub struct PressArgs {
    /// Key or combination (Enter, Ctrl+A, Ctrl+Shift+Tab)
    pub combination: String,
}

#[derive(Args)]
pub struct ScreenshotArgs {
    /// Capture only the first element matching this selector
    #[arg(long)]
    pub selector: Option<String>,

    /// Image format: png, jpeg, or webp
    #[arg(long, default_value = "png")]
    pub format: String,

    /// JPEG/WebP quality (0-100)
    #[arg(long)]
    pub quality: Option<u8>,

    /// Capture the full scrollable page
    #[arg(long)]
    pub full_page: bool,

    /// Write bytes to this file instead of base64 on stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct PdfArgs {
    /// Landscape orientation
    #[arg(long)]
    pub landscape: bool,

    /// Write bytes to this file instead of base64 on stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct WaitArgs {
    #[command(subcommand)]
    pub command: WaitCommand,
}

#[derive(Subcommand)]
pub enum WaitCommand {
    /// Wait for a selector to appear
    For {
        selector: String,
    },
    /// Wait for a selector to disappear
    Gone {
        selector: String,
    },
    /// Wait for text to appear in the page body
    Text {
        text: String,
    },
    /// Wait for an expression to become truthy
    Fn {
        expression: String,
    },
    /// Wait for the next main-frame navigation
    Nav,
    /// Wait for the main-frame URL to contain a substring
    Url {
        pattern: String,
    },
    /// Wait for the first request whose URL contains a substring
    Request {
        pattern: String,
    },
    /// Wait for the first response whose URL contains a substring
    Response {
        pattern: String,
    },
    /// Wait until no request has been in flight for the window
    Idle {
        /// Idle window as a duration string
        #[arg(default_value = "500ms")]
        window: String,
    },
}

#[derive(Args)]
pub struct EmulateArgs {
    #[command(subcommand)]
    pub command: EmulateCommand,
}

#[derive(Subcommand)]
pub enum EmulateCommand {
    /// Apply a named device preset
    Device {
        /// Preset name (see `emulate list`)
        name: String,
    },
    /// List device presets
    List,
    /// Override the viewport
    Viewport {
        /// WIDTHxHEIGHT, e.g. 1280x720
        size: String,
        /// Device scale factor
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
        /// Emulate a mobile viewport
        #[arg(long)]
        mobile: bool,
    },
    /// Override the user agent
    UserAgent {
        user_agent: String,
    },
    /// Emulate media features (e.g. prefers-color-scheme=dark)
    Media {
        /// Media type (screen, print)
        #[arg(long)]
        media: Option<String>,
        /// name=value feature pairs
        features: Vec<String>,
    },
    /// Override geolocation
    #[command(allow_negative_numbers = true)]
    Geo {
        latitude: f64,
        longitude: f64,
        /// Accuracy in meters
        #[arg(long, default_value_t = 1.0)]
        accuracy: f64,
    },
    /// Grant, deny, or reset a permission for an origin
    Permission {
        origin: String,
        /// Permission name (geolocation, notifications, ...)
        permission: String,
        /// granted, denied, or prompt
        setting: String,
    },
    /// Clear device metrics and geolocation overrides
    Reset,
}

#[derive(Args)]
pub struct ThrottleArgs {
    /// offline, slow3g, fast3g, slow4g, fast4g, or none
    pub preset: String,
}

#[derive(Args)]
pub struct CookiesArgs {
    #[command(subcommand)]
    pub command: Option<CookiesCommand>,
}

#[derive(Subcommand)]
pub enum CookiesCommand {
    /// List cookies visible to the page (default)
    Get,
    /// Set a cookie
    Set {
        /// name=value
        cookie: String,
        /// Cookie domain (inferred from the page URL when omitted)
        #[arg(long)]
        domain: Option<String>,
        /// Cookie path
        #[arg(long)]
        path: Option<String>,
        /// Secure flag
        #[arg(long)]
        secure: bool,
        /// HttpOnly flag
        #[arg(long)]
        http_only: bool,
    },
    /// Delete all browser cookies
    Clear,
}

#[derive(Args)]
pub struct StorageArgs {
    #[command(subcommand)]
    pub command: StorageCommand,
}

#[derive(Subcommand)]
pub enum StorageCommand {
    /// Read a localStorage key
    Get {
        key: String,
    },
    /// Write a localStorage key
    Set {
        key: String,
        value: String,
    },
    /// Remove a localStorage key
    Remove {
        key: String,
    },
    /// Clear localStorage for the origin
    Clear,
    /// List localStorage keys
    Keys,
}

#[derive(Args)]
pub struct StreamArgs {
    /// Stop after this long (runs until Ctrl-C when omitted)
    #[arg(long, value_name = "DURATION")]
    pub duration: Option<String>,
}

#[derive(Args)]
pub struct BlockArgs {
    /// URL patterns (`*` wildcards)
    #[arg(required_unless_present = "clear")]
    pub patterns: Vec<String>,

    /// Clear the blocked list
    #[arg(long, conflicts_with = "patterns")]
    pub clear: bool,
}

#[derive(Args)]
pub struct InterceptArgs {
    /// Glob over request URLs
    #[arg(long)]
    pub pattern: String,

    /// old:new body replacements (split on the first colon)
    #[arg(long = "replace", value_name = "OLD:NEW")]
    pub replacements: Vec<String>,

    /// Pause at the response stage to rewrite bodies
    #[arg(long)]
    pub on_response: bool,

    /// Stop after this long (runs until Ctrl-C when omitted)
    #[arg(long, value_name = "DURATION")]
    pub duration: Option<String>,
}

#[derive(Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: Option<ProfilesCommand>,
}

#[derive(Subcommand)]
pub enum ProfilesCommand {
    /// List profile names and the stored default (default)
    List,
    /// Show the fully resolved configuration for this invocation
    Show,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
