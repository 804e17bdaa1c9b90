mod cli;

use std::time::Duration;

use base64::Engine;
use clap::{CommandFactory, Parser, error::ErrorKind};
use serde::Serialize;

use hubcap::browser;
use hubcap::capture::CaptureStream;
use hubcap::cdp::{CdpClient, CdpConfig};
use hubcap::config::{self, Config, Flags, parse_go_duration};
use hubcap::ephemeral;
use hubcap::error::AppError;
use hubcap::output::{self, OutputFormat};
use hubcap::page::emulate::{ThrottlePreset, device_preset};
use hubcap::page::intercept::{InterceptRule, parse_replacement};
use hubcap::page::storage::parse_cookie_arg;
use hubcap::page::{Page, capture::ImageFormat};

use cli::{
    Cli, Command, ContentCommand, CookiesCommand, EmulateCommand, ProfilesCommand, StorageCommand,
    TargetsCommand, WaitCommand,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are informational, not errors.
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                e.print().expect("failed to write to stdout");
                std::process::exit(0);
            }
            let app_err = AppError::general(e.to_string());
            app_err.print_json_stderr();
            std::process::exit(app_err.code as i32);
        }
    };

    if let Err(e) = run(&cli).await {
        e.print_json_stderr();
        std::process::exit(e.code as i32);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("HUBCAP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let flags = flags_from(&cli.global)?;
    let mut config = config::resolve(&flags)?;

    // Reclaim stale ephemeral browsers before anything else; errors inside
    // are logged and skipped.
    ephemeral::cleanup_stale(&config.config_dir);

    if config.ephemeral {
        config.port = ephemeral::ensure_running(&config).await?;
    }

    let format = OutputFormat::from_config(&config.output);

    match &cli.command {
        Command::Version => cmd_version(&config, format).await,
        Command::Targets(args) => cmd_targets(&config, format, args.command.as_ref()).await,
        Command::Navigate(args) => cmd_navigate(&config, format, args).await,
        Command::Reload(args) => cmd_reload(&config, format, args).await,
        Command::Back => cmd_history(&config, format, true).await,
        Command::Forward => cmd_history(&config, format, false).await,
        Command::Eval(args) => cmd_eval(&config, format, args).await,
        Command::Query(args) => cmd_query(&config, format, args).await,
        Command::Content(args) => cmd_content(&config, format, &args.command).await,
        Command::Click(args) => cmd_click(&config, format, args).await,
        Command::Fill(args) => cmd_fill(&config, format, args).await,
        Command::Type(args) => cmd_type(&config, format, args).await,
        Command::Press(args) => cmd_press(&config, format, args).await,
        Command::Screenshot(args) => cmd_screenshot(&config, format, args).await,
        Command::Pdf(args) => cmd_pdf(&config, format, args).await,
        Command::Wait(args) => cmd_wait(&config, format, &args.command).await,
        Command::Emulate(args) => cmd_emulate(&config, format, &args.command).await,
        Command::Throttle(args) => cmd_throttle(&config, format, args).await,
        Command::Cookies(args) => cmd_cookies(&config, format, args.command.as_ref()).await,
        Command::Storage(args) => cmd_storage(&config, format, &args.command).await,
        Command::Console(args) => cmd_stream(&config, format, StreamKind::Console, args).await,
        Command::Exceptions(args) => {
            cmd_stream(&config, format, StreamKind::Exceptions, args).await
        }
        Command::Network(args) => cmd_stream(&config, format, StreamKind::Network, args).await,
        Command::Block(args) => cmd_block(&config, format, args).await,
        Command::Intercept(args) => cmd_intercept(&config, format, args).await,
        Command::Metrics => cmd_metrics(&config, format).await,
        Command::Profiles(args) => cmd_profiles(&config, format, args.command.as_ref()),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "hubcap", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Translate parsed argv into the resolver's flag set. Explicit flag
/// values are validated strictly here; only config-file values get the
/// fail-silent treatment.
fn flags_from(global: &cli::GlobalOpts) -> Result<Flags, AppError> {
    let timeout = match global.timeout.as_deref() {
        Some(raw) => Some(parse_go_duration(raw).ok_or_else(|| {
            AppError::general(format!("invalid --timeout {raw:?} (expected e.g. 30s, 2m)"))
        })?),
        None => None,
    };
    if let Some(output) = global.output.as_deref() {
        output.parse::<OutputFormat>()?;
    }
    Ok(Flags {
        profile: global.profile.clone(),
        host: global.host.clone(),
        port: global.port,
        timeout,
        output: global.output.clone(),
        target: global.target.clone(),
    })
}

// =============================================================================
// Connection setup
// =============================================================================

async fn connect(config: &Config) -> Result<CdpClient, AppError> {
    let cdp_config = CdpConfig {
        command_timeout: config.timeout,
        ..CdpConfig::default()
    };
    Ok(CdpClient::connect(&config.host, config.port, cdp_config).await?)
}

async fn open_page(client: &CdpClient, config: &Config) -> Result<Page, AppError> {
    let target = client.resolve_target(config.target.as_deref()).await?;
    Ok(client.page(&target.id).await?)
}

async fn connect_page(config: &Config) -> Result<(CdpClient, Page), AppError> {
    let client = connect(config).await?;
    let page = open_page(&client, config).await?;
    Ok((client, page))
}

// =============================================================================
// Simple commands
// =============================================================================

#[derive(Serialize)]
struct VersionOutput {
    browser: String,
    protocol_version: String,
    ws_url: String,
}

async fn cmd_version(config: &Config, format: OutputFormat) -> Result<(), AppError> {
    let version = browser::query_version(&config.host, config.port)
        .await
        .map_err(|e| AppError::connection(e.to_string()))?;
    output::print(
        &VersionOutput {
            browser: version.browser,
            protocol_version: version.protocol_version,
            ws_url: version.ws_debugger_url,
        },
        format,
    )
}

async fn cmd_targets(
    config: &Config,
    format: OutputFormat,
    command: Option<&TargetsCommand>,
) -> Result<(), AppError> {
    let client = connect(config).await?;
    match command {
        None | Some(TargetsCommand::List) => {
            // Older browsers lack Target.getTargets; fall back to the
            // legacy HTTP list endpoint.
            let targets = match client.targets().await {
                Ok(targets) => targets,
                Err(_) => legacy_target_list(config).await?,
            };
            output::print(&targets, format)?;
        }
        Some(TargetsCommand::New { url }) => {
            let target_id = client.new_tab(url).await?;
            output::print(&serde_json::json!({ "target_id": target_id }), format)?;
        }
        Some(TargetsCommand::Close { id }) => {
            let id = match id {
                Some(id) => id.clone(),
                None => client.resolve_target(config.target.as_deref()).await?.id,
            };
            let closed = client.close_target(&id).await?;
            output::print(
                &serde_json::json!({ "target_id": id, "closed": closed }),
                format,
            )?;
        }
        Some(TargetsCommand::Activate { id }) => {
            let id = match id {
                Some(id) => id.clone(),
                None => client.resolve_target(config.target.as_deref()).await?.id,
            };
            client.activate_target(&id).await?;
            output::print(
                &serde_json::json!({ "target_id": id, "activated": true }),
                format,
            )?;
        }
    }
    Ok(())
}

async fn legacy_target_list(
    config: &Config,
) -> Result<Vec<hubcap::page::targets::Target>, AppError> {
    let infos = browser::query_targets(&config.host, config.port)
        .await
        .map_err(|e| AppError::connection(e.to_string()))?;
    Ok(infos
        .into_iter()
        .map(|info| hubcap::page::targets::Target {
            id: info.id,
            target_type: info.target_type,
            title: info.title,
            url: info.url,
            attached: false,
        })
        .collect())
}

async fn cmd_navigate(
    config: &Config,
    format: OutputFormat,
    args: &cli::NavigateArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let result = if args.no_wait {
        page.navigate(&args.url).await?
    } else {
        page.navigate_and_wait(&args.url, config.timeout).await?
    };
    output::print(&result, format)
}

async fn cmd_reload(
    config: &Config,
    format: OutputFormat,
    args: &cli::ReloadArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    page.reload(args.ignore_cache, config.timeout).await?;
    let url = page.url().await?;
    output::print(&serde_json::json!({ "url": url, "reloaded": true }), format)
}

async fn cmd_history(config: &Config, format: OutputFormat, back: bool) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    if back {
        page.back(config.timeout).await?;
    } else {
        page.forward(config.timeout).await?;
    }
    let url = page.url().await?;
    let title = page.title().await?;
    output::print(&serde_json::json!({ "url": url, "title": title }), format)
}

async fn cmd_eval(
    config: &Config,
    format: OutputFormat,
    args: &cli::EvalArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let value = page.eval(&args.expression).await?;
    output::print(&value.to_output(), format)
}

async fn cmd_query(
    config: &Config,
    format: OutputFormat,
    args: &cli::QueryArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    if args.all {
        let nodes = page.query_all(&args.selector).await?;
        output::print(&nodes, format)
    } else {
        let node = page.query(&args.selector).await?;
        output::print(&node, format)
    }
}

async fn cmd_content(
    config: &Config,
    format: OutputFormat,
    command: &ContentCommand,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    match command {
        ContentCommand::Text { selector } => {
            let text = page.text(selector.as_deref()).await?;
            output::print(&text, format)
        }
        ContentCommand::Html { selector } => {
            let html = page.html(selector.as_deref()).await?;
            output::print(&html, format)
        }
        ContentCommand::Attrs { selector } => {
            let attrs = page.attributes(selector).await?;
            output::print(&attrs, format)
        }
        ContentCommand::Style {
            selector,
            properties,
        } => {
            let style = page.computed_style(selector, properties).await?;
            output::print(&style, format)
        }
        ContentCommand::Forms => {
            let forms = page.forms().await?;
            output::print(&forms, format)
        }
        ContentCommand::Table { selector } => {
            let rows = page.extract_table(selector).await?;
            output::print(&rows, format)
        }
        ContentCommand::Find { text, limit } => {
            let matches = page.find_text(text, *limit).await?;
            output::print(&matches, format)
        }
        ContentCommand::Value { selector } => {
            let value = page.value(selector).await?;
            output::print(&serde_json::json!({ "value": value }), format)
        }
    }
}

// =============================================================================
// Input commands
// =============================================================================

async fn cmd_click(
    config: &Config,
    format: OutputFormat,
    args: &cli::ClickArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let result = match (&args.selector, &args.at) {
        (Some(selector), None) => page.click(selector).await?,
        (None, Some(at)) => {
            let (x, y) = parse_point(at)?;
            page.click_at(x, y).await?
        }
        _ => {
            return Err(AppError::general(
                "click needs a selector or --at X,Y".to_owned(),
            ));
        }
    };
    output::print(&result, format)
}

fn parse_point(input: &str) -> Result<(f64, f64), AppError> {
    let parts: Vec<&str> = input.split(',').collect();
    if let [x, y] = parts.as_slice() {
        if let (Ok(x), Ok(y)) = (x.trim().parse(), y.trim().parse()) {
            return Ok((x, y));
        }
    }
    Err(AppError::general(format!(
        "invalid coordinates {input:?} (expected X,Y)"
    )))
}

async fn cmd_fill(
    config: &Config,
    format: OutputFormat,
    args: &cli::FillArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    page.fill(&args.selector, &args.text).await?;
    output::print(
        &serde_json::json!({ "selector": args.selector, "filled": true }),
        format,
    )
}

async fn cmd_type(
    config: &Config,
    format: OutputFormat,
    args: &cli::TypeArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let count = page.type_text(&args.text).await?;
    output::print(&serde_json::json!({ "typed": count }), format)
}

async fn cmd_press(
    config: &Config,
    format: OutputFormat,
    args: &cli::PressArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    page.press(&args.combination).await?;
    output::print(
        &serde_json::json!({ "pressed": args.combination }),
        format,
    )
}

// =============================================================================
// Capture commands
// =============================================================================

#[derive(Serialize)]
struct ScreenshotOutput {
    format: String,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<serde_json::Value>,
}

async fn cmd_screenshot(
    config: &Config,
    format: OutputFormat,
    args: &cli::ScreenshotArgs,
) -> Result<(), AppError> {
    let image_format: ImageFormat = args.format.parse()?;
    let (_client, mut page) = connect_page(config).await?;

    let (bytes, bounds) = match &args.selector {
        Some(selector) => {
            let (bytes, bounds) = page
                .screenshot_element(selector, image_format, args.quality)
                .await?;
            (
                bytes,
                Some(serde_json::json!({
                    "x": bounds.x,
                    "y": bounds.y,
                    "width": bounds.width,
                    "height": bounds.height,
                })),
            )
        }
        None => (
            page.screenshot(image_format, args.quality, args.full_page)
                .await?,
            None,
        ),
    };

    emit_bytes(args.out.as_deref(), &bytes, image_format.as_str(), bounds, format)
}

async fn cmd_pdf(
    config: &Config,
    format: OutputFormat,
    args: &cli::PdfArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let bytes = page.print_to_pdf(args.landscape).await?;
    emit_bytes(args.out.as_deref(), &bytes, "pdf", None, format)
}

fn emit_bytes(
    out: Option<&std::path::Path>,
    bytes: &[u8],
    kind: &str,
    bounds: Option<serde_json::Value>,
    format: OutputFormat,
) -> Result<(), AppError> {
    let (path, data) = match out {
        Some(path) => {
            std::fs::write(path, bytes)
                .map_err(|e| AppError::general(format!("could not write {}: {e}", path.display())))?;
            (Some(path.display().to_string()), None)
        }
        None => (
            None,
            Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        ),
    };
    output::print(
        &ScreenshotOutput {
            format: kind.to_owned(),
            bytes: bytes.len(),
            path,
            data,
            bounds,
        },
        format,
    )
}

// =============================================================================
// Waits
// =============================================================================

async fn cmd_wait(
    config: &Config,
    format: OutputFormat,
    command: &WaitCommand,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let timeout = config.timeout;
    let satisfied: serde_json::Value = match command {
        WaitCommand::For { selector } => {
            page.wait_for(selector, timeout).await?;
            serde_json::json!({ "condition": "selector", "selector": selector })
        }
        WaitCommand::Gone { selector } => {
            page.wait_for_gone(selector, timeout).await?;
            serde_json::json!({ "condition": "gone", "selector": selector })
        }
        WaitCommand::Text { text } => {
            page.wait_for_text(text, timeout).await?;
            serde_json::json!({ "condition": "text", "text": text })
        }
        WaitCommand::Fn { expression } => {
            page.wait_for_fn(expression, timeout).await?;
            serde_json::json!({ "condition": "fn" })
        }
        WaitCommand::Nav => {
            let url = page.wait_for_navigation(timeout).await?;
            serde_json::json!({ "condition": "navigation", "url": url })
        }
        WaitCommand::Url { pattern } => {
            page.wait_for_url(pattern, timeout).await?;
            serde_json::json!({ "condition": "url", "pattern": pattern })
        }
        WaitCommand::Request { pattern } => {
            let params = page.wait_for_request(pattern, timeout).await?;
            serde_json::json!({
                "condition": "request",
                "url": params["request"]["url"],
                "request_id": params["requestId"],
            })
        }
        WaitCommand::Response { pattern } => {
            let params = page.wait_for_response(pattern, timeout).await?;
            serde_json::json!({
                "condition": "response",
                "url": params["response"]["url"],
                "status": params["response"]["status"],
                "request_id": params["requestId"],
            })
        }
        WaitCommand::Idle { window } => {
            let window = parse_go_duration(window)
                .ok_or_else(|| AppError::general(format!("invalid idle window {window:?}")))?;
            page.wait_for_network_idle(window, timeout).await?;
            serde_json::json!({ "condition": "network-idle" })
        }
    };
    output::print(&serde_json::json!({ "satisfied": satisfied }), format)
}

// =============================================================================
// Emulation
// =============================================================================

async fn cmd_emulate(
    config: &Config,
    format: OutputFormat,
    command: &EmulateCommand,
) -> Result<(), AppError> {
    if let EmulateCommand::List = command {
        return output::print(&hubcap::page::emulate::DEVICE_PRESETS, format);
    }

    let (client, mut page) = connect_page(config).await?;
    match command {
        EmulateCommand::List => unreachable!("handled above"),
        EmulateCommand::Device { name } => {
            let preset = device_preset(name)?;
            page.emulate_device(preset).await?;
            output::print(&serde_json::json!({ "device": preset.name }), format)
        }
        EmulateCommand::Viewport {
            size,
            scale,
            mobile,
        } => {
            let (width, height) = parse_viewport(size)?;
            page.set_viewport(width, height, *scale, *mobile).await?;
            output::print(
                &serde_json::json!({ "width": width, "height": height }),
                format,
            )
        }
        EmulateCommand::UserAgent { user_agent } => {
            page.set_user_agent(user_agent).await?;
            output::print(&serde_json::json!({ "user_agent": user_agent }), format)
        }
        EmulateCommand::Media { media, features } => {
            let features = features
                .iter()
                .map(|pair| {
                    pair.split_once('=')
                        .map(|(name, value)| (name.to_owned(), value.to_owned()))
                        .ok_or_else(|| {
                            AppError::general(format!(
                                "media feature must be name=value: {pair:?}"
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            page.set_media(media.as_deref(), &features).await?;
            output::print(&serde_json::json!({ "media": true }), format)
        }
        EmulateCommand::Geo {
            latitude,
            longitude,
            accuracy,
        } => {
            page.set_geolocation(*latitude, *longitude, *accuracy)
                .await?;
            output::print(
                &serde_json::json!({ "latitude": latitude, "longitude": longitude }),
                format,
            )
        }
        EmulateCommand::Permission {
            origin,
            permission,
            setting,
        } => {
            client.set_permission(origin, permission, setting).await?;
            output::print(
                &serde_json::json!({
                    "origin": origin,
                    "permission": permission,
                    "setting": setting,
                }),
                format,
            )
        }
        EmulateCommand::Reset => {
            page.clear_device_emulation().await?;
            page.clear_geolocation().await?;
            output::print(&serde_json::json!({ "reset": true }), format)
        }
    }
}

fn parse_viewport(input: &str) -> Result<(u32, u32), AppError> {
    let parts: Vec<&str> = input.split('x').collect();
    if let [w, h] = parts.as_slice() {
        if let (Ok(w), Ok(h)) = (w.parse::<u32>(), h.parse::<u32>()) {
            if w > 0 && h > 0 {
                return Ok((w, h));
            }
        }
    }
    Err(AppError::general(format!(
        "invalid viewport {input:?} (expected WIDTHxHEIGHT, e.g. 1280x720)"
    )))
}

async fn cmd_throttle(
    config: &Config,
    format: OutputFormat,
    args: &cli::ThrottleArgs,
) -> Result<(), AppError> {
    let preset: ThrottlePreset = args.preset.parse()?;
    let (_client, mut page) = connect_page(config).await?;
    page.throttle(preset).await?;
    let (offline, latency, download, upload) = preset.conditions();
    output::print(
        &serde_json::json!({
            "preset": preset.as_str(),
            "offline": offline,
            "latency_ms": latency,
            "download_bps": download,
            "upload_bps": upload,
        }),
        format,
    )
}

// =============================================================================
// Storage
// =============================================================================

async fn cmd_cookies(
    config: &Config,
    format: OutputFormat,
    command: Option<&CookiesCommand>,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    match command {
        None | Some(CookiesCommand::Get) => {
            let cookies = page.get_cookies().await?;
            output::print(&cookies, format)
        }
        Some(CookiesCommand::Set {
            cookie,
            domain,
            path,
            secure,
            http_only,
        }) => {
            let mut cookie = parse_cookie_arg(cookie)?;
            cookie.domain.clone_from(domain);
            cookie.path.clone_from(path);
            cookie.secure = *secure;
            cookie.http_only = *http_only;
            page.set_cookie(&cookie).await?;
            output::print(
                &serde_json::json!({ "name": cookie.name, "set": true }),
                format,
            )
        }
        Some(CookiesCommand::Clear) => {
            page.clear_cookies().await?;
            output::print(&serde_json::json!({ "cleared": true }), format)
        }
    }
}

async fn cmd_storage(
    config: &Config,
    format: OutputFormat,
    command: &StorageCommand,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    match command {
        StorageCommand::Get { key } => {
            let value = page.get_local_storage(key).await?;
            output::print(&serde_json::json!({ "key": key, "value": value }), format)
        }
        StorageCommand::Set { key, value } => {
            page.set_local_storage(key, value).await?;
            output::print(&serde_json::json!({ "key": key, "set": true }), format)
        }
        StorageCommand::Remove { key } => {
            page.remove_local_storage(key).await?;
            output::print(&serde_json::json!({ "key": key, "removed": true }), format)
        }
        StorageCommand::Clear => {
            page.clear_local_storage().await?;
            output::print(&serde_json::json!({ "cleared": true }), format)
        }
        StorageCommand::Keys => {
            let keys = page.local_storage_keys().await?;
            output::print(&keys, format)
        }
    }
}

// =============================================================================
// Streaming captures
// =============================================================================

enum StreamKind {
    Console,
    Exceptions,
    Network,
}

async fn cmd_stream(
    config: &Config,
    format: OutputFormat,
    kind: StreamKind,
    args: &cli::StreamArgs,
) -> Result<(), AppError> {
    let duration = match args.duration.as_deref() {
        Some(raw) => Some(parse_go_duration(raw).ok_or_else(|| {
            AppError::general(format!("invalid --duration {raw:?} (expected e.g. 10s)"))
        })?),
        None => None,
    };

    let (_client, mut page) = connect_page(config).await?;
    let mut stream = match kind {
        StreamKind::Console => page.capture_console().await?,
        StreamKind::Exceptions => page.capture_exceptions().await?,
        StreamKind::Network => page.capture_network().await?,
    };

    let summary = pump_stream(&mut stream, duration, format).await?;
    output::print(
        &serde_json::json!({ "kind": "summary", "dropped": summary.dropped }),
        format,
    )
}

/// Print records as they arrive until the duration elapses or Ctrl-C.
/// Stop is invoked on every exit path.
async fn pump_stream(
    stream: &mut CaptureStream,
    duration: Option<Duration>,
    format: OutputFormat,
) -> Result<hubcap::capture::CaptureSummary, AppError> {
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let stop_at = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_at);

    loop {
        tokio::select! {
            record = stream.next() => {
                match record {
                    Some(record) => output::print(&record, format)?,
                    None => break,
                }
            }
            () = &mut stop_at => break,
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| AppError::general(format!("signal handler: {e}")))?;
                break;
            }
        }
    }

    Ok(stream.stop().await)
}

// =============================================================================
// Network shaping
// =============================================================================

async fn cmd_block(
    config: &Config,
    format: OutputFormat,
    args: &cli::BlockArgs,
) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    if args.clear {
        page.unblock_urls().await?;
        return output::print(&serde_json::json!({ "blocked": [] }), format);
    }
    // The parser requires patterns unless --clear was given; an empty list
    // here would silently wipe the block list, so refuse it outright.
    if args.patterns.is_empty() {
        return Err(AppError::general(
            "block needs at least one pattern, or --clear to unblock".to_owned(),
        ));
    }
    page.block_urls(&args.patterns).await?;
    output::print(&serde_json::json!({ "blocked": args.patterns }), format)
}

async fn cmd_intercept(
    config: &Config,
    format: OutputFormat,
    args: &cli::InterceptArgs,
) -> Result<(), AppError> {
    let replacements = args
        .replacements
        .iter()
        .map(|r| parse_replacement(r).map_err(AppError::from))
        .collect::<Result<Vec<_>, _>>()?;

    let duration = match args.duration.as_deref() {
        Some(raw) => Some(parse_go_duration(raw).ok_or_else(|| {
            AppError::general(format!("invalid --duration {raw:?} (expected e.g. 10s)"))
        })?),
        None => None,
    };

    let (_client, mut page) = connect_page(config).await?;
    let mut handle = page
        .enable_intercept(InterceptRule {
            pattern: args.pattern.clone(),
            on_response: args.on_response || !replacements.is_empty(),
            replacements,
        })
        .await?;

    output::print(
        &serde_json::json!({ "intercepting": args.pattern }),
        format,
    )?;

    // Hold the interception open until the duration elapses or Ctrl-C.
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| AppError::general(format!("signal handler: {e}")))?;
        }
    }

    handle.stop().await?;
    output::print(&serde_json::json!({ "stopped": true }), format)
}

// =============================================================================
// Metrics and profiles
// =============================================================================

async fn cmd_metrics(config: &Config, format: OutputFormat) -> Result<(), AppError> {
    let (_client, mut page) = connect_page(config).await?;
    let metrics = page.metrics().await?;
    output::print(&metrics, format)
}

#[derive(Serialize)]
struct ResolvedConfigOutput {
    host: String,
    port: u16,
    timeout_secs: u64,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    headless: bool,
    ephemeral: bool,
    config_dir: String,
}

fn cmd_profiles(
    config: &Config,
    format: OutputFormat,
    command: Option<&ProfilesCommand>,
) -> Result<(), AppError> {
    match command {
        None | Some(ProfilesCommand::List) => {
            let profiles = config::load_profiles(&config.config_dir);
            let mut names: Vec<&String> = profiles.profiles.keys().collect();
            names.sort();
            output::print(
                &serde_json::json!({ "default": profiles.default, "profiles": names }),
                format,
            )
        }
        Some(ProfilesCommand::Show) => output::print(
            &ResolvedConfigOutput {
                host: config.host.clone(),
                port: config.port,
                timeout_secs: config.timeout.as_secs(),
                output: config.output.clone(),
                target: config.target.clone(),
                profile: config.profile.clone(),
                headless: config.headless,
                ephemeral: config.ephemeral,
                config_dir: config.config_dir.display().to_string(),
            },
            format,
        ),
    }
}
