//! usm CLI
//!
//! Desktop host for the userscript manager core: keeps scripts in a JSON
//! store, installs them from files or URLs, checks for updates and
//! bundles the page payload for a URL.

mod fetch;
mod host;
mod storage;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use usm_core::messages::{Background, Request, Response, Sender};
use usm_core::resolver::{evaluate, Verdict};
use usm_core::types::{EngineConfig, InjectionMode, NavigationEvent, ScriptRecord};
use usm_core::parse_metadata;

use fetch::HttpFetcher;
use host::{CliBrowser, CLI_TAB_ID};
use storage::FileStorage;

type Host = Background<FileStorage, HttpFetcher, CliBrowser>;

#[derive(Parser)]
#[command(name = "usm")]
#[command(about = "Userscript manager: store, match, bundle and update userscripts")]
struct Cli {
    /// Script store file
    #[arg(long, global = true, default_value = "usm-store.json")]
    store: PathBuf,

    /// When scripts are injected on navigation
    #[arg(long, global = true, value_enum, default_value_t = Mode::OnDemand)]
    mode: Mode,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    OnDemand,
    Automatic,
}

impl From<Mode> for InjectionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::OnDemand => InjectionMode::OnDemand,
            Mode::Automatic => InjectionMode::Automatic,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed scripts
    List,

    /// Print one script as JSON
    Show {
        /// Script id
        #[arg(long)]
        id: String,
    },

    /// Install a script from a file or an http(s) URL
    Install {
        /// Path or URL of the .user.js file
        source: String,
    },

    /// Delete a script
    Delete {
        /// Script id
        #[arg(long)]
        id: String,
    },

    /// Enable or disable a script
    Toggle {
        /// Script id
        #[arg(long)]
        id: String,
    },

    /// Show which scripts would run on a URL, and why
    Resolve {
        /// Page URL
        #[arg(long)]
        url: String,
    },

    /// Activate scripts for a URL and write the injected payload
    Bundle {
        /// Page URL
        #[arg(long)]
        url: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Simulate a top-level navigation to a URL
    Navigate {
        /// Page URL
        #[arg(long)]
        url: String,
    },

    /// Check update sources for newer versions
    CheckUpdates {
        /// Check even when auto-update is off
        #[arg(long)]
        force: bool,

        /// Only report available updates
        #[arg(long)]
        dry_run: bool,
    },

    /// Turn automatic updates on or off
    AutoUpdate {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Print the metadata block of a userscript file as JSON
    Meta {
        /// Userscript file
        #[arg(short, long)]
        input: String,
    },

    /// Send a raw protocol request and print the response
    Dispatch {
        /// Request JSON, e.g. '{"action":"getScripts"}'
        #[arg(short, long)]
        request: String,

        /// URL of the active tab
        #[arg(long)]
        url: Option<String>,

        /// Sender tab id
        #[arg(long)]
        tab: Option<i64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_async(cli))
}

async fn run_async(cli: Cli) -> Result<(), String> {
    let config = EngineConfig {
        injection_mode: cli.mode.into(),
        notifications: true,
        ..Default::default()
    };

    let page_url = match &cli.command {
        Commands::Bundle { url, .. } | Commands::Navigate { url } => Some(url.clone()),
        Commands::Dispatch { url, .. } => url.clone(),
        _ => None,
    };

    let browser = Arc::new(CliBrowser::new(page_url));
    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let storage = Arc::new(FileStorage::new(&cli.store));
    log::info!("Using store {}", storage.path().display());

    let host = Background::new(storage, fetcher, Arc::clone(&browser), config);

    match cli.command {
        Commands::List => cmd_list(&host).await,
        Commands::Show { id } => cmd_show(&host, id).await,
        Commands::Install { source } => cmd_install(&host, &source).await,
        Commands::Delete { id } => cmd_delete(&host, id).await,
        Commands::Toggle { id } => cmd_toggle(&host, id).await,
        Commands::Resolve { url } => cmd_resolve(&host, &url).await,
        Commands::Bundle { output, .. } => cmd_bundle(&host, &browser, output.as_deref()).await,
        Commands::Navigate { url } => cmd_navigate(&host, &browser, url).await,
        Commands::CheckUpdates { force, dry_run } => cmd_check_updates(&host, force, dry_run).await,
        Commands::AutoUpdate { state } => cmd_auto_update(&host, state).await,
        Commands::Meta { input } => cmd_meta(&input),
        Commands::Dispatch { request, tab, .. } => cmd_dispatch(&host, &request, tab).await,
    }
}

/// Unwrap a response envelope into its payload.
fn into_data(response: Response) -> Result<Value, String> {
    if response.success {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(response.error.unwrap_or_else(|| "Request failed".to_string()))
    }
}

async fn request(host: &Host, request: Request) -> Result<Value, String> {
    into_data(host.handle(request, Sender::default()).await)
}

fn to_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize: {}", e))
}

fn summary_line(script: &ScriptRecord) -> String {
    format!(
        "{:<24} {:<4} {} {}",
        script.id,
        if script.enabled { "on" } else { "off" },
        script.name,
        script.version.as_deref().map(|v| format!("v{}", v)).unwrap_or_default()
    )
}

async fn cmd_list(host: &Host) -> Result<(), String> {
    let scripts: Vec<ScriptRecord> = serde_json::from_value(request(host, Request::GetScripts).await?)
        .map_err(|e| format!("Unexpected response: {}", e))?;

    if scripts.is_empty() {
        println!("No scripts installed");
        return Ok(());
    }

    for script in &scripts {
        println!("{}", summary_line(script));
    }
    println!("{} script(s)", scripts.len());
    Ok(())
}

async fn cmd_show(host: &Host, id: String) -> Result<(), String> {
    let script = request(host, Request::GetScript { id: id.clone() }).await?;
    if script.is_null() {
        return Err(format!("Script not found: {}", id));
    }
    println!("{}", to_pretty(&script)?);
    Ok(())
}

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

async fn cmd_install(host: &Host, source: &str) -> Result<(), String> {
    let installed = if is_remote(source) {
        request(host, Request::InstallFromUrl { url: source.to_string() }).await?
    } else {
        let code = fs::read_to_string(source)
            .map_err(|e| format!("Failed to read '{}': {}", source, e))?;
        request(host, Request::InstallScript { code }).await?
    };

    let script: ScriptRecord = serde_json::from_value(installed)
        .map_err(|e| format!("Unexpected response: {}", e))?;
    println!("Installed '{}' as {}", script.name, script.id);
    if let Some(source) = script.update_source() {
        println!("  Updates from: {}", source);
    }
    Ok(())
}

async fn cmd_delete(host: &Host, id: String) -> Result<(), String> {
    request(host, Request::DeleteScript { id: id.clone() }).await?;
    println!("Deleted {}", id);
    Ok(())
}

async fn cmd_toggle(host: &Host, id: String) -> Result<(), String> {
    request(host, Request::ToggleScript { id: id.clone() }).await?;
    match host.store().get(&id).await {
        Some(script) => println!("{} is now {}", script.name, if script.enabled { "enabled" } else { "disabled" }),
        None => return Err(format!("Script not found: {}", id)),
    }
    Ok(())
}

fn describe(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Matched => "runs",
        Verdict::Disabled => "disabled",
        Verdict::Excluded => "excluded",
        Verdict::NoPatterns => "no @match/@include",
        Verdict::NoMatch => "no match",
    }
}

async fn cmd_resolve(host: &Host, url: &str) -> Result<(), String> {
    let scripts = host.store().list().await;
    let mut matched = 0usize;

    for script in &scripts {
        let verdict = evaluate(url, script);
        if verdict.is_match() {
            matched += 1;
        }
        println!("  {:<20} {}", describe(verdict), script.name);
    }

    println!("{} of {} script(s) run on {}", matched, scripts.len(), url);
    Ok(())
}

async fn cmd_bundle(host: &Host, browser: &CliBrowser, output: Option<&str>) -> Result<(), String> {
    let report = request(host, Request::ActivateScripts).await?;

    if browser.payload_count() == 0 {
        println!("No scripts match {}", report["url"].as_str().unwrap_or_default());
        return Ok(());
    }

    let bundle = browser.bundle();
    match output {
        Some(path) => {
            fs::write(path, &bundle).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
            println!("Wrote {} bytes to '{}'", bundle.len(), path);
        }
        None => println!("{}", bundle),
    }

    eprintln!("{}", to_pretty(&report)?);
    Ok(())
}

async fn cmd_navigate(host: &Host, browser: &CliBrowser, url: String) -> Result<(), String> {
    let event = NavigationEvent {
        tab_id: CLI_TAB_ID,
        frame_id: 0,
        url,
    };

    if host
        .on_before_navigate(&event)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Ok(());
    }

    match host.on_committed(&event).await {
        Some(report) => {
            println!("{}", to_pretty(&report)?);
            println!("{} payload(s) injected", browser.payload_count());
        }
        None => println!("No automatic injection ({} mode)", mode_name(host)),
    }
    Ok(())
}

fn mode_name(host: &Host) -> &'static str {
    match host.engine().config().injection_mode {
        InjectionMode::OnDemand => "on-demand",
        InjectionMode::Automatic => "automatic",
    }
}

async fn cmd_check_updates(host: &Host, force: bool, dry_run: bool) -> Result<(), String> {
    if dry_run {
        let updates = request(host, Request::CheckUpdates).await?;
        let updates = updates.as_array().cloned().unwrap_or_default();
        for update in &updates {
            println!(
                "  {} {} -> {}",
                update["name"].as_str().unwrap_or_default(),
                update["oldVersion"].as_str().unwrap_or_default(),
                update["newVersion"].as_str().unwrap_or_default()
            );
        }
        println!("{} update(s) available", updates.len());
        return Ok(());
    }

    let count = if force {
        let data = request(host, Request::CheckUpdatesNow).await?;
        data["count"].as_u64().unwrap_or(0) as usize
    } else {
        host.check_updates(false).await.map_err(|e| e.to_string())?
    };
    println!("Updated {} script(s)", count);
    Ok(())
}

async fn cmd_auto_update(host: &Host, state: Switch) -> Result<(), String> {
    let enabled = state == Switch::On;
    request(host, Request::SetAutoUpdate { enabled }).await?;
    println!("Automatic updates {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn cmd_meta(input: &str) -> Result<(), String> {
    let code = fs::read_to_string(input)
        .map_err(|e| format!("Failed to read '{}': {}", input, e))?;

    let metadata = parse_metadata(&code);
    if metadata.is_empty() {
        return Err(format!("No metadata block in '{}'", input));
    }
    println!("{}", to_pretty(&metadata)?);
    Ok(())
}

async fn cmd_dispatch(host: &Host, raw: &str, tab: Option<i64>) -> Result<(), String> {
    let response = host.handle_json(raw, Sender { tab_id: tab }).await;
    println!("{}", to_pretty(&response)?);
    if response.success {
        Ok(())
    } else {
        Err(response.error.unwrap_or_else(|| "Request failed".to_string()))
    }
}
