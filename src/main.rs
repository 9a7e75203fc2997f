//! gemini-launcher: Flow Launcher plugin that asks Gemini and reads the answer aloud.

mod actions;
mod config;
mod conversation;
mod diff;
mod error;
mod gemini;
mod notifier;
mod plugin;
mod prompt;
mod rpc;
mod templates;
mod tts;

use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Settings, SettingsSource};
use crate::error::PluginError;
use crate::plugin::Plugin;
use crate::rpc::{Action, Request, ResultItem};

const LOG_FILE: &str = "plugin.log";

#[derive(Parser, Debug)]
#[command(name = "gemini-launcher", about = "Gemini prompts from Flow Launcher")]
struct Args {
    /// JSON-RPC request sent by the launcher
    request: Option<String>,

    /// Plugin directory (templates, audio, logs). Defaults to the executable's directory.
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Path to a settings YAML, used when the launcher sends no settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let plugin_dir = args.plugin_dir.clone().unwrap_or_else(exe_dir);

    let request = match read_request(args.request.as_deref()) {
        Ok(request) => request,
        Err(e) => {
            init_logging(&plugin_dir, &Settings::default(), args.verbose);
            error!("{e}");
            emit(&error_items(&e))?;
            return Ok(());
        }
    };

    let (settings, source) = match request.host_settings().map(Settings::from_host) {
        Some(Ok(settings)) => (settings, SettingsSource::Host),
        Some(Err(e)) => (Settings::default(), SettingsSource::Rejected(e)),
        None => Settings::load(args.config.as_deref(), &plugin_dir),
    };

    init_logging(&plugin_dir, &settings, args.verbose);
    source.log();
    debug!("Request: {request:?}");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(request, settings, plugin_dir));
    // A synthesis that outlived its timeout must not keep the process alive.
    runtime.shutdown_background();

    result.map_err(Into::into)
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// The request from argv. Without one, behave like an empty query.
fn read_request(raw: Option<&str>) -> Result<Request, PluginError> {
    match raw {
        Some(raw) => Request::parse(raw),
        None => Ok(Request {
            method: "query".into(),
            parameters: Vec::new(),
            settings: None,
        }),
    }
}

/// Log to a file in the plugin directory; stdout belongs to the launcher.
fn init_logging(plugin_dir: &Path, settings: &Settings, verbose: bool) {
    let level = if verbose { "debug" } else { settings.log_filter() };
    let filter = EnvFilter::new(format!("{level},ort=warn,reqwest=warn,hyper=warn"));

    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(plugin_dir.join(LOG_FILE))
    {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

async fn run(request: Request, settings: Settings, plugin_dir: PathBuf) -> Result<(), PluginError> {
    let is_query = request.method == "query";

    let mut plugin = match Plugin::from_settings(settings, plugin_dir) {
        Ok(plugin) => plugin,
        Err(e) => {
            error!("Failed to start plugin: {e}");
            if is_query {
                emit(&error_items(&e))?;
            }
            return Ok(());
        }
    };

    if is_query {
        let items = plugin.query(request.query_text()).await;
        info!("Returning {} items", items.len());
        return emit(&items);
    }

    match Action::from_request(&request) {
        Some(action) => plugin.invoke(&action),
        None => warn!("Ignoring unknown method '{}'", request.method),
    }
    Ok(())
}

fn error_items(e: &PluginError) -> Vec<ResultItem> {
    vec![ResultItem::new("Gemini plugin error", e.to_string())]
}

fn emit(items: &[ResultItem]) -> Result<(), PluginError> {
    println!("{}", rpc::render_response(items)?);
    Ok(())
}
