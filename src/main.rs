// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use assetd::config::{self, Config};
use assetd::download::{DownloadRequest, DownloadTask, Orchestrator, TaskEvent};
use assetd::error::ErrorBuilder;
use assetd::server::{validate_request, Server};
use assetd::utils::mask_sensitive;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Data error - invalid input data format
    pub const DATA_ERR: i32 = 65;
    /// Temporary failure - the download was cancelled
    pub const TEMP_FAIL: i32 = 75;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// assetd - Asset download daemon for the add-on.
#[derive(Parser)]
#[command(name = "assetd")]
#[command(version = VERSION)]
#[command(about = "Downloads and places asset files for the add-on.")]
#[command(long_about = "assetd - Asset download daemon\n\n\
    Start the daemon:    assetd\n\
    One-shot download:   assetd fetch request.json\n\
    Configure:           assetd config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Port of the intake server
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Content service base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// System id sent with every request
    #[arg(long, global = true)]
    system_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the intake server (default)
    Serve,

    /// Download a single asset in the foreground
    ///
    /// Example:
    ///   assetd fetch request.json
    Fetch {
        /// JSON file holding a download request
        request: PathBuf,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Set the intake server port
    SetPort { port: u16 },
    /// Set the content service base URL
    SetServer { url: String },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "assetd=debug" } else { "assetd=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Apply command line overrides on top of the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(server) = &cli.server {
        config.server = server.clone();
    }
    if let Some(system_id) = &cli.system_id {
        config.system_id = system_id.clone();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{}",
                ErrorBuilder::new(format!("Failed to load configuration: {:#}", e))
                    .cause("The config file is not valid JSON")
                    .fix("Fix or delete ~/.assetd/config.json")
            );
            std::process::exit(CONFIG);
        }
    };
    apply_overrides(&mut config, &cli);

    let code = match run(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", ErrorBuilder::new(format!("{:#}", e)));
            ERROR
        }
    };
    std::process::exit(code);
}

fn run(command: Option<Commands>, config: Config) -> Result<i32> {
    match command {
        Some(Commands::Config { command }) => handle_config(command, config),
        Some(Commands::Fetch { request }) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            runtime.block_on(fetch(&config, &request))
        }
        None | Some(Commands::Serve) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            runtime.block_on(serve(config))
        }
    }
}

async fn serve(config: Config) -> Result<i32> {
    let server = Server::from_config(&config)?;
    println!(
        "{} assetd {} listening on {}:{}",
        "[✓]".green(),
        VERSION,
        config.bind_address,
        server.port()
    );

    if let Err(e) = server.start().await {
        eprintln!(
            "{}",
            ErrorBuilder::new(format!("Failed to run server: {:#}", e))
                .cause("Another assetd instance is already running")
                .fix(format!("Use a different port: assetd serve --port {}", config.port.saturating_add(1)))
        );
        return Ok(ERROR);
    }
    Ok(SUCCESS)
}

/// Run one request in the foreground with a progress bar. Ctrl-C cancels.
async fn fetch(config: &Config, request_path: &Path) -> Result<i32> {
    let content = fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read {}", request_path.display()))?;
    let request: DownloadRequest = match serde_json::from_str(&content) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{} Invalid request file: {}", "[✗]".red(), e);
            return Ok(DATA_ERR);
        }
    };
    if let Err(e) = validate_request(&request) {
        eprintln!("{} {}", "[✗]".red(), e.message());
        return Ok(DATA_ERR);
    }
    tracing::debug!("Fetching with API key {}", mask_sensitive(&request.api_key, 4));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(Arc::new(config.transport()?), Arc::new(event_tx));
    let mut task = DownloadTask::new(request.app_id);
    let cancel = task.cancel.clone();

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );

    let worker = tokio::spawn(async move {
        orchestrator.run(&request, &mut task).await;
    });

    let mut outcome = None;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(TaskEvent::Progress { percent, message, .. }) => {
                    bar.set_position(u64::from(percent));
                    bar.set_message(message);
                }
                Some(TaskEvent::Success { result, .. }) => outcome = Some(Ok(result.file_paths)),
                Some(TaskEvent::Failure { error, cancelled, .. }) => outcome = Some(Err((error, cancelled))),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                bar.set_message("Cancelling...");
                cancel.cancel();
            }
        }
    }
    worker.await.context("Download task panicked")?;
    bar.finish_and_clear();

    match outcome {
        Some(Ok(paths)) => {
            println!("{} Asset ready:", "[✓]".green());
            for path in paths {
                println!("  {}", path.display());
            }
            Ok(SUCCESS)
        }
        Some(Err((_, true))) => {
            eprintln!("{} Download cancelled", "[!]".yellow());
            Ok(TEMP_FAIL)
        }
        Some(Err((error, false))) => {
            eprintln!(
                "{}",
                ErrorBuilder::new(format!("Download failed: {}", error))
                    .cause("The API key cannot download this resolution")
                    .cause("The content service is unreachable")
                    .fix(format!("Check the service URL: {}", config.server))
            );
            Ok(ERROR)
        }
        None => anyhow::bail!("Download ended without a result"),
    }
}

fn handle_config(command: Option<ConfigCommands>, mut config: Config) -> Result<i32> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", "=== assetd Configuration ===".bright_cyan().bold());
            println!();
            println!("  Listen:           {}:{}", config.bind_address, config.port);
            println!("  Server:           {}", config.server);
            let system_id = if config.system_id.is_empty() {
                "(not set)".dimmed().to_string()
            } else {
                config.system_id.clone()
            };
            println!("  System id:        {}", system_id);
            println!("  Add-on version:   {}", config.addon_version);
            println!("  Platform version: {}", config.platform_version);
            println!(
                "  Timeouts:         connect {}s, metadata {}s",
                config.connect_timeout_secs, config.metadata_timeout_secs
            );
            println!();
            println!("Config file: {}", config::config_path()?.display());
            println!();
        }
        Some(ConfigCommands::SetPort { port }) => {
            config.port = port;
            config::save_config(&config)?;
            println!("{} Port set to: {}", "[✓]".green(), port);
        }
        Some(ConfigCommands::SetServer { url }) => {
            config.server = url.clone();
            config::save_config(&config)?;
            println!("{} Server set to: {}", "[✓]".green(), url);
        }
    }
    Ok(SUCCESS)
}
