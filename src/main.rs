use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use sshfm::config::{AppConfig, ConfigManager};
use sshfm::events::{self, AppEvent, EventReceiver, NavigationTarget};
use sshfm::models::{SessionDescriptor, DEFAULT_SSH_PORT};
use sshfm::remote::path::{parent_remote_path, remote_file_name};
use sshfm::remote::Accessor;
use sshfm::session::{JsonSessionStore, SessionStore};
use sshfm::transport::openssh::{OpenSshOptions, OpenSshTransport};
use sshfm::{
    DirectoryCache, ReconciliationLoop, RemoteBrowser, RemoteFile, SessionRegistry,
    TransferCoordinator,
};

#[derive(Parser)]
#[command(name = "sshfm", about = "Browse and transfer remote files over SSH", version)]
struct Cli {
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, short = 'u', global = true)]
    user: Option<String>,
    #[arg(long, short = 'p', global = true)]
    port: Option<u16>,
    /// Private key file
    #[arg(long, short = 'i', global = true)]
    identity: Option<String>,
    /// Environment variable holding the password, or the key passphrase
    /// when --identity is set
    #[arg(long, global = true)]
    password_env: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List remembered sessions
    Sessions,
    /// Forget the session selected by --host/--user/--port
    Forget,
    /// Close the shared connection for the selected session
    Disconnect,
    /// List a remote directory (default: configured path or remote home)
    Ls { path: Option<String> },
    /// Show owner, size and permissions of a remote entry
    Stat { path: String },
    Mkdir { path: String },
    /// Remove a remote file or directory recursively
    Rm { path: String },
    /// Rename an entry within its directory
    Rename { path: String, new_name: String },
    /// Move an entry into another directory
    Mv { path: String, dest_dir: String },
    Upload {
        dest_dir: String,
        #[arg(required = true)]
        local: Vec<PathBuf>,
    },
    /// Download a remote file into the download directory
    Download { path: String },
    /// Follow a remote directory and print events as JSON lines until Ctrl-C
    Watch { path: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    init_logging(&config_manager.log_dir())?;
    debug!("Loaded config: {:?}", config);

    let store: Arc<dyn SessionStore> =
        Arc::new(JsonSessionStore::new(config_manager.sessions_path()));

    match &cli.command {
        Commands::Sessions => {
            for session in store.load()? {
                println!("{}", session);
            }
            return Ok(());
        }
        Commands::Forget => {
            let descriptor = resolve_descriptor(&cli, store.as_ref())?;
            store.delete(&descriptor.host, &descriptor.username, descriptor.port)?;
            println!("Forgot {}", descriptor);
            return Ok(());
        }
        _ => {}
    }

    let descriptor = resolve_descriptor(&cli, store.as_ref())?;
    let transport = Arc::new(OpenSshTransport::new(OpenSshOptions::from_config(
        &config,
        config_manager.runtime_dir(),
    )));
    let registry = Arc::new(SessionRegistry::new(transport, store));
    registry.connect(descriptor).await?;

    let (tx, rx) = events::channel();
    let browser = Arc::new(RemoteBrowser::new(
        registry.clone(),
        Arc::new(DirectoryCache::new()),
        tx.clone(),
    ));
    let transfers = TransferCoordinator::new(registry.clone(), tx, config.download_dir());

    let result = run(cli.command, &config, browser, &transfers, rx).await;
    if let Err(e) = &result {
        info!("Command failed: {:#}", e);
    }
    result
}

fn init_logging(log_dir: &Path) -> Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }

    let log_file = log_dir.join(format!(
        "sshfm_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&log_file)?;

    fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(EnvFilter::from_default_env().add_directive("sshfm=debug".parse()?))
        .with_ansi(false)
        .with_writer(file)
        .init();
    Ok(())
}

/// Builds the descriptor from flags, filling gaps from a remembered session
/// on the same host.
fn resolve_descriptor(cli: &Cli, store: &dyn SessionStore) -> Result<SessionDescriptor> {
    let Some(host) = cli.host.clone() else {
        bail!("--host is required for this command");
    };

    let remembered = store.load()?.into_iter().find(|s| {
        s.host == host
            && cli.user.as_ref().map_or(true, |u| *u == s.username)
            && cli.port.map_or(true, |p| p == s.port)
    });

    let username = match (&cli.user, &remembered) {
        (Some(user), _) => user.clone(),
        (None, Some(session)) => session.username.clone(),
        (None, None) => std::env::var("USER").context("--user is required")?,
    };
    let port = cli
        .port
        .or(remembered.as_ref().map(|s| s.port))
        .unwrap_or(DEFAULT_SSH_PORT);

    let mut descriptor = SessionDescriptor::new(host, username).with_port(port);
    descriptor.private_key = cli
        .identity
        .clone()
        .or_else(|| remembered.as_ref().and_then(|s| s.private_key.clone()));
    descriptor.requires_fingerprint_auth = remembered.and_then(|s| s.requires_fingerprint_auth);

    if let Some(var) = &cli.password_env {
        let secret =
            std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))?;
        if descriptor.private_key.is_some() {
            descriptor.passphrase = Some(secret);
        } else {
            descriptor.password = Some(secret);
        }
    }
    Ok(descriptor)
}

async fn run(
    command: Commands,
    config: &AppConfig,
    browser: Arc<RemoteBrowser>,
    transfers: &TransferCoordinator,
    mut rx: EventReceiver,
) -> Result<()> {
    match command {
        Commands::Sessions | Commands::Forget => {}
        Commands::Disconnect => {
            browser.executor().registry().disconnect_all().await;
            println!("Disconnected");
        }
        Commands::Ls { path } => {
            for entry in open_start(&browser, config, path).await? {
                print_entry(&entry);
            }
        }
        Commands::Stat { path } => {
            let name = open_parent(&browser, &path).await?;
            let file = browser.inspect(&name).await?;
            print_info(&file);
        }
        Commands::Mkdir { path } => {
            let name = open_parent(&browser, &path).await?;
            let dir = browser.create_directory(&name).await?;
            println!("Created {}", dir.full_path());
        }
        Commands::Rm { path } => {
            let name = open_parent(&browser, &path).await?;
            browser.delete(&name).await?;
            println!("Removed {}", path);
        }
        Commands::Rename { path, new_name } => {
            let name = open_parent(&browser, &path).await?;
            let renamed = browser.rename(&name, &new_name).await?;
            println!("Renamed {} to {}", path, renamed.full_path());
        }
        Commands::Mv { path, dest_dir } => {
            let name = open_parent(&browser, &path).await?;
            browser.move_entry(&name, &dest_dir).await?;
            println!("Moved {} to {}", path, dest_dir);
        }
        Commands::Upload { dest_dir, local } => {
            let progress = tokio::spawn(print_progress(rx));
            let result = transfers.upload(&dest_dir, &local).await;
            progress.abort();
            eprintln!();
            result?;
            println!("Uploaded {} item(s) to {}", local.len(), dest_dir);
        }
        Commands::Download { path } => {
            let progress = tokio::spawn(print_progress(rx));
            let result = transfers
                .download(&parent_remote_path(&path), remote_file_name(&path))
                .await;
            progress.abort();
            eprintln!();
            println!("Saved {}", result?.display());
        }
        Commands::Watch { path } => {
            open_start(&browser, config, path).await?;
            while rx.try_recv().is_ok() {}

            let poller = ReconciliationLoop::new(browser.clone(), config.poll_interval()).spawn();
            let result = print_events(&mut rx).await;
            poller.abort();
            result?;
        }
    }
    Ok(())
}

/// Opens `path`, the configured default, or the remote home.
async fn open_start(
    browser: &RemoteBrowser,
    config: &AppConfig,
    path: Option<String>,
) -> Result<Vec<RemoteFile>> {
    let entries = match path.or_else(|| config.default_remote_path.clone()) {
        Some(path) => browser.open(&path).await?,
        None => browser.open_home().await?,
    };
    Ok(entries)
}

/// Opens the parent of `path` and returns the entry name.
async fn open_parent(browser: &RemoteBrowser, path: &str) -> Result<String> {
    browser.open(&parent_remote_path(path)).await?;
    Ok(remote_file_name(path).to_string())
}

fn print_entry(entry: &RemoteFile) {
    if entry.directory {
        println!("{}/", entry.name);
    } else {
        println!("{}", entry.name);
    }
}

fn print_info(file: &RemoteFile) {
    println!("{}", file.full_path());
    if let Some(permissions) = &file.permissions {
        println!("Permissions: {}", permissions);
        for accessor in [Accessor::User, Accessor::Group, Accessor::Other] {
            println!("  {:?}: {}", accessor, permissions.describe(accessor));
        }
    }
    println!("Owner: {}:{}", file.owner, file.group);
    println!("Size: {}", file.file_size);
    println!("Modified: {}", file.last_modified);
}

async fn print_progress(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        if let AppEvent::ProcessStatus(status) = event {
            eprint!("\r{:?} {:>3}%", status.kind, status.progress);
        }
    }
}

async fn print_events(rx: &mut EventReceiver) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => return Ok(()),
            event = rx.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                println!("{}", serde_json::to_string(&event)?);
                if let AppEvent::Navigate { target: NavigationTarget::SessionList } = event {
                    bail!("Connection lost");
                }
            }
        }
    }
}
