use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::mpsc;

use ratings_sync::common::SyncCommand;
use ratings_sync::config;
use ratings_sync::network::HttpTransport;
use ratings_sync::storage::{self, MemoryStorage, SqliteStorage, Storage};
use ratings_sync::sync::{AuthIdentity, Collaborators, LifecycleSignal, SyncCore, SystemClock};
use ratings_sync::ui::ChatApp;

#[derive(Parser)]
#[command(
    name = "ratings-sync",
    version,
    about = "Terminal client for the Ratings chat and notification feed"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Sign in as this user ID on startup
    #[arg(long, value_name = "USER_ID")]
    user: Option<String>,
    /// Display name for --user
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
    /// Claim admin rights (the server decides)
    #[arg(long)]
    admin: bool,
    /// Keep session state in this SQLite file instead of memory
    #[arg(long, value_name = "FILE")]
    state_db: Option<PathBuf>,
    /// Write logs to this file; the terminal is taken by the chat screen
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> std::io::Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    match log_file {
        Some(path) => {
            storage::ensure_parent_dir(path)?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // Anything but errors would draw over the chat screen.
        None => {
            if std::env::var_os("RUST_LOG").is_none() {
                builder.filter_level(log::LevelFilter::Error);
            }
        }
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut sync_config = config::load_config(&cli.config);
    sync_config.apply_env();
    log::info!("Using server {}", sync_config.server_url);

    let transport = HttpTransport::new(&sync_config.server_url, sync_config.api_token.clone())?;
    let storage: Arc<dyn Storage> = match &cli.state_db {
        Some(path) => {
            storage::ensure_parent_dir(path)?;
            Arc::new(SqliteStorage::with_path(path)?)
        }
        None => Arc::new(MemoryStorage::new()),
    };

    // UI -> core
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // core -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let core = SyncCore::new(
        sync_config,
        Collaborators {
            transport: Arc::new(transport),
            storage,
            clock: Arc::new(SystemClock),
        },
        event_tx,
    );
    let core_task = tokio::spawn(core.run(cmd_rx));

    if let Some(user_id) = cli.user {
        let user_name = cli.name.unwrap_or_else(|| user_id.clone());
        let identity = AuthIdentity::new(user_id, user_name).with_admin_hint(cli.admin);
        cmd_tx
            .send(SyncCommand::Lifecycle(LifecycleSignal::AuthChanged(Some(identity))))
            .await?;
    }

    ChatApp::new(cmd_tx, event_rx).run().await?;

    if let Err(err) = core_task.await {
        log::error!("Sync core terminated unexpectedly: {err}");
    }
    Ok(())
}
