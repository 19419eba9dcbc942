mod app;
mod auth;
mod config;
mod domain;
mod error;
mod logging;
mod remote;
mod store;
mod ui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use app::App;
use auth::local::LocalEmailProvider;
use config::{Backend, Config};
use remote::RemoteCollection;
use remote::memory::InMemoryCollection;
use remote::sqlite::SqliteCollection;
use store::ErrorPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about = "sync-todo — per-user todo list synced in real time", long_about = None)]
struct Args {
    /// Path to config file (default: OS config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tick interval of render loop in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Collection backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Use in-memory collections seeded with demo tasks
    #[arg(long, default_value_t = false)]
    demo: bool,

    /// Path to SQLite DB file shared by every client on this machine
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Show listener errors in the header instead of dropping them
    #[arg(long, default_value_t = false)]
    surface_sync_errors: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ms) = self.tick_ms {
            config.tick_ms = ms;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.demo {
            config.backend = Backend::Memory;
        }
        if let Some(path) = &self.db_path {
            config.db_path = Some(path.clone());
        }
        if self.surface_sync_errors {
            config.surface_sync_errors = true;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);

    logging::init(&config.log_path(), &config.log_level);
    info!(backend = ?config.backend, "starting");

    let remote: Box<dyn RemoteCollection> = match config.backend {
        Backend::Memory if args.demo => Box::new(InMemoryCollection::with_seed(seed_todos())),
        Backend::Memory => Box::new(InMemoryCollection::default()),
        Backend::Sqlite => Box::new(SqliteCollection::open(config.sqlite_path())?),
    };

    let policy = if config.surface_sync_errors {
        ErrorPolicy::Surface
    } else {
        ErrorPolicy::Silent
    };
    let identity = Box::new(LocalEmailProvider::new(&config.data_dir));
    let app = App::new(remote, identity, policy).context("failed to restore session")?;

    ui::run(app, Duration::from_millis(config.tick_ms))
}

fn seed_todos() -> Vec<&'static str> {
    vec![
        "Write documentation",
        "Check PRs waiting for review",
        "Draft release notes",
    ]
}
