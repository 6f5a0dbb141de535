//! Vellum CLI - Command-line front-end for the note store.
//!
//! Reads connection settings from a TOML file and/or flags, then runs one
//! store operation: put, get, delete, list, or watch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vellum_core::time::now_ms;
use vellum_core::{FilePath, NoteKind};
use vellum_store::{EntryInfo, LiveStore, Settings};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about = "Content-addressed note store client", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Remote server URL, e.g. http://127.0.0.1:5984
    #[arg(long)]
    url: Option<String>,

    /// Database name
    #[arg(long)]
    database: Option<String>,

    /// HTTP Basic username
    #[arg(long)]
    username: Option<String>,

    /// HTTP Basic password
    #[arg(long)]
    password: Option<String>,

    /// End-to-end encryption passphrase
    #[arg(long)]
    passphrase: Option<String>,

    /// Path obfuscation passphrase
    #[arg(long)]
    obfuscate_passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file under a note path
    Put {
        /// Note path, e.g. notes/daily.md
        path: String,
        /// Local file to read
        file: PathBuf,
    },

    /// Print a note's content
    Get {
        /// Note path
        path: String,
        /// Fetch metadata only
        #[arg(long)]
        meta_only: bool,
    },

    /// Mark a note deleted
    Delete {
        /// Note path
        path: String,
    },

    /// List every note in the database
    List,

    /// Follow the change feed and print incoming notes
    Watch {
        /// Resume cursor; defaults to the beginning
        #[arg(long)]
        since: Option<String>,
    },

    /// Probe the remote database
    Info,
}

/// Subset of [`Settings`] readable from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    url: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    passphrase: Option<String>,
    obfuscate_passphrase: Option<String>,
    use_dynamic_iteration_count: Option<bool>,
    custom_chunk_size: Option<u32>,
    minimum_chunk_size: Option<usize>,
    use_v1: Option<bool>,
}

fn build_settings(cli: &Cli) -> Result<Settings> {
    let file: FileConfig = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    let mut settings = Settings {
        url: cli.url.clone().or(file.url).unwrap_or_default(),
        database: cli.database.clone().or(file.database).unwrap_or_default(),
        username: cli.username.clone().or(file.username).unwrap_or_default(),
        password: cli.password.clone().or(file.password).unwrap_or_default(),
        passphrase: cli.passphrase.clone().or(file.passphrase),
        obfuscate_passphrase: cli
            .obfuscate_passphrase
            .clone()
            .or(file.obfuscate_passphrase),
        ..Settings::default()
    };
    if let Some(value) = file.use_dynamic_iteration_count {
        settings.use_dynamic_iteration_count = value;
    }
    if let Some(value) = file.custom_chunk_size {
        settings.custom_chunk_size = value;
    }
    if let Some(value) = file.minimum_chunk_size {
        settings.minimum_chunk_size = value;
    }
    if let Some(value) = file.use_v1 {
        settings.use_v1 = value;
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing subscriber")?;

    let settings = build_settings(&cli)?;
    let store = LiveStore::new(settings).context("initializing store")?;

    match cli.command {
        Commands::Put { path, file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let metadata = std::fs::metadata(&file)
                .with_context(|| format!("inspecting {}", file.display()))?;
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or_else(now_ms);
            let ctime = metadata
                .created()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(mtime);
            let info = EntryInfo {
                ctime,
                mtime,
                size: content.len() as u64,
            };
            store
                .put(&FilePath::new(&path), vec![content], info, NoteKind::NewNote)
                .await?;
            info!(path = %path, "stored");
        }

        Commands::Get { path, meta_only } => {
            match store.get(&FilePath::new(&path), meta_only).await? {
                Some(entry) if entry.deleted => println!("{path}: deleted"),
                Some(entry) if meta_only => {
                    println!(
                        "{path}: {} bytes, {} chunks, mtime {}",
                        entry.size,
                        entry.children.len(),
                        entry.mtime
                    );
                }
                Some(entry) => print!("{}", entry.data),
                None => println!("{path}: not found"),
            }
        }

        Commands::Delete { path } => {
            store.delete(&FilePath::new(&path)).await?;
            info!(path = %path, "deleted");
        }

        Commands::List => {
            let mut walker = store.enumerate_all_normal_docs(true);
            while let Some(entry) = walker.next().await? {
                let marker = if entry.deleted { " (deleted)" } else { "" };
                println!("{}\t{} bytes{}", entry.path, entry.size, marker);
            }
        }

        Commands::Watch { since } => {
            if let Some(since) = since {
                store.set_since(since);
            }
            let handle = store.begin_watch(|entry, seq| {
                println!("[{seq}] {} ({} bytes)", entry.path, entry.size);
            });
            info!("watching for changes, ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            handle.stop().await;
            println!("cursor: {}", store.since());
        }

        Commands::Info => {
            let info = store.database_info().await?;
            println!("{}: {} documents", info.db_name, info.doc_count);
        }
    }

    Ok(())
}
