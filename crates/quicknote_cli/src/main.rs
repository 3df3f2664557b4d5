//! `quicknote` command-line entry point.
//!
//! # Responsibility
//! - Run the HTTP server (`serve`).
//! - Offer direct store maintenance commands (`list`, `add`, `show`,
//!   `delete`, `reconcile`) against the same database.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use quicknote_core::db::open_db;
use quicknote_core::{
    default_log_level, init_logging, init_stderr_logging, KvNoteRepository, NoteDraft,
    NoteService, SqliteKvStore,
};
use quicknote_web::config::{ENV_DB_PATH, ENV_HOST, ENV_PORT, ENV_STATIC_DIR};
use quicknote_web::{start_server, ServerConfig};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "quicknote", version, about = "Personal notes over a key-value store")]
struct Cli {
    /// SQLite database backing the key-value store.
    #[arg(long, global = true, env = ENV_DB_PATH)]
    db: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "QUICKNOTE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; stderr when omitted.
    #[arg(long, global = true, env = "QUICKNOTE_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the notes API (and optional static front end).
    Serve {
        #[arg(long, env = ENV_HOST)]
        host: Option<String>,
        #[arg(long, env = ENV_PORT)]
        port: Option<u16>,
        #[arg(long, env = ENV_STATIC_DIR)]
        static_dir: Option<PathBuf>,
    },
    /// Print one page of notes.
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Create a note.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Print one note.
    Show { id: String },
    /// Delete a note (succeeds if it does not exist).
    Delete { id: String },
    /// Repair the note index against stored records.
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_logging(cli.log_level.as_deref(), cli.log_dir.as_deref())?;

    let config = ServerConfig::from_env().with_overrides(None, None, cli.db, None);

    match cli.command {
        Command::Serve {
            host,
            port,
            static_dir,
        } => {
            let config = config.with_overrides(host, port, None, static_dir);
            start_server(&config).await.context("server stopped")?;
        }
        Command::List { page, page_size } => {
            let listed = with_service(&config.db_path, |service| {
                Ok(service.list_notes(page, page_size)?)
            })?;
            for note in &listed.notes {
                println!("{}\t{}\t{}", note.id, note.date, note.title);
            }
            println!(
                "page {}/{} ({} per page)",
                listed.current_page, listed.total_pages, listed.applied_page_size
            );
        }
        Command::Add { title, content } => {
            let saved = with_service(&config.db_path, |service| {
                Ok(service.save_note(NoteDraft::new(title, content))?)
            })?;
            println!("{}", saved.id);
        }
        Command::Show { id } => {
            let note = with_service(&config.db_path, |service| Ok(service.get_note(&id)?))?;
            println!("{}\n{}\n\n{}", note.title, note.date, note.content);
        }
        Command::Delete { id } => {
            with_service(&config.db_path, |service| Ok(service.delete_note(&id)?))?;
            println!("deleted {id}");
        }
        Command::Reconcile => {
            let report = with_service(&config.db_path, |service| Ok(service.reconcile()?))?;
            println!(
                "kept={} dropped={} adopted={}",
                report.kept,
                report.dropped.len(),
                report.adopted.len()
            );
            for id in &report.dropped {
                println!("dropped {id}");
            }
            for id in &report.adopted {
                println!("adopted {id}");
            }
        }
    }

    Ok(())
}

fn init_cli_logging(level: Option<&str>, log_dir: Option<&str>) -> Result<()> {
    let level = level.unwrap_or_else(|| default_log_level());
    match log_dir {
        Some(dir) => init_logging(level, dir),
        None => init_stderr_logging(level),
    }
    .map_err(|err| anyhow!(err))
    .context("failed to initialize logging")
}

fn with_service<T>(
    db_path: &Path,
    f: impl FnOnce(&NoteService<KvNoteRepository<SqliteKvStore<'_>>>) -> Result<T>,
) -> Result<T> {
    let conn = open_db(db_path)
        .with_context(|| format!("failed to open database `{}`", db_path.display()))?;
    let store = SqliteKvStore::try_new(&conn).context("failed to open key-value store")?;
    f(&NoteService::new(KvNoteRepository::new(store)))
}
