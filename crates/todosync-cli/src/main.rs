//! todosync - live terminal view of a remote todo collection.
//!
//! Mirrors the todos and users collections, refreshes both on an interval,
//! and prints every snapshot the edit guard lets through. Commands on stdin
//! create, edit and delete todos; while an edit is open the view holds
//! still and a conflict is reported if the todo changes upstream.

mod commands;
mod render;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use todosync_core::{
    EditGuard, EditSession, EntityCache, HttpTransport, LookupCache, MemoryTransport,
    RefreshScheduler, SyncConfig, Todo, TodoDraft, Transport, User,
};

use commands::{Command, HELP};

/// Fallback log file name when `log_file` names a directory
const DEFAULT_LOG_FILE: &str = "todosync.log";

const USAGE: &str = "usage: todosync [--mock] [--config <path>]";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    mock: bool,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mock" => parsed.mock = true,
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "-h" | "--help" => bail!("{USAGE}"),
                other => bail!("unexpected argument {other:?}\n{USAGE}"),
            }
        }
        Ok(parsed)
    }
}

/// Initialize the tracing subscriber for logging.
///
/// Filtered by `RUST_LOG` (default `warn`); always writes to stderr and also
/// to `log_file` when one is configured. The returned guard flushes the file
/// writer on drop.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = match &args.config {
        Some(path) => SyncConfig::load_from(path)?,
        None => SyncConfig::load()?,
    };

    let _log_guard = init_tracing(config.log_file.as_deref());
    info!(base_url = %config.base_url, mock = args.mock, "todosync starting");

    let transport: Arc<dyn Transport> = if args.mock {
        Arc::new(MemoryTransport::seeded().with_drift(true))
    } else {
        Arc::new(HttpTransport::with_timeout(&config.base_url, config.request_timeout())?)
    };

    run(&config, transport).await?;

    info!("todosync shutting down");
    Ok(())
}

async fn run(config: &SyncConfig, transport: Arc<dyn Transport>) -> Result<()> {
    let users: Arc<LookupCache<User>> = LookupCache::new(&config.user_collection, Arc::clone(&transport));
    let todos: Arc<EntityCache<Todo, User>> =
        EntityCache::new(&config.todo_collection, transport, Arc::clone(&users));

    let user_refresh = RefreshScheduler::new(config.user_refresh_interval()).spawn(Arc::clone(&users));
    let todo_refresh = RefreshScheduler::new(config.todo_refresh_interval()).spawn(Arc::clone(&todos));

    let guard = EditGuard::new(Arc::clone(&todos));
    let mut view = guard.view();
    let mut conflict = guard.conflict();
    let mut status = todos.status();
    let mut session: Option<EditSession<Todo, User>> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("{HELP}");

    loop {
        tokio::select! {
            Some(snapshot) = view.next() => {
                print!("{}", render::render_table(&snapshot));
            }

            Ok(()) = conflict.changed() => {
                if *conflict.borrow_and_update() {
                    if let Some(session) = &session {
                        println!("!! todo {} changed upstream while being edited", session.id());
                    }
                }
            }

            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                if current.is_failed() {
                    eprintln!("todos: {current}");
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = apply(command, &guard, &todos, &mut session).await {
                            eprintln!("error: {e:#}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }

            _ = &mut ctrl_c => break,
        }
    }

    if let Some(session) = session.take() {
        session.end();
    }
    user_refresh.shutdown().await;
    todo_refresh.shutdown().await;
    Ok(())
}

async fn apply(
    command: Command,
    guard: &EditGuard<Todo, User>,
    todos: &EntityCache<Todo, User>,
    session: &mut Option<EditSession<Todo, User>>,
) -> Result<()> {
    match command {
        Command::Edit(id) => {
            let started = guard.begin_edit(&id)?;
            println!("editing todo {} (version {}); view paused", id, started.version());
            *session = Some(started);
        }
        Command::Title(title) => {
            let active = session.take().context("no edit in progress")?;
            let Some(row) = guard.row(active.id()) else {
                warn!(id = *active.id(), "Todo under edit left the view");
                active.end();
                bail!("todo is no longer in the view");
            };
            let edited = row.record.with_title(title);
            let committed = active.commit(edited).await?;
            println!("saved todo {} (version {})", committed.record.id, committed.record.update_date);
        }
        Command::Cancel => {
            let active = session.take().context("no edit in progress")?;
            let outcome = active.end();
            if outcome.upstream_changed {
                println!("edit cancelled; the todo had changed upstream");
            }
        }
        Command::Add { user_id, title } => {
            let created = todos.create(&TodoDraft::new(title, user_id)).await?;
            println!("created todo {}", created.record.id);
        }
        Command::Remove(id) => {
            todos.delete_key(&id).await?;
            println!("deleted todo {id}");
        }
        Command::Refresh => {
            let count = todos.refresh().await?;
            println!("refreshed {count} todos");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}
