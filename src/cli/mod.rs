use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::gateway::SqliteGateway;
use crate::session::Session;
use crate::ui_state::UiStateStore;
use crate::workspace::{Notice, Workspace};

pub mod commands;

use self::commands::{DocArgs, FolderArgs, ListArgs, ResetArgs, SearchArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "zendocs",
    version,
    about = "Folder and document workspace with optimistic sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Sign in as this user; without it the workspace is read-only
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Override the config file location (takes precedence over ZENDOCS_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over ZENDOCS_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the folder tree (default)
    Tree,
    /// List the documents of a folder
    List(ListArgs),
    /// Search document titles and tags across every folder
    Search(SearchArgs),
    /// Print a document
    Show(ShowArgs),
    /// Create, rename, move, duplicate, delete or reorder folders
    Folder(FolderArgs),
    /// Create, edit, rename, move, duplicate, delete, lock, hide or attach to documents
    Doc(DocArgs),
    /// Delete everything and restore the default workspace
    Reset(ResetArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);

    let gateway = SqliteGateway::open(&config.gateway)?;
    let session = resolve_session(cli.user.as_deref(), &config);
    let ui_state = UiStateStore::open(&paths.ui_state_file)?;
    let mut workspace = Workspace::open(Arc::new(gateway), session, ui_state, &config.sync)?;

    let command = cli.command.unwrap_or(Commands::Tree);
    let output = execute(&mut workspace, &config, command)?;
    print!("{output}");
    finish(&mut workspace)
}

/// Runs one command against an open workspace and returns what it printed.
pub fn execute(workspace: &mut Workspace, config: &AppConfig, command: Commands) -> Result<String> {
    match command {
        Commands::Tree => Ok(commands::tree(workspace, config)),
        Commands::List(args) => commands::list(workspace, args),
        Commands::Search(args) => commands::search(workspace, config, args),
        Commands::Show(args) => commands::show(workspace, args),
        Commands::Folder(args) => commands::handle_folder_command(workspace, args),
        Commands::Doc(args) => commands::handle_doc_command(workspace, args),
        Commands::Reset(args) => commands::reset(workspace, args),
    }
}

fn resolve_session(flag: Option<&str>, config: &AppConfig) -> Session {
    match flag.or(config.session.default_user.as_deref()) {
        Some(user) => Session::authenticated(user),
        None => Session::anonymous(),
    }
}

/// Waits for queued remote writes and reports what the user should know.
fn finish(workspace: &mut Workspace) -> Result<()> {
    workspace.flush();
    for notice in workspace.take_notices() {
        match notice {
            Notice::Toast(message) => eprintln!("{message}"),
            Notice::SyncFailed(failure) => {
                eprintln!(
                    "warning: {} {} was not saved: {}",
                    failure.kind, failure.subject, failure.message
                );
            }
        }
    }
    let failed = workspace.sync_stats().failed;
    if failed > 0 {
        bail!("{failed} remote write(s) failed; local changes were not persisted");
    }
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionOptions;

    #[test]
    fn cli_parses_nested_commands_with_global_flags() {
        let cli = Cli::try_parse_from([
            "zendocs",
            "folder",
            "move",
            "folder-a",
            "--root",
            "--user",
            "admin",
        ])
        .expect("parse");
        assert_eq!(cli.user.as_deref(), Some("admin"));
        assert!(matches!(cli.command, Some(Commands::Folder(_))));
    }

    #[test]
    fn flag_user_wins_over_configured_default() {
        let config = AppConfig {
            session: SessionOptions {
                default_user: Some("owner".into()),
            },
            ..AppConfig::default()
        };
        assert_eq!(resolve_session(Some("admin"), &config).user(), Some("admin"));
        assert_eq!(resolve_session(None, &config).user(), Some("owner"));
        assert!(!resolve_session(None, &AppConfig::default()).is_authenticated());
    }
}
