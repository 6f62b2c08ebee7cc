//! # Note Sync CLI (`nsync`)
//!
//! Runs the block store server and drives the auto-save pipeline from the
//! command line. A file stands in for the editor: `watch` polls it and
//! saves every settled change the way a live editor session would.
//!
//! ## Usage
//!
//! ```bash
//! nsync --config ./config/nsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nsync init` | Create the SQLite database and run schema migrations |
//! | `nsync serve` | Start the block store HTTP server |
//! | `nsync note create <title>` | Create a note |
//! | `nsync note show <key>` | Print a note's metadata |
//! | `nsync note rename <id> <title>` | Rename a note |
//! | `nsync open <key>` | Print the content bootstrap would load |
//! | `nsync save <key> [--file]` | Save a file (or stdin) once |
//! | `nsync watch <key> --file` | Auto-save a file until Ctrl-C |
//!
//! `<key>` is a numeric note id or a note slug.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use note_sync::bootstrap::{BootstrapOutcome, EditorSurface, Readiness};
use note_sync::config::{self, Config, Transport};
use note_sync::coordinator::{SaveOutcome, SaveStatus};
use note_sync::gateway::{HttpGateway, PersistenceGateway, StoreGateway};
use note_sync::pointer_file::FilePointerStore;
use note_sync::session::SyncClient;
use note_sync::sqlite_store::SqliteBlockStore;
use note_sync::{db, logging, migrate, server};
use note_sync_core::models::{NewNote, Note, NoteId, NoteKey};

/// Note Sync CLI: debounced auto-save of notes into a block store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nsync",
    about = "Note Sync: debounced auto-save of notes into a block store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nsync.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the block store HTTP server on `[server].bind`.
    Serve,

    /// Manage notes.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Print the content an editor opening this note would be seeded with.
    Open {
        /// Note id or slug.
        key: String,
    },

    /// Save content to a note once.
    ///
    /// Reads from `--file`, or stdin when omitted. Consecutive saves update
    /// the same fragment in place.
    Save {
        /// Note id or slug.
        key: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Auto-save a file into a note.
    ///
    /// An empty or missing file is first seeded with the note's latest
    /// content. Changes are saved after `[sync].debounce_ms` of quiet.
    /// Ctrl-C flushes the pending change and exits.
    Watch {
        /// Note id or slug.
        key: String,

        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum NoteAction {
    /// Create a note, optionally seeded with content from a file.
    Create {
        title: String,

        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print a note's metadata.
    Show { key: String },
    /// Replace a note's title. Content is untouched.
    Rename { id: NoteId, title: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Note { action } => {
            let gateway = build_gateway(&cfg).await?;
            match action {
                NoteAction::Create { title, file } => {
                    let content = file.as_deref().map(read_file).transpose()?;
                    let note = gateway.create_note(&NewNote { title, content }).await?;
                    println!("Created note {} ({})", note.id, note.slug);
                }
                NoteAction::Show { key } => {
                    let note = gateway.fetch_note(&NoteKey::parse(&key)).await?;
                    print_note(&note);
                }
                NoteAction::Rename { id, title } => {
                    let note = gateway.rename_note(id, &title).await?;
                    println!("Renamed note {} to \"{}\"", note.id, note.title);
                }
            }
        }
        Commands::Open { key } => {
            let client = build_client(&cfg).await?;
            let note = resolve(&client, &key).await?;
            let editor = CaptureEditor::default();
            let session = client.open(note.id, &editor, &Readiness::ready()).await?;
            session.close().await;
            match editor.take() {
                Some(content) => println!("{}", content),
                None => eprintln!("Note {} has no saved content.", note.id),
            }
        }
        Commands::Save { key, file } => {
            let client = build_client(&cfg).await?;
            let note = resolve(&client, &key).await?;
            let markup = match file {
                Some(path) => read_file(&path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            match client.save_now(note.id, &markup).await {
                SaveOutcome::Saved(fragment) => println!("Saved fragment {}", fragment.id),
                SaveOutcome::Unchanged => println!("Unchanged"),
                SaveOutcome::Skipped(reason) => println!("Skipped: {:?}", reason),
                SaveOutcome::Stale { seq } => println!("Superseded by a newer save (seq {})", seq),
                SaveOutcome::Failed(e) => bail!("Save failed: {}", e),
            }
        }
        Commands::Watch { key, file } => {
            let client = build_client(&cfg).await?;
            let note = resolve(&client, &key).await?;
            run_watch(&client, note.id, &file, cfg.sync.watch_interval()).await?;
        }
    }

    Ok(())
}

async fn build_gateway(cfg: &Config) -> Result<Arc<dyn PersistenceGateway>> {
    match cfg.client.transport {
        Transport::Http => Ok(Arc::new(HttpGateway::new(&cfg.client)?)),
        Transport::Local => {
            let pool = db::connect(cfg).await?;
            migrate::apply(&pool).await?;
            Ok(Arc::new(StoreGateway::new(Arc::new(SqliteBlockStore::new(
                pool,
            )))))
        }
    }
}

async fn build_client(cfg: &Config) -> Result<SyncClient> {
    let gateway = build_gateway(cfg).await?;
    let pointers = FilePointerStore::open(&cfg.client.pointer_path)?;
    Ok(
        SyncClient::new(gateway, Arc::new(pointers), cfg.extractor.build())
            .with_window(cfg.sync.debounce_window()),
    )
}

async fn resolve(client: &SyncClient, key: &str) -> Result<Note> {
    Ok(client.gateway().fetch_note(&NoteKey::parse(key)).await?)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_note(note: &Note) {
    println!("id:      {}", note.id);
    println!("slug:    {}", note.slug);
    println!("title:   {}", note.title);
    if let Some(updated) = note.updated_at {
        println!("updated: {}", updated.to_rfc3339());
    }
    if !note.content.is_empty() {
        println!();
        println!("{}", note.content);
    }
}

/// Editor that only records what bootstrap gave it.
#[derive(Default)]
struct CaptureEditor {
    content: std::sync::Mutex<Option<String>>,
}

impl CaptureEditor {
    fn take(&self) -> Option<String> {
        self.content
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

impl EditorSurface for CaptureEditor {
    fn set_content(&self, content: &str) {
        *self
            .content
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(content.to_string());
    }
}

/// A file on disk acting as the editor. Seeding never clobbers local text.
struct FileEditor {
    path: PathBuf,
}

impl EditorSurface for FileEditor {
    fn set_content(&self, content: &str) {
        let has_text = std::fs::read_to_string(&self.path)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if has_text {
            info!(path = %self.path.display(), "keeping local file over stored content");
            return;
        }
        if let Err(e) = std::fs::write(&self.path, content) {
            warn!(path = %self.path.display(), error = %e, "failed to seed file");
        }
    }
}

async fn run_watch(
    client: &SyncClient,
    note_id: NoteId,
    path: &Path,
    interval: Duration,
) -> Result<()> {
    let editor = FileEditor {
        path: path.to_path_buf(),
    };
    let session = client.open(note_id, &editor, &Readiness::ready()).await?;
    let mut last = std::fs::read_to_string(path).ok();
    if let Some(local) = &last {
        let stored = match session.bootstrap() {
            BootstrapOutcome::Seeded { content, .. } => Some(content.as_str()),
            _ => None,
        };
        if stored != Some(local.as_str()) {
            // Local edits made while offline.
            session.on_change(local);
        }
    }

    println!(
        "Watching {} for note {} (Ctrl-C to stop)",
        path.display(),
        note_id
    );

    let mut status = client.coordinator().subscribe();
    let mut ticker = tokio::time::interval(interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::fs::read_to_string(path).await {
                    Ok(text) => {
                        if last.as_deref() != Some(text.as_str()) {
                            session.on_change(&text);
                            last = Some(text);
                        }
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to read watched file"),
                }
            }
            Ok(()) = status.changed() => {
                report(&status.borrow_and_update());
            }
            _ = &mut shutdown => break,
        }
    }

    session.close().await;
    report(&client.coordinator().status());
    Ok(())
}

fn report(status: &SaveStatus) {
    if status.is_saving {
        return;
    }
    if let Some(error) = &status.error {
        eprintln!("{}", error);
    } else if let Some(at) = status.last_saved_at {
        println!("Saved at {}", at.format("%H:%M:%S"));
    }
}
