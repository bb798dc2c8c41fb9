use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use mymy_annotate::{
    hover_for_line, note_preview, parse_command_uri, AnnotationRenderer, EditorHost, HostEvent,
    NoteAction, NoteController, NotesConfig, NotesContext,
};
use mymy_notes::{fingerprint, storage_dir_for_root, NoteStore};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

mod config;
mod host;

pub use host::{print_stdout, TerminalHost};

#[derive(Parser)]
#[command(name = "mymy")]
#[command(about = "Markdown notes pinned to source lines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding the notes directory and mymy.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Notes directory, relative to the root (overrides MYMY_STORAGE_DIR)
    #[arg(long, global = true)]
    storage_dir: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a line of text
    Fingerprint(FingerprintArgs),

    /// Create the note for a line (keeps an existing note) and open it
    Create(LineArgs),

    /// Open the note for a line
    Open(LineArgs),

    /// Delete the note for a line
    Delete(LineArgs),

    /// Print a file with its note markers
    Show(FileArgs),

    /// Print the hover text for a line
    Hover(LineArgs),

    /// List all notes
    List(ListArgs),

    /// Run a command link as clicked inside a note
    #[command(name = "run-action")]
    RunAction(RunActionArgs),

    /// Re-render a file whenever it or its notes change (Ctrl-C to stop)
    Watch(FileArgs),
}

#[derive(Args)]
struct FingerprintArgs {
    /// Exact line text, without terminator
    text: String,
}

#[derive(Args)]
struct FileArgs {
    /// Source file
    file: PathBuf,
}

#[derive(Args)]
struct LineArgs {
    /// Source file
    file: PathBuf,

    /// Zero-based line number
    #[arg(short, long)]
    line: usize,

    /// Open notes in $EDITOR instead of printing their path
    #[arg(long)]
    editor: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RunActionArgs {
    /// Source file the link belongs to
    file: PathBuf,

    /// Link such as command:mymy.deleteDocumentation?%7B%22line%22%3A3%7D
    uri: String,

    /// Open notes in $EDITOR instead of printing their path
    #[arg(long)]
    editor: bool,
}

#[derive(Serialize)]
struct ListedNote {
    fingerprint: String,
    preview: String,
    body: String,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = config::load(&cli.root)?;
    if let Some(dir) = cli.storage_dir.clone() {
        config.storage_dir_name = dir;
    }
    let storage_dir = storage_dir_for_root(&cli.root, &config.storage_dir_name);
    debug!("Using notes directory {}", storage_dir.display());

    match cli.command {
        Commands::Fingerprint(args) => print_stdout(&format!("{}\n", fingerprint(&args.text)))?,
        Commands::Create(args) => run_action(NoteAction::Create, &args, &storage_dir).await?,
        Commands::Open(args) => run_action(NoteAction::Edit, &args, &storage_dir).await?,
        Commands::Delete(args) => run_action(NoteAction::Delete, &args, &storage_dir).await?,
        Commands::Show(args) => run_show(&args.file, &storage_dir, &config)?,
        Commands::Hover(args) => run_hover(&args, &storage_dir)?,
        Commands::List(args) => run_list(&args, &storage_dir, &config)?,
        Commands::RunAction(args) => run_link(&args, &storage_dir).await?,
        Commands::Watch(args) => run_watch(&args.file, &cli.root, config).await?,
    }

    Ok(())
}

fn editor_command(enabled: bool) -> Option<String> {
    if !enabled {
        return None;
    }
    std::env::var("VISUAL")
        .ok()
        .or_else(|| std::env::var("EDITOR").ok())
        .filter(|cmd| !cmd.trim().is_empty())
        .or_else(|| {
            warn!("--editor given but neither $VISUAL nor $EDITOR is set");
            None
        })
}

fn loaded_store(storage_dir: &Path) -> Result<NoteStore> {
    let store = NoteStore::new(storage_dir);
    match store.load() {
        Ok(count) => debug!("Loaded {count} notes"),
        Err(err) if err.is_not_found() => debug!("No notes directory yet"),
        Err(err) => return Err(err.into()),
    }
    Ok(store)
}

async fn run_action(action: NoteAction, args: &LineArgs, storage_dir: &Path) -> Result<()> {
    let host = TerminalHost::open(&args.file, args.line)?.with_editor(editor_command(args.editor));
    perform(action, Some(args.line), Arc::new(host), storage_dir).await
}

async fn run_link(args: &RunActionArgs, storage_dir: &Path) -> Result<()> {
    let (action, action_args) = parse_command_uri(&args.uri)?;
    let host = TerminalHost::open(&args.file, 0)?.with_editor(editor_command(args.editor));
    perform(action, action_args.line, Arc::new(host), storage_dir).await
}

async fn perform(
    action: NoteAction,
    line: Option<usize>,
    host: Arc<TerminalHost>,
    storage_dir: &Path,
) -> Result<()> {
    let controller = NoteController::new(storage_dir, host);
    match action {
        NoteAction::Create => {
            let created = controller.create_note(line).await?;
            if !created.created {
                info!("Note for line {} already exists", created.target.line);
            }
        }
        NoteAction::Edit => {
            let target = controller.open_note(line).await?;
            if !target.path.exists() {
                info!("No note for line {} yet", target.line);
            }
        }
        NoteAction::Delete => {
            let deleted = controller.delete_note(line).await?;
            if deleted.existed {
                info!("Deleted {}", deleted.target.path.display());
            } else {
                info!("No note for line {}", deleted.target.line);
            }
        }
    }
    Ok(())
}

fn run_show(file: &Path, storage_dir: &Path, config: &NotesConfig) -> Result<()> {
    let store = loaded_store(storage_dir)?;
    let host = TerminalHost::open(file, 0)?;
    let renderer = AnnotationRenderer::new(store, config.render.clone());
    renderer.refresh(&host);
    print_stdout(&host.render())?;
    Ok(())
}

fn run_hover(args: &LineArgs, storage_dir: &Path) -> Result<()> {
    let store = loaded_store(storage_dir)?;
    let host = TerminalHost::open(&args.file, args.line)?;
    let text = host
        .line_text(host.document(), args.line)
        .with_context(|| format!("{} has no line {}", args.file.display(), args.line))?;
    let hover = hover_for_line(&store, &text, args.line);
    print_stdout(&format!("{}\n", hover.markdown))?;
    Ok(())
}

fn run_list(args: &ListArgs, storage_dir: &Path, config: &NotesConfig) -> Result<()> {
    let store = loaded_store(storage_dir)?;
    let notes: Vec<ListedNote> = store
        .entries()
        .into_iter()
        .map(|entry| ListedNote {
            preview: note_preview(&entry.body, config.render.preview_chars),
            fingerprint: entry.name,
            body: entry.body,
        })
        .collect();

    if args.json {
        print_stdout(&format!("{}\n", serde_json::to_string_pretty(&notes)?))?;
    } else {
        let mut out = String::new();
        for note in &notes {
            out.push_str(&format!("{}  {}\n", note.fingerprint, note.preview));
        }
        print_stdout(&out)?;
    }
    Ok(())
}

async fn run_watch(file: &Path, root: &Path, config: NotesConfig) -> Result<()> {
    let host = Arc::new(TerminalHost::open(file, 0)?.with_echo(true));
    let context = NotesContext::activate(root, config, host.clone());

    let (tx, rx) = mpsc::channel(32);
    let _source_watch = watch_source(host.clone(), tx.clone())?;

    let shutdown = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(HostEvent::Shutdown).await;
        }
    });
    drop(tx);

    info!("Watching {} (Ctrl-C to stop)", file.display());
    context.run(rx).await;
    context.deactivate().await;
    Ok(())
}

/// Watches the source file's directory so atomic-rename saves are seen too.
fn watch_source(
    host: Arc<TerminalHost>,
    events: mpsc::Sender<HostEvent>,
) -> Result<RecommendedWatcher> {
    let path = host.path().to_path_buf();
    let file_name = path
        .file_name()
        .map(ToOwned::to_owned)
        .with_context(|| format!("{} is not a file path", path.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let watched = host.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let touches_file = event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()));
            if !touches_file || event.kind.is_access() {
                return;
            }
            if let Err(err) = watched.reload() {
                debug!("Source not readable yet: {err:#}");
                return;
            }
            let _ = events.blocking_send(HostEvent::DocumentChanged {
                document: watched.document().clone(),
            });
        }
        Err(err) => warn!("Source watch error: {err}"),
    })
    .context("Failed to create source watcher")?;
    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", parent.display()))?;
    Ok(watcher)
}
