use crate::{
    hover_for_line, ActionArgs, AnnotationRenderer, DocumentId, EditorHost, HoverContent,
    MessageLevel, NoteAction, NoteController, RenderConfig, Result,
};
use log::{debug, info, warn};
use mymy_notes::{
    ensure_storage_dir, storage_dir_for_root, NoteStore, NoteSynchronizer, SyncConfig,
    DEFAULT_STORAGE_DIR,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct NotesConfig {
    /// Backing directory name, relative to the project root.
    pub storage_dir_name: String,
    pub sync: SyncConfig,
    pub render: RenderConfig,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            storage_dir_name: DEFAULT_STORAGE_DIR.to_string(),
            sync: SyncConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

/// Notifications a host forwards into [`NotesContext::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    DocumentChanged { document: DocumentId },
    ActiveViewChanged,
    Action { action: NoteAction, args: ActionArgs },
    Shutdown,
}

/// Everything one activation owns: the store, its synchronizer, the renderer and
/// the lifecycle controller, all bound to one host.
pub struct NotesContext {
    host: Arc<dyn EditorHost>,
    store: NoteStore,
    synchronizer: NoteSynchronizer,
    renderer: AnnotationRenderer,
    controller: NoteController,
}

impl NotesContext {
    /// Prepares the backing directory, starts watching, loads the notes and
    /// decorates the active view. Must be called inside a tokio runtime.
    ///
    /// The watch is open before the initial load starts. Storage problems are
    /// reported to the host and leave the store empty; the synchronizer picks the
    /// directory up once it becomes available.
    pub fn activate(root: &Path, config: NotesConfig, host: Arc<dyn EditorHost>) -> Self {
        let dir = storage_dir_for_root(root, &config.storage_dir_name);
        let store = NoteStore::new(&dir);

        let prepared = ensure_storage_dir(&dir);
        let synchronizer = NoteSynchronizer::start(store.clone(), config.sync);
        match prepared.and_then(|()| store.load()) {
            Ok(count) => info!("Activated with {count} notes in {}", dir.display()),
            Err(err) => {
                warn!("Note storage unavailable: {err}");
                host.show_message(MessageLevel::Warning, &format!("mymy: {err}"));
            }
        }

        let renderer = AnnotationRenderer::new(store.clone(), config.render);
        let controller = NoteController::new(dir, host.clone());

        let context = Self {
            host,
            store,
            synchronizer,
            renderer,
            controller,
        };
        context.refresh();
        context
    }

    #[must_use]
    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    #[must_use]
    pub fn synchronizer(&self) -> &NoteSynchronizer {
        &self.synchronizer
    }

    /// Redecorates the active view. Returns the number of decorations applied.
    pub fn refresh(&self) -> Option<usize> {
        self.renderer.refresh(self.host.as_ref())
    }

    /// Hover content for `line` of the active document.
    #[must_use]
    pub fn hover(&self, line: usize) -> Option<HoverContent> {
        let view = self.host.active_view()?;
        let text = self.host.line_text(&view.document, line)?;
        Some(hover_for_line(&self.store, &text, line))
    }

    /// Re-establishes the directory watch, closing the current one first.
    pub async fn restart_watch(&self) -> Result<()> {
        self.synchronizer.restart().await?;
        Ok(())
    }

    /// Runs a note action on behalf of the host. Failures are logged and shown
    /// as a warning, never returned.
    pub async fn dispatch(&self, action: NoteAction, args: ActionArgs) {
        let outcome = match action {
            NoteAction::Create => self.controller.create_note(args.line).await.map(drop),
            NoteAction::Edit => self.controller.open_note(args.line).await.map(drop),
            NoteAction::Delete => self
                .controller
                .delete_note(args.line)
                .await
                .map(|deleted| {
                    if !deleted.existed {
                        debug!("No note to delete for line {}", deleted.target.line);
                    }
                }),
        };
        if let Err(err) = outcome {
            warn!("{action} failed: {err}");
            self.host
                .show_message(MessageLevel::Warning, &format!("mymy: {err}"));
        }
    }

    /// Event loop: redecorates on note changes and relevant host events, runs
    /// actions, and returns on [`HostEvent::Shutdown`] or when `events` closes.
    pub async fn run(&self, mut events: mpsc::Receiver<HostEvent>) {
        let mut changes = self.store.subscribe();
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.refresh();
                }
                event = events.recv() => match event {
                    Some(HostEvent::DocumentChanged { document }) => {
                        let is_active = self
                            .host
                            .active_view()
                            .is_some_and(|view| view.document == document);
                        if is_active {
                            self.refresh();
                        }
                    }
                    Some(HostEvent::ActiveViewChanged) => {
                        self.refresh();
                    }
                    Some(HostEvent::Action { action, args }) => {
                        self.dispatch(action, args).await;
                    }
                    Some(HostEvent::Shutdown) | None => break,
                }
            }
        }
    }

    /// Stops the synchronizer and waits for its watch to be released.
    pub async fn deactivate(self) {
        self.synchronizer.shutdown().await;
        if let Some(view) = self.host.active_view() {
            self.host.set_decorations(&view.document, Vec::new());
        }
        info!("Deactivated notes in {}", self.store.dir().display());
    }
}
