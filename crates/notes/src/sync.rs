use crate::events::{classify, needs_rescan, touches_dir, NoteEvent};
use crate::store::NoteChange;
use crate::{NoteStore, NotesError, Result};
use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Floor for timer periods; `tokio::time::interval` rejects a zero period.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Quiet period after the last event before a batch is applied.
    pub debounce: Duration,
    /// Upper bound on how long a burst of events can postpone a batch.
    pub max_batch_wait: Duration,
    /// How often a lost watch is retried. Values below 1 ms are raised to 1 ms.
    pub recovery_interval: Duration,
    pub notify_poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            max_batch_wait: Duration::from_millis(500),
            recovery_interval: Duration::from_secs(2),
            notify_poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub watching: bool,
    pub events_applied: u64,
    pub errors: u64,
    pub last_error: Option<String>,
    pub restarts: u32,
}

/// Keeps a [`NoteStore`] consistent with its backing directory.
///
/// A single background task owns the OS watch handle and is the only writer of
/// the store. Handles are cheap to clone; the task stops on [`shutdown`] or when
/// the last handle is dropped.
///
/// [`shutdown`]: NoteSynchronizer::shutdown
#[derive(Clone)]
pub struct NoteSynchronizer {
    inner: Arc<SynchronizerInner>,
}

struct SynchronizerInner {
    command_tx: mpsc::Sender<SyncCommand>,
    status_tx: watch::Sender<SyncStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

enum SyncCommand {
    Restart { reply: oneshot::Sender<Result<()>> },
    Shutdown,
}

impl NoteSynchronizer {
    /// Establishes the watch and spawns the reconcile loop. Must be called inside a
    /// tokio runtime.
    ///
    /// A watch that cannot be established is not fatal: the status reports it as
    /// inactive and the loop keeps retrying every `recovery_interval`.
    #[must_use]
    pub fn start(store: NoteStore, config: SyncConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(16);

        let dir = store.dir().to_path_buf();
        let watcher = match open_watch(&dir, event_tx.clone(), config.notify_poll_interval) {
            Ok(watcher) => {
                info!("Watching notes in {}", dir.display());
                Some(watcher)
            }
            Err(err) => {
                warn!("{err}");
                None
            }
        };
        let status = SyncStatus {
            watching: watcher.is_some(),
            ..SyncStatus::default()
        };
        let (status_tx, _) = watch::channel(status);

        let task = spawn_sync_loop(SyncLoop {
            store,
            dir,
            config,
            watcher,
            event_tx,
            event_rx,
            command_rx,
            status_tx: status_tx.clone(),
        });

        Self {
            inner: Arc::new(SynchronizerInner {
                command_tx,
                status_tx,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Closes the current watch and opens a fresh one on the same directory.
    ///
    /// The previous handle is released before the new one is created, so repeated
    /// calls never stack watches or deliver an external change twice.
    pub async fn restart(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.inner
            .command_tx
            .send(SyncCommand::Restart { reply })
            .await
            .map_err(|_| NotesError::WatchFailure("synchronizer is stopped".to_string()))?;
        response
            .await
            .map_err(|_| NotesError::WatchFailure("synchronizer is stopped".to_string()))?
    }

    /// Stops the loop and waits until the OS watch has been released.
    pub async fn shutdown(&self) {
        let _ = self.inner.command_tx.send(SyncCommand::Shutdown).await;
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                error!("Note synchronizer task failed: {err}");
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status_tx.borrow().clone()
    }
}

impl Drop for NoteSynchronizer {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(SyncCommand::Shutdown);
        }
    }
}

fn open_watch(
    dir: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )
    .map_err(|e| NotesError::WatchFailure(format!("watcher init failed: {e}")))?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| NotesError::WatchFailure(format!("failed to watch {}: {e}", dir.display())))?;
    Ok(watcher)
}

struct SyncLoop {
    store: NoteStore,
    dir: PathBuf,
    config: SyncConfig,
    watcher: Option<RecommendedWatcher>,
    event_tx: mpsc::Sender<notify::Result<Event>>,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    command_rx: mpsc::Receiver<SyncCommand>,
    status_tx: watch::Sender<SyncStatus>,
}

fn spawn_sync_loop(mut state: SyncLoop) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending = PendingEvents::new(state.config.debounce, state.config.max_batch_wait);
        let mut recovery = time::interval(state.config.recovery_interval.max(MIN_TICK));
        recovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Dir aliases the watch backend may report paths under (e.g. /var vs /private/var).
        let dir_forms = dir_forms(&state.dir);

        loop {
            let deadline = pending.deadline();

            tokio::select! {
                Some(event) = state.event_rx.recv() => {
                    state.handle_raw_event(&dir_forms, event, &mut pending).await;
                }
                cmd = state.command_rx.recv() => {
                    match cmd {
                        Some(SyncCommand::Restart { reply }) => {
                            let outcome = state.restart_watch().await;
                            let _ = reply.send(outcome);
                        }
                        Some(SyncCommand::Shutdown) | None => break,
                    }
                }
                () = async {
                    if let Some(deadline) = deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if deadline.is_some() => {
                    let batch = pending.drain();
                    state.apply_batch(batch).await;
                }
                _ = recovery.tick() => {
                    if state.watcher.is_none() && state.dir.is_dir() {
                        if let Err(err) = state.reopen_watch(true).await {
                            debug!("Watch recovery attempt failed: {err}");
                        }
                    }
                }
            }
        }

        state.watcher = None;
        state.update_status(|status| status.watching = false);
        info!("Stopped watching notes in {}", state.dir.display());
    })
}

impl SyncLoop {
    async fn handle_raw_event(
        &mut self,
        dir_forms: &[PathBuf],
        event: notify::Result<Event>,
        pending: &mut PendingEvents,
    ) {
        match event {
            Ok(evt) if needs_rescan(&evt) => {
                pending.clear();
                if self.dir.is_dir() {
                    self.rescan().await;
                } else {
                    self.drop_lost_dir();
                }
            }
            Ok(evt) => {
                let mut lost_dir = false;
                for dir in dir_forms {
                    for note_event in classify(dir, &evt) {
                        pending.record(note_event);
                    }
                    lost_dir |= touches_dir(dir, &evt);
                }
                if lost_dir && !self.dir.is_dir() {
                    pending.clear();
                    self.drop_lost_dir();
                }
            }
            Err(err) => {
                warn!("Note watcher error: {err}");
                let message = err.to_string();
                self.update_status(|status| {
                    status.errors += 1;
                    status.last_error = Some(message);
                });
                if !self.dir.is_dir() {
                    pending.clear();
                    self.drop_lost_dir();
                }
            }
        }
    }

    /// Dispatches each coalesced event to its handler and applies the resulting
    /// mutations as one batch.
    async fn apply_batch(&mut self, batch: Vec<NoteEvent>) {
        if batch.is_empty() {
            return;
        }
        let mut changes = Vec::with_capacity(batch.len());
        let mut applied = 0u64;
        for event in batch {
            let Some(name) = event.name().map(str::to_string) else {
                continue;
            };
            match event {
                NoteEvent::Added(path) => {
                    debug!("Note file added: {}", path.display());
                }
                NoteEvent::Changed(path) => match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let body = String::from_utf8_lossy(&bytes).into_owned();
                        changes.push(NoteChange::Set { name, body });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        debug!("Note vanished before read: {}", path.display());
                        changes.push(NoteChange::Remove { name });
                    }
                    Err(err) => {
                        let err = NotesError::note_io(&path, err);
                        warn!("{err}");
                        let message = err.to_string();
                        self.update_status(|status| {
                            status.errors += 1;
                            status.last_error = Some(message);
                        });
                        continue;
                    }
                },
                NoteEvent::Removed(path) => {
                    debug!("Note file removed: {}", path.display());
                    changes.push(NoteChange::Remove { name });
                }
            }
            applied += 1;
        }

        if self.store.apply(changes) {
            debug!("Note store updated ({applied} events)");
        }
        self.update_status(|status| status.events_applied += applied);
    }

    async fn restart_watch(&mut self) -> Result<()> {
        let was_watching = self.watcher.is_some();
        let outcome = self.reopen_watch(!was_watching).await;
        self.update_status(|status| status.restarts += 1);
        outcome
    }

    /// Replaces the watch handle; the old one is dropped (closed) first.
    async fn reopen_watch(&mut self, reload: bool) -> Result<()> {
        self.watcher = None;
        let watcher = match open_watch(
            &self.dir,
            self.event_tx.clone(),
            self.config.notify_poll_interval,
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                let message = err.to_string();
                self.update_status(|status| {
                    status.watching = false;
                    status.errors += 1;
                    status.last_error = Some(message);
                });
                return Err(err);
            }
        };
        self.watcher = Some(watcher);
        self.update_status(|status| status.watching = true);
        info!("Watching notes in {}", self.dir.display());

        if reload {
            // Changes made while unwatched produced no events; rebuild from disk.
            let store = self.store.clone();
            match tokio::task::spawn_blocking(move || store.load()).await {
                Ok(Ok(count)) => debug!("Reloaded {count} notes after re-establishing watch"),
                Ok(Err(err)) => warn!("Reload after re-establishing watch failed: {err}"),
                Err(err) => error!("Reload task failed: {err}"),
            }
        }
        Ok(())
    }

    /// Rebuilds the mirror from disk after the backend dropped events.
    async fn rescan(&mut self) {
        warn!(
            "Note watcher lost events in {}; rescanning",
            self.dir.display()
        );
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(count)) => debug!("Rescanned {count} notes"),
            Ok(Err(err)) => {
                warn!("Rescan failed: {err}");
                let message = err.to_string();
                self.update_status(|status| {
                    status.errors += 1;
                    status.last_error = Some(message);
                });
            }
            Err(err) => error!("Rescan task failed: {err}"),
        }
    }

    fn drop_lost_dir(&mut self) {
        warn!(
            "Note directory {} disappeared; watch suspended until it returns",
            self.dir.display()
        );
        self.watcher = None;
        self.store.clear();
        let message = format!("note directory {} removed", self.dir.display());
        self.update_status(|status| {
            status.watching = false;
            status.last_error = Some(message);
        });
    }

    fn update_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.status_tx.send_modify(f);
    }
}

fn dir_forms(dir: &Path) -> Vec<PathBuf> {
    let mut forms = vec![dir.to_path_buf()];
    if let Ok(canonical) = std::fs::canonicalize(dir) {
        if canonical != dir {
            forms.push(canonical);
        }
    }
    forms
}

/// Coalesces bursts of note events: one entry per path, latest event wins and
/// moves to the back, so delivery order of the final events is preserved.
struct PendingEvents {
    debounce: Duration,
    max_batch: Duration,
    queue: VecDeque<NoteEvent>,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
}

impl PendingEvents {
    fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            queue: VecDeque::new(),
            first_event: None,
            last_event: None,
        }
    }

    fn record(&mut self, event: NoteEvent) {
        let earlier = self
            .queue
            .iter()
            .position(|queued| queued.path() == event.path())
            .and_then(|idx| self.queue.remove(idx));
        // An `Added` that follows other events for the same path no longer marks a
        // fresh file: whatever was mirrored before is stale and must be re-read.
        let event = match (earlier, event) {
            (Some(_), NoteEvent::Added(path)) => NoteEvent::Changed(path),
            (_, event) => event,
        };
        self.queue.push_back(event);

        let now = Instant::now();
        self.last_event = Some(now);
        self.first_event.get_or_insert(now);
    }

    fn deadline(&self) -> Option<time::Instant> {
        if self.queue.is_empty() {
            return None;
        }
        let quiet = self.last_event.map(|last| last + self.debounce);
        let forced = self.first_event.map(|first| first + self.max_batch);
        let deadline = match (quiet, forced) {
            (Some(quiet), Some(forced)) => quiet.min(forced),
            (quiet, forced) => quiet.or(forced)?,
        };
        Some(time::Instant::from_std(deadline))
    }

    fn drain(&mut self) -> Vec<NoteEvent> {
        self.first_event = None;
        self.last_event = None;
        self.queue.drain(..).collect()
    }

    fn clear(&mut self) {
        self.drain();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::Flag;
    use notify::EventKind;
    use pretty_assertions::assert_eq;

    fn path(name: &str) -> PathBuf {
        PathBuf::from("/project/.mymy").join(name)
    }

    fn pending() -> PendingEvents {
        PendingEvents::new(Duration::from_millis(50), Duration::from_millis(500))
    }

    fn idle_loop(dir: &Path) -> SyncLoop {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (_command_tx, command_rx) = mpsc::channel(1);
        let (status_tx, _) = watch::channel(SyncStatus::default());
        SyncLoop {
            store: NoteStore::new(dir),
            dir: dir.to_path_buf(),
            config: SyncConfig::default(),
            watcher: None,
            event_tx,
            event_rx,
            command_rx,
            status_tx,
        }
    }

    #[tokio::test]
    async fn overflow_rebuilds_the_mirror_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        let stale = crate::fingerprint("stale line");
        let fresh = crate::fingerprint("fresh line");
        std::fs::write(dir.join(stale.as_str()), "old").unwrap();

        let mut state = idle_loop(&dir);
        state.store.load().unwrap();
        std::fs::remove_file(dir.join(stale.as_str())).unwrap();
        std::fs::write(dir.join(fresh.as_str()), "new").unwrap();

        let mut pending = pending();
        pending.record(NoteEvent::Changed(dir.join(stale.as_str())));
        let overflow = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        state
            .handle_raw_event(&[dir.clone()], Ok(overflow), &mut pending)
            .await;

        assert_eq!(pending.len(), 0);
        assert!(!state.store.contains(&stale));
        assert_eq!(state.store.get(&fresh).as_deref(), Some("new"));
    }

    #[test]
    fn empty_queue_has_no_deadline() {
        assert!(pending().deadline().is_none());
    }

    #[test]
    fn recording_sets_a_deadline() {
        let mut state = pending();
        state.record(NoteEvent::Changed(path("a")));
        assert!(state.deadline().is_some());
    }

    #[test]
    fn coalesces_per_path_keeping_latest_event_last() {
        let mut state = pending();
        state.record(NoteEvent::Added(path("a")));
        state.record(NoteEvent::Changed(path("b")));
        state.record(NoteEvent::Changed(path("a")));
        state.record(NoteEvent::Changed(path("a")));
        assert_eq!(state.len(), 2);
        assert_eq!(
            state.drain(),
            vec![NoteEvent::Changed(path("b")), NoteEvent::Changed(path("a"))]
        );
        assert!(state.deadline().is_none());
    }

    #[test]
    fn remove_after_change_wins() {
        let mut state = pending();
        state.record(NoteEvent::Changed(path("a")));
        state.record(NoteEvent::Removed(path("a")));
        assert_eq!(state.drain(), vec![NoteEvent::Removed(path("a"))]);
    }

    #[test]
    fn recreated_file_is_reread() {
        let mut state = pending();
        state.record(NoteEvent::Removed(path("a")));
        state.record(NoteEvent::Added(path("a")));
        assert_eq!(state.drain(), vec![NoteEvent::Changed(path("a"))]);
    }

    #[test]
    fn lone_add_stays_an_add() {
        let mut state = pending();
        state.record(NoteEvent::Added(path("a")));
        assert_eq!(state.drain(), vec![NoteEvent::Added(path("a"))]);
    }

    #[test]
    fn burst_is_capped_by_max_batch_wait() {
        let mut state = PendingEvents::new(Duration::from_secs(10), Duration::from_millis(100));
        state.record(NoteEvent::Changed(path("a")));
        let deadline = state.deadline().unwrap();
        assert!(deadline <= time::Instant::now() + Duration::from_millis(100));
    }
}
