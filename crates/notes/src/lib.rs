//! # mymy notes
//!
//! Line notes addressed by the content of the line they describe.
//!
//! ## Pipeline
//!
//! ```text
//! Line text
//!     │
//!     ├──> Fingerprint (SHA-1, lowercase hex)
//!     │      └─> Note file name
//!     │
//!     ├──> Backing directory (`.mymy/<fingerprint>`)
//!     │      └─> NoteStore::load (initial mirror)
//!     │
//!     └──> NoteSynchronizer (notify watch)
//!            └─> NoteStore set/remove + change notification
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mymy_notes::{fingerprint, NoteStore, NoteSynchronizer, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> mymy_notes::Result<()> {
//!     let store = NoteStore::new("/path/to/project/.mymy");
//!     store.load()?;
//!     let sync = NoteSynchronizer::start(store.clone(), SyncConfig::default());
//!
//!     if let Some(body) = store.get(&fingerprint("echo hello")) {
//!         println!("{body}");
//!     }
//!
//!     sync.shutdown().await;
//!     Ok(())
//! }
//! ```

mod error;
mod events;
mod fingerprint;
mod paths;
mod store;
mod sync;

pub use error::{NotesError, Result};
pub use events::{classify, NoteEvent};
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_LEN};
pub use paths::{
    ensure_storage_dir, is_note_file_name, note_path, storage_dir_for_root, DEFAULT_STORAGE_DIR,
};
pub use store::{NoteEntry, NoteStore};
pub use sync::{NoteSynchronizer, SyncConfig, SyncStatus};
