//! Filesystem watcher feeding file-change events into the Store-Unit Repo.
//!
//! # Architecture
//!
//! ```text
//! FsWatcher
//!   - notify::RecommendedWatcher on a background thread
//!   - Debouncer buffers rapid-fire events
//!   - PathRegistry tracks which directories are already being watched
//! ```
//!
//! `take_ready_paths` is polled (by the CLI `watch` loop) rather than
//! driven by a callback, since the rest of the index is synchronous.

mod debouncer;
mod fs_watcher;
mod path_registry;

pub use debouncer::Debouncer;
pub use fs_watcher::FsWatcher;
pub use path_registry::PathRegistry;
