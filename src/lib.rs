//! Botpool supervises a fixed pool of long-running bot scripts on Unix-like
//! systems. Each slot points at an executable; the supervisor launches it
//! detached, finds it again by scanning the process table, stops it together
//! with its descendants and keeps an activity log of everything it does.

/// Activity log and event sinks.
pub mod activity;

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Interactive control loop.
pub mod console;

/// Constants and defaults.
pub mod constants;

/// Error handling.
pub mod error;

/// Spawning and signalling.
pub mod launcher;

/// Per-slot start/stop/restart logic.
pub mod lifecycle;

/// Process table queries.
pub mod matcher;

/// The slot pool.
pub mod pool;

/// Per-slot state.
pub mod record;

/// Runtime paths.
pub mod runtime;

/// Status and elapsed-time timers.
pub mod scheduler;

/// Status rendering.
pub mod status;

/// Persisted slot configuration.
pub mod store;

/// In-memory fakes shared by unit and integration tests.
#[doc(hidden)]
pub mod test_utils;

/// Source updates via git.
pub mod vcs;
