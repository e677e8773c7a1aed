//! # flowsync
//!
//! Client-side synchronization core for a visual node-graph editor.
//!
//! The crate serializes the editor graph into the backend's wire workflow,
//! submits it under a per-session lock, streams the resulting task over a
//! duplex channel while applying incremental patches to the live project,
//! and fronts the file and result services with bounded frequency caches.
//!
//! ## Layout
//!
//! - [`graph`]: editor graph and its wire mapping
//! - [`cache`]: LFU cache with LRU tie-break and adaptive TTL
//! - [`task`]: single-slot task monitor, timer events and typed patches
//! - [`sync`]: [`Session`](sync::Session) and its sync sequence
//! - [`classify`]: user-facing error messages
//! - [`client`] and [`shared`]: backend traits, REST client, task channels
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use flowsync::{Session, SyncConfig};
//! use flowsync::types::Project;
//!
//! # async fn example() -> flowsync::Result<()> {
//! let config = SyncConfig::from_env();
//! let session = Session::connect(config, Project::new(1, "demo", 1), None)?;
//!
//! let timers = session.timers().clone();
//! timers.subscribe(std::sync::Arc::new(|event: &flowsync::task::TimerEvent| {
//!     println!("{} {:?}", event.node_id, event.kind);
//! }));
//!
//! session.sync().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
#[cfg(feature = "logging")]
pub mod logging;
pub mod shared;
pub mod sync;
pub mod task;
pub mod thumbnail;
pub mod types;

pub use config::SyncConfig;
pub use error::{Error, PatchError, Result, TransportError};
pub use sync::{Session, SessionBuilder, SyncStatus};
pub use task::{TaskManager, TaskReport, TaskState};
