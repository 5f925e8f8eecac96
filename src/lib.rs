//! luach - Synagogue display board rotation engine
//!
//! The engine behind an unattended, always-on display that cycles through
//! prayer times, announcements, memorial and event boards, preempts the
//! rotation with a sunrise countdown, and keeps rendering through backend
//! outages from a persisted cache.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`backend`] - HTTP data source for the collection API
//! - [`cache`] - TTL snapshot cache with durable persistence
//! - [`schedule`] - Playlist entries and pure schedule evaluation
//! - [`countdown`] - Sunrise countdown monitor
//! - [`rotation`] - Rotation state machine
//! - [`background`] - Background resolution, image preloading, crossfades
//! - [`engine`] - The event loop wiring everything together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use luach::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store: Arc<dyn luach::cache::KvStore> =
//!         Arc::new(JsonFileStore::new(&config.cache.storage_dir));
//!     let source = Arc::new(HttpDataSource::new(&config.backend)?);
//!     let cache = BoardCache::open(source, store.clone(), (&config.cache).into()).await;
//!
//!     let playlist = luach::schedule::load_playlist(store.as_ref()).await;
//!     let loader = Arc::new(luach::background::NullLoader);
//!     let (engine, _handle) = Engine::new(&config, cache, playlist, loader, Box::new(LogRenderer));
//!     engine.run().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod background;
pub mod cache;
pub mod config;
pub mod countdown;
pub mod engine;
pub mod error;
pub mod models;
pub mod rotation;
pub mod schedule;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::HttpDataSource;
    pub use crate::cache::{BoardCache, CacheSnapshot, JsonFileStore};
    pub use crate::config::Config;
    pub use crate::engine::{ControlCommand, Engine, EngineHandle, LogRenderer, RenderSink};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{BoardInstance, BoardKind, DayType};
    pub use crate::schedule::ScheduleEntry;
}

// Direct re-exports for convenience
pub use models::{BoardInstance, BoardKind, DayType};
