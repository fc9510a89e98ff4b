//! Core functionality for relocator
//!
//! Watches glob patterns for files that have stopped growing and hands each
//! settled file, exactly once, to a bounded pool of workers running an
//! external relocation command.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod service;
pub mod tracker;
pub mod watcher;
pub mod worker;

pub use config::{Settings, SourceSettings};
pub use dispatch::{DispatchEvent, DispatchReceiver, DispatchSender, dispatch_channel};
pub use error::{ConfigError, DispatchError, RelocationError};
pub use registry::{Source, SourceRegistry, SourceSnapshot};
pub use service::{RelocationService, ServiceHandle};
pub use tracker::{FileStatus, StabilityTracker, TrackedFile};
pub use watcher::WatcherLoop;
pub use worker::{CommandRelocator, PoolStats, Relocate, WorkerPool};
