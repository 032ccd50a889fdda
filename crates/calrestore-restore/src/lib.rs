//! Rule-driven streaming restore of calendar dumps.
//!
//! A dump is read in one forward pass. Path rules build entities on a typed
//! parse stack, versioned field tables decode their children, and completed
//! entities are handed to a [`sink::RestoreSink`].

pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod fields;
pub mod handlers;
pub mod memory;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod stack;
pub mod subscriptions;
pub mod tables;
pub mod timezone;

pub use context::RestoreOptions;
pub use diagnostics::{EntityKind, Report};
pub use engine::driver::{RestoreFailure, restore, restore_with_registry};
pub use error::{RestoreError, RestoreResult, SinkError, SinkResult};
pub use memory::MemorySink;
pub use session::BatchingSession;
pub use sink::RestoreSink;
