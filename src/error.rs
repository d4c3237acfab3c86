//! The error taxonomy shared by the registry, the worlds and the scheduler.
//!
//! None of these errors is fatal to the frame loop.
//! Allocation and creation errors are returned to the caller
//! (typically scene setup code) which decides whether to abort the scene.
//! Per-instance update and render errors never leave the scheduler;
//! they are logged and passed to the [`Tracer`](crate::Tracer).

use thiserror::Error;

use crate::world::WorldId;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by resource factories.
pub type FactoryError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the framework or by component callbacks.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource data is unavailable or malformed.
    #[error("cannot load resource {path}: {reason}")]
    Load {
        /// Canonical path of the resource.
        path:   String,
        /// Why the data could not be fetched or created.
        reason: String,
    },

    /// A component instance could not be created.
    /// No partial state of the instance is retained.
    #[error("cannot create {type_name} instance: {reason}")]
    CreateFailed {
        /// The registered name of the component type.
        type_name: String,
        /// Why creation failed.
        reason:    String,
    },

    /// A stale or unknown handle was used.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// A bounded table or registry is full.
    #[error("{what} is full (capacity {capacity})")]
    OutOfResources {
        /// What ran out of space.
        what:     String,
        /// The configured capacity.
        capacity: usize,
    },

    /// A message was dropped because the target world has too many pending messages.
    #[error("message queue of {world} is full (capacity {capacity})")]
    QueueFull {
        /// The target world.
        world:    WorldId,
        /// The configured backlog bound.
        capacity: usize,
    },

    /// A resource could not be recreated; the previous payload is still bound.
    #[error("cannot reload resource {path}: {reason}")]
    ReloadFailed {
        /// Canonical path of the resource.
        path:   String,
        /// Why the data could not be fetched or recreated.
        reason: String,
    },

    /// A world was deleted while it still had live instances.
    #[error("{world} still has {count} live component instances")]
    DanglingInstances {
        /// The world that was to be deleted.
        world: WorldId,
        /// Number of live instances across all component types.
        count: usize,
    },

    /// A failure raised by a component type's own callback.
    #[error("{0}")]
    Component(String),
}

impl Error {
    /// Creates an [`Error::Component`] from any message.
    pub fn component(message: impl Into<String>) -> Self { Self::Component(message.into()) }
}
