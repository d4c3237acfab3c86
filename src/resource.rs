//! Shared, reference-counted resources.
//!
//! A resource is the payload produced by a [`Factory`] from raw data,
//! e.g. a render prototype built from a `.render` file.
//! The [`Registry`] owns every payload in an arena indexed by [`Handle`]s.
//! Component instances only hold handles, never references,
//! so a payload can be recreated in place on reload
//! and every holder observes the new payload the next time it resolves the handle.
//!
//! # Lifecycle
//! - [`Registry::load`] creates the payload on first use of an identity,
//!   and only increments the reference count afterwards.
//! - [`Registry::release`] decrements the reference count
//!   and destroys the payload when it reaches zero.
//! - [`Registry::reload`] re-fetches the raw data and recreates the payload in place.
//!   On failure, the previous payload stays bound.

use std::any::{self, Any};
use std::fmt;

use crate::error::FactoryError;

mod fetch;
pub use fetch::{DirFetch, Fetch, MemoryFetch};

mod registry;
pub use registry::{EntryInfo, Registry};

/// A handle to a resident resource.
///
/// Handles are generation-checked:
/// once the resource is destroyed, the handle never resolves again,
/// even if its slot is reused by another resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index:      u32,
    generation: u32,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "resource#{}v{}", self.index, self.generation)
    }
}

/// The callbacks of a resource type.
///
/// A factory is registered for a file extension with
/// [`Builder::resource_type`](crate::engine::Builder::resource_type).
/// The registry never invokes two callbacks of the same entry concurrently.
pub trait Factory: Send + Sync + 'static {
    /// The object produced from raw data.
    type Payload: Send + Sync + 'static;

    /// Builds a payload from raw data.
    fn create(&self, raw: &[u8]) -> Result<Self::Payload, FactoryError>;

    /// Releases a payload whose last reference was dropped.
    fn destroy(&self, payload: Self::Payload) { drop(payload) }

    /// Rebuilds `payload` in place from fresh raw data.
    ///
    /// On error, `payload` must be left unchanged.
    /// The default implementation creates a new payload
    /// and passes the previous one to [`destroy`](Self::destroy).
    fn recreate(&self, payload: &mut Self::Payload, raw: &[u8]) -> Result<(), FactoryError> {
        let fresh = self.create(raw)?;
        let previous = std::mem::replace(payload, fresh);
        self.destroy(previous);
        Ok(())
    }
}

type Payload = Box<dyn Any + Send + Sync>;

/// Object-safe form of [`Factory`].
pub(crate) trait AnyFactory: Send + Sync {
    fn create(&self, raw: &[u8]) -> Result<Payload, FactoryError>;

    fn destroy(&self, payload: Payload);

    fn recreate(&self, payload: &mut (dyn Any + Send + Sync), raw: &[u8])
        -> Result<(), FactoryError>;

    fn payload_name(&self) -> &'static str;
}

impl<F: Factory> AnyFactory for F {
    fn create(&self, raw: &[u8]) -> Result<Payload, FactoryError> {
        let payload = Factory::create(self, raw)?;
        Ok(Box::new(payload))
    }

    fn destroy(&self, payload: Payload) {
        match payload.downcast::<F::Payload>() {
            Ok(payload) => Factory::destroy(self, *payload),
            Err(_) => log::error!("Payload passed to destroy is not a {}", self.payload_name()),
        }
    }

    fn recreate(
        &self,
        payload: &mut (dyn Any + Send + Sync),
        raw: &[u8],
    ) -> Result<(), FactoryError> {
        let payload = payload
            .downcast_mut::<F::Payload>()
            .ok_or_else(|| format!("payload is not a {}", self.payload_name()))?;
        Factory::recreate(self, payload, raw)
    }

    fn payload_name(&self) -> &'static str { any::type_name::<F::Payload>() }
}
