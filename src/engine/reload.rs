use std::mem;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::component::InstanceHandle;
use crate::resource;
use crate::world::WorldId;
use crate::Identity;

/// Pending reload requests, shared with file watchers and other threads.
///
/// Requests are deduplicated and applied in request order
/// at the start of the next [`Engine::tick`](crate::Engine::tick).
#[derive(Debug, Default)]
pub struct ReloadQueue {
    pending: Mutex<IndexSet<Identity>>,
}

static_assertions::assert_impl_all!(ReloadQueue: Send, Sync);

impl ReloadQueue {
    /// Requests a reload of `identity`.
    /// Returns `false` if the identity was already queued.
    pub fn request(&self, identity: Identity) -> bool {
        let queued = self.pending.lock().insert(identity);
        if queued {
            log::trace!("Queued reload of {identity}");
        }
        queued
    }

    /// Requests a reload of the resource at `path`.
    pub fn request_path(&self, path: &str) -> bool { self.request(Identity::of_path(path)) }

    /// Number of pending requests.
    pub fn len(&self) -> usize { self.pending.lock().len() }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool { self.pending.lock().is_empty() }

    pub(crate) fn take(&self) -> IndexSet<Identity> { mem::take(&mut *self.pending.lock()) }
}

/// The outcome of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    /// The requested identity.
    pub identity:  Identity,
    /// The handle of the recreated resource, or `None` if it was not resident.
    pub resource:  Option<resource::Handle>,
    /// The instances whose reload hook ran, in world order then schedule order.
    pub instances: Vec<(WorldId, InstanceHandle)>,
}
