use std::any::{self, Any};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use super::{AnyFactory, Factory, Fetch, Handle, Payload};
use crate::identity::{canonical_path, Identity};
use crate::{Error, Result};

/// Owns every resident resource.
///
/// All mutation (`load`, `retain`, `release`, `reload`) holds the registry write lock,
/// so factory callbacks are never invoked concurrently.
/// Payload reads take a recursive read lock
/// and may be held by many component callbacks at once.
pub struct Registry {
    fetch:     Box<dyn Fetch>,
    /// Factories keyed by file extension (without the dot).
    factories: HashMap<String, Arc<dyn AnyFactory>>,
    capacity:  usize,
    inner:     RwLock<Inner>,
}

static_assertions::assert_impl_all!(Registry: Send, Sync);

#[derive(Default)]
struct Inner {
    slots:       Vec<Slot>,
    /// Unused slot indices, reused lowest first.
    free:        BTreeSet<u32>,
    by_identity: HashMap<Identity, Handle>,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry:      Option<Entry>,
}

struct Entry {
    identity:      Identity,
    path:          String,
    payload:       Payload,
    ref_count:     usize,
    factory:       Arc<dyn AnyFactory>,
    reload_failed: bool,
}

/// A snapshot of the bookkeeping of a resident resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// The identity hashed from `path`.
    pub identity:      Identity,
    /// The canonical path the resource was loaded from.
    pub path:          String,
    /// Number of holders of the handle.
    pub ref_count:     usize,
    /// Whether the most recent reload failed, leaving stale content bound.
    pub reload_failed: bool,
}

impl Inner {
    fn get(&self, handle: Handle) -> Option<&Entry> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut Entry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn insert(&mut self, entry: Entry) -> Handle {
        let index = match self.free.pop_first() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                u32::try_from(self.slots.len() - 1).expect("too many resource slots")
            }
        };

        let slot = self.slots.get_mut(index as usize).expect("index was just allocated");
        debug_assert!(slot.entry.is_none(), "free list contains an occupied slot");
        slot.entry = Some(entry);
        Handle { index, generation: slot.generation }
    }

    fn remove(&mut self, handle: Handle) -> Option<Entry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.insert(handle.index);
        Some(entry)
    }
}

fn invalid(handle: Handle) -> Error {
    Error::InvalidHandle(format!("{handle:?} is not resident"))
}

impl Registry {
    /// Creates an empty registry that reads raw data through `fetch`
    /// and holds at most `capacity` resources.
    pub fn new(fetch: impl Fetch + 'static, capacity: usize) -> Self {
        Self {
            fetch: Box::new(fetch),
            factories: HashMap::new(),
            capacity,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers the factory for resources whose path ends with `.{extension}`.
    ///
    /// # Panics
    /// Panics if the extension already has a factory.
    pub fn register_type<F: Factory>(&mut self, extension: &str, factory: F) {
        let extension = extension.trim_start_matches('.').to_string();
        let factory: Arc<dyn AnyFactory> = Arc::new(factory);
        if self.factories.insert(extension.clone(), factory).is_some() {
            panic!("Resource type .{extension} is registered twice");
        }
    }

    fn factory_for(&self, path: &str) -> Result<Arc<dyn AnyFactory>> {
        let extension = path.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.contains('/'));
        match extension.and_then(|ext| self.factories.get(ext)) {
            Some(factory) => Ok(Arc::clone(factory)),
            None => Err(Error::Load {
                path:   path.to_string(),
                reason: "no resource type is registered for this extension".to_string(),
            }),
        }
    }

    /// Returns a handle to the resource at `path`, creating it if it is not resident.
    ///
    /// A resident resource only gets its reference count incremented,
    /// so concurrent loads of one identity share one payload.
    /// A failed creation leaves no entry behind;
    /// the next load of the same path invokes the factory again.
    pub fn load(&self, path: &str) -> Result<Handle> {
        let path = canonical_path(path);
        let identity = Identity::of(&path);

        let mut inner = self.inner.write();

        if let Some(&handle) = inner.by_identity.get(&identity) {
            let entry = inner.get_mut(handle).expect("identity index points to a freed slot");
            entry.ref_count += 1;
            log::trace!("Shared resource {path} ({} references)", entry.ref_count);
            return Ok(handle);
        }

        if inner.by_identity.len() >= self.capacity {
            return Err(Error::OutOfResources {
                what:     "resource registry".to_string(),
                capacity: self.capacity,
            });
        }

        let factory = self.factory_for(&path)?;
        let raw = self
            .fetch
            .fetch(&path)
            .map_err(|err| Error::Load { path: path.clone(), reason: err.to_string() })?;
        let payload = factory
            .create(&raw)
            .map_err(|err| Error::Load { path: path.clone(), reason: err.to_string() })?;

        log::debug!("Created resource {path} ({identity}) as {}", factory.payload_name());
        let handle = inner.insert(Entry {
            identity,
            path,
            payload,
            ref_count: 1,
            factory,
            reload_failed: false,
        });
        inner.by_identity.insert(identity, handle);
        Ok(handle)
    }

    /// Adds a holder to an existing handle.
    pub fn retain(&self, handle: Handle) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner.get_mut(handle).ok_or_else(|| invalid(handle))?;
        entry.ref_count += 1;
        Ok(())
    }

    /// Drops a holder of `handle`, destroying the payload when no holders remain.
    ///
    /// Releasing a handle that is no longer resident is [`Error::InvalidHandle`].
    pub fn release(&self, handle: Handle) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner.get_mut(handle).ok_or_else(|| invalid(handle))?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(());
        }

        let entry = inner.remove(handle).expect("entry was just resolved");
        inner.by_identity.remove(&entry.identity);
        log::debug!("Destroying resource {}", entry.path);
        entry.factory.destroy(entry.payload);
        Ok(())
    }

    /// Re-fetches the raw data of `handle` and recreates its payload in place.
    ///
    /// The handle keeps resolving to the same entry.
    /// On failure the previous payload stays bound,
    /// the entry is flagged as reload-failed and [`Error::ReloadFailed`] is returned.
    pub fn reload(&self, handle: Handle) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner.get_mut(handle).ok_or_else(|| invalid(handle))?;

        let outcome = match self.fetch.fetch(&entry.path) {
            Ok(raw) => entry.factory.recreate(&mut *entry.payload, &raw).map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(()) => {
                entry.reload_failed = false;
                log::info!("Reloaded resource {}", entry.path);
                Ok(())
            }
            Err(reason) => {
                entry.reload_failed = true;
                log::warn!("Reload of {} failed, keeping previous content: {reason}", entry.path);
                Err(Error::ReloadFailed { path: entry.path.clone(), reason })
            }
        }
    }

    /// Returns the handle of a resident identity.
    pub fn find(&self, identity: Identity) -> Option<Handle> {
        self.inner.read_recursive().by_identity.get(&identity).copied()
    }

    /// Borrows the payload of `handle` as a `T`.
    ///
    /// The guard blocks reloads and releases until it is dropped,
    /// so it must not be held across frames.
    pub fn get<T: Any>(&self, handle: Handle) -> Result<MappedRwLockReadGuard<'_, T>> {
        // Recursive so that a callback may hold several payloads
        // while another world waits to release one.
        let inner = self.inner.read_recursive();
        RwLockReadGuard::try_map(inner, |inner| {
            inner.get(handle).and_then(|entry| entry.payload.downcast_ref::<T>())
        })
        .map_err(|_| {
            Error::InvalidHandle(format!("{handle:?} does not resolve to a {}", any::type_name::<T>()))
        })
    }

    /// Returns the bookkeeping of `handle`, if it is resident.
    pub fn info(&self, handle: Handle) -> Option<EntryInfo> {
        let inner = self.inner.read_recursive();
        inner.get(handle).map(|entry| EntryInfo {
            identity:      entry.identity,
            path:          entry.path.clone(),
            ref_count:     entry.ref_count,
            reload_failed: entry.reload_failed,
        })
    }

    /// Returns the number of resident resources.
    pub fn len(&self) -> usize { self.inner.read_recursive().by_identity.len() }

    /// Returns `true` if no resources are resident.
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for slot in &mut self.inner.get_mut().slots {
            if let Some(entry) = slot.entry.take() {
                log::warn!(
                    "Resource {} is still held by {} references at shutdown",
                    entry.path,
                    entry.ref_count
                );
                entry.factory.destroy(entry.payload);
            }
        }
    }
}
