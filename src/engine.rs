//! The engine owns every world, the resource registry and the message bus.
//!
//! An engine is built once with [`Engine::builder`],
//! where all component and resource types are registered.
//! After that, the caller drives it with [`Engine::tick`] once per frame.

use std::sync::Arc;

use crate::component::{ComponentType, InstanceHandle, TypeIndex, Types};
use crate::message::{Message, MessageBus};
use crate::resource::{Fetch, Registry};
use crate::tracer::Tracer;
use crate::world::{Shared, World, WorldId};
use crate::{Config, Error, Identity, Result};

mod builder;
pub use builder::Builder;

mod reload;
pub use reload::{ReloadQueue, ReloadReport};

mod scheduler;
use scheduler::Executor;

#[cfg(feature = "watch")]
mod watch;
#[cfg(feature = "watch")]
pub use watch::Watcher;

/// Runs the worlds of all active scenes.
pub struct Engine {
    config:     Config,
    types:      Types,
    resources:  Arc<Registry>,
    bus:        Arc<MessageBus>,
    reloads:    Arc<ReloadQueue>,
    worlds:     Vec<World>,
    next_world: u32,
    frame:      u64,
    executor:   Executor,
}

impl Engine {
    /// Starts registering types for a new engine.
    /// Resource data is read through `fetch`.
    pub fn builder(config: Config, fetch: impl Fetch + 'static) -> Builder {
        Builder::new(config, fetch)
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &Config { &self.config }

    /// The number of the last frame started by [`tick`](Self::tick).
    pub fn frame(&self) -> u64 { self.frame }

    /// The resource registry.
    pub fn resources(&self) -> &Arc<Registry> { &self.resources }

    /// The message bus, which may be cloned to post from other threads.
    pub fn bus(&self) -> &Arc<MessageBus> { &self.bus }

    /// The queue of reload requests applied at the start of the next tick.
    pub fn reload_queue(&self) -> &Arc<ReloadQueue> { &self.reloads }

    /// The index of a registered component type.
    pub fn type_index<C: ComponentType>(&self) -> Option<TypeIndex> { self.types.index_of::<C>() }

    /// The index of a component type by its registered name.
    pub fn type_index_by_name(&self, name: &str) -> Option<TypeIndex> {
        self.types.index_by_name(name)
    }

    /// Returns a world by id.
    pub fn world(&self, id: WorldId) -> Option<&World> {
        self.worlds.iter().find(|world| world.id() == id)
    }

    /// The ids of all active worlds, in creation order.
    pub fn worlds(&self) -> impl Iterator<Item = WorldId> + '_ {
        self.worlds.iter().map(|world| world.id())
    }

    fn world_ref(&self, id: WorldId) -> Result<&World> {
        self.world(id).ok_or_else(|| Error::InvalidHandle(format!("{id} does not exist")))
    }

    fn world_mut(&mut self, id: WorldId) -> Result<&mut World> {
        find_world_mut(&mut self.worlds, id)
    }

    fn typed_index<C: ComponentType>(&self) -> Result<TypeIndex> {
        self.type_index::<C>().ok_or_else(|| {
            Error::InvalidHandle(format!(
                "component type {} is not registered",
                std::any::type_name::<C>()
            ))
        })
    }

    /// Creates a world for `scene`, initializing the state of every component type.
    pub fn new_world(&mut self, scene: impl Into<String>) -> Result<WorldId> {
        if self.worlds.len() >= self.config.max_worlds {
            return Err(Error::OutOfResources {
                what:     "world list".to_string(),
                capacity: self.config.max_worlds,
            });
        }

        let id = WorldId(self.next_world);
        let world = World::new(id, scene.into(), &self.types)?;
        self.next_world += 1;
        self.bus.open(id);
        self.worlds.push(world);
        Ok(id)
    }

    /// Deletes a world whose instances have all been destroyed.
    ///
    /// If live instances remain, the world is left intact and
    /// [`Error::DanglingInstances`] is returned.
    pub fn delete_world(&mut self, id: WorldId) -> Result<()> {
        let position = self
            .worlds
            .iter()
            .position(|world| world.id() == id)
            .ok_or_else(|| Error::InvalidHandle(format!("{id} does not exist")))?;

        let count = self.worlds[position].live_count();
        if count > 0 {
            log::error!("Cannot delete {id} with {count} live instances");
            return Err(Error::DanglingInstances { world: id, count });
        }

        let world = self.worlds.remove(position);
        self.bus.forget(id);
        world.delete();
        Ok(())
    }

    /// Creates an instance of `C` in a world.
    ///
    /// The instance is inert until passed to [`add_to_update`](Self::add_to_update).
    pub fn create<C: ComponentType>(
        &mut self,
        world: WorldId,
        params: C::Params,
    ) -> Result<InstanceHandle> {
        let ty = self.typed_index::<C>()?;
        let world = find_world_mut(&mut self.worlds, world)?;
        world.create::<C>(ty, &self.resources, params)
    }

    /// Makes an instance eligible for update and render, starting from the next frame.
    pub fn add_to_update(&mut self, world: WorldId, handle: InstanceHandle) -> Result<()> {
        self.world_mut(world)?.add_to_update(handle)
    }

    /// Destroys an instance and releases its resources.
    ///
    /// Destroying an instance twice is [`Error::InvalidHandle`].
    pub fn destroy(&mut self, world: WorldId, handle: InstanceHandle) -> Result<()> {
        let world = find_world_mut(&mut self.worlds, world)?;
        world.destroy(handle, &self.resources)
    }

    /// Borrows the state of an instance.
    pub fn instance<C: ComponentType>(
        &self,
        world: WorldId,
        handle: InstanceHandle,
    ) -> Result<&C::Instance> {
        self.world_ref(world)?.typed::<C>(handle.type_index())?.get(handle)
    }

    /// Mutably borrows the state of an instance.
    pub fn instance_mut<C: ComponentType>(
        &mut self,
        world: WorldId,
        handle: InstanceHandle,
    ) -> Result<&mut C::Instance> {
        self.world_mut(world)?.typed_mut::<C>(handle.type_index())?.get_mut(handle)
    }

    /// Borrows the per-world state of `C`.
    pub fn world_state<C: ComponentType>(&self, world: WorldId) -> Result<&C::World> {
        let ty = self.typed_index::<C>()?;
        Ok(self.world_ref(world)?.typed::<C>(ty)?.state())
    }

    /// Mutably borrows the per-world state of `C`.
    pub fn world_state_mut<C: ComponentType>(&mut self, world: WorldId) -> Result<&mut C::World> {
        let ty = self.typed_index::<C>()?;
        Ok(self.world_mut(world)?.typed_mut::<C>(ty)?.state_mut())
    }

    /// Queues a message for the next dispatch phase of its target world.
    pub fn post(&self, message: Message) -> Result<()> { self.bus.post(message) }

    /// Runs one frame.
    ///
    /// Queued reload requests are applied first.
    /// Then every world runs dispatch, update and render,
    /// in parallel if the engine was configured with a nonzero concurrency.
    pub fn tick(&mut self, dt: f32, tracer: &impl Tracer) {
        for identity in self.reloads.take() {
            if let Err(err) = self.reload(identity, tracer) {
                log::debug!("Queued reload of {identity} failed: {err}");
            }
        }

        self.frame += 1;
        self.bus.begin_frame(self.frame);
        tracer.start_frame(self.frame, dt);

        let shared = Shared {
            types: &self.types,
            resources: &self.resources,
            bus: &self.bus,
            frame: self.frame,
            dt,
        };
        self.executor.run(&mut self.worlds, shared, tracer);

        tracer.end_frame(self.frame);
    }

    /// Recreates the resource `identity` and notifies every instance holding it.
    ///
    /// Resources that are not resident are ignored.
    /// The resource is fully recreated before any reload hook runs.
    /// If recreation fails, no hook runs and [`Error::ReloadFailed`] is returned.
    pub fn reload(&mut self, identity: Identity, tracer: &impl Tracer) -> Result<ReloadReport> {
        let mut report = ReloadReport { identity, resource: None, instances: Vec::new() };

        let handle = match self.resources.find(identity) {
            Some(handle) => handle,
            None => {
                log::debug!("Skipped reload of {identity}: not resident");
                return Ok(report);
            }
        };
        report.resource = Some(handle);

        let result = self.resources.reload(handle);
        tracer.reload_resource(identity, result.is_ok());
        result?;

        let shared = Shared {
            types: &self.types,
            resources: &self.resources,
            bus: &self.bus,
            frame: self.frame,
            dt: 0.0,
        };
        for world in &mut self.worlds {
            let id = world.id();
            report.instances.extend(world.reload(shared, handle, tracer).into_iter().map(|h| (id, h)));
        }

        log::info!("Reloaded {identity}, notified {} instances", report.instances.len());
        Ok(report)
    }

    /// Reloads the resource at `path`.
    pub fn reload_path(&mut self, path: &str, tracer: &impl Tracer) -> Result<ReloadReport> {
        self.reload(Identity::of_path(path), tracer)
    }

    /// Destroys all instances and deletes all worlds.
    pub fn shutdown(mut self) { self.teardown(); }

    fn teardown(&mut self) {
        for mut world in self.worlds.drain(..) {
            let count = world.destroy_all(&self.resources);
            if count > 0 {
                log::debug!("Destroyed {count} remaining instances of {}", world.id());
            }
            self.bus.forget(world.id());
            world.delete();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) { self.teardown(); }
}

fn find_world_mut(worlds: &mut [World], id: WorldId) -> Result<&mut World> {
    worlds
        .iter_mut()
        .find(|world| world.id() == id)
        .ok_or_else(|| Error::InvalidHandle(format!("{id} does not exist")))
}
