//! Worlds hold the component instances of one scene.
//!
//! A world owns one instance table per registered component type
//! and runs the three phases of a frame over them:
//! dispatch of pending messages, update, then render.
//! Instances destroyed from inside a callback are freed at the end of each phase.

use std::fmt;
use std::mem;

use indexmap::IndexSet;

use crate::component::{
    self, AnyTable, ComponentType, InstanceHandle, NewWorldContext, Scope, Table, TypeIndex, Types,
};
use crate::message::{Address, Message, MessageBus};
use crate::resource::{self, Registry};
use crate::tracer::{Phase, Tracer};
use crate::{Error, Result};

/// Identifies a world for the lifetime of an engine. Ids are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldId(pub(crate) u32);

impl fmt::Debug for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "world#{}", self.0) }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "world#{}", self.0) }
}

/// The state shared by all worlds during a frame or a reload.
#[derive(Clone, Copy)]
pub(crate) struct Shared<'t> {
    pub(crate) types:     &'t Types,
    pub(crate) resources: &'t Registry,
    pub(crate) bus:       &'t MessageBus,
    pub(crate) frame:     u64,
    pub(crate) dt:        f32,
}

/// The component instances of one scene.
pub struct World {
    id:     WorldId,
    scene:  String,
    /// Indexed by [`TypeIndex`].
    tables: Vec<Box<dyn AnyTable>>,
    /// Instances destroyed during the current phase.
    doomed: IndexSet<InstanceHandle>,
}

static_assertions::assert_impl_all!(World: Send);

impl World {
    pub(crate) fn new(id: WorldId, scene: String, types: &Types) -> Result<Self> {
        let mut tables: Vec<Box<dyn AnyTable>> = Vec::with_capacity(types.len());

        for (index, entry) in types.iter() {
            let ctx = NewWorldContext { world: id, scene: &scene, capacity: entry.capacity };
            match entry.ty.new_table(index, &entry.descriptor.name, &ctx) {
                Ok(table) => tables.push(table),
                Err(err) => {
                    log::error!("Cannot create {} state of {id}: {err}", entry.descriptor.name);
                    for table in tables.into_iter().rev() {
                        table.delete();
                    }
                    return Err(err);
                }
            }
        }

        log::debug!("Created {id} for scene {scene:?} with {} component types", tables.len());
        Ok(Self { id, scene, tables, doomed: IndexSet::new() })
    }

    /// The id of this world.
    pub fn id(&self) -> WorldId { self.id }

    /// The scene this world was created for.
    pub fn scene(&self) -> &str { &self.scene }

    /// Number of live instances across all component types.
    pub fn live_count(&self) -> usize { self.tables.iter().map(|table| table.live_count()).sum() }

    /// Whether `handle` refers to a live instance.
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.table(handle.type_index()).map_or(false, |table| table.contains(handle))
    }

    /// Whether `handle` refers to a live instance that was added to scheduling.
    pub fn is_added(&self, handle: InstanceHandle) -> bool {
        self.table(handle.type_index()).map_or(false, |table| table.is_added(handle))
    }

    /// Handles of all live instances of a type, in slot order.
    pub fn instances(&self, ty: TypeIndex) -> Vec<InstanceHandle> {
        self.table(ty).map(|table| table.handles()).unwrap_or_default()
    }

    fn table(&self, ty: TypeIndex) -> Option<&dyn AnyTable> {
        self.tables.get(ty.0).map(|table| &**table)
    }

    fn table_mut(&mut self, ty: TypeIndex) -> Result<&mut (dyn AnyTable + 'static)> {
        match self.tables.get_mut(ty.0) {
            Some(table) => Ok(&mut **table),
            None => Err(Error::InvalidHandle(format!("{ty:?} is not registered"))),
        }
    }

    pub(crate) fn typed<C: ComponentType>(&self, ty: TypeIndex) -> Result<&Table<C>> {
        self.table(ty)
            .and_then(|table| table.as_any().downcast_ref::<Table<C>>())
            .ok_or_else(|| mismatch::<C>(ty))
    }

    pub(crate) fn typed_mut<C: ComponentType>(&mut self, ty: TypeIndex) -> Result<&mut Table<C>> {
        self.table_mut(ty)?.as_any_mut().downcast_mut::<Table<C>>().ok_or_else(|| mismatch::<C>(ty))
    }

    pub(crate) fn create<C: ComponentType>(
        &mut self,
        ty: TypeIndex,
        resources: &Registry,
        params: C::Params,
    ) -> Result<InstanceHandle> {
        let id = self.id;
        self.typed_mut::<C>(ty)?.create(id, resources, params)
    }

    pub(crate) fn add_to_update(&mut self, handle: InstanceHandle) -> Result<()> {
        self.table_mut(handle.type_index())?.add_to_update(handle)
    }

    /// Frees an instance immediately and releases its resources.
    pub(crate) fn destroy(&mut self, handle: InstanceHandle, resources: &Registry) -> Result<()> {
        let held = self.table_mut(handle.type_index())?.destroy(handle)?;
        component::release_all(resources, held);
        self.doomed.shift_remove(&handle);
        Ok(())
    }

    /// Destroys every remaining instance.
    pub(crate) fn destroy_all(&mut self, resources: &Registry) -> usize {
        let handles: Vec<_> = self.tables.iter().flat_map(|table| table.handles()).collect();
        for &handle in &handles {
            if let Err(err) = self.destroy(handle, resources) {
                log::error!("Cannot destroy {handle:?} of {}: {err}", self.id);
            }
        }
        handles.len()
    }

    /// Tears down the per-type states. The world must have no live instances.
    pub(crate) fn delete(self) {
        debug_assert_eq!(self.live_count(), 0);
        for table in self.tables.into_iter().rev() {
            table.delete();
        }
        log::debug!("Deleted {}", self.id);
    }

    fn scope<'t>(
        id: WorldId,
        phase: Phase,
        shared: Shared<'t>,
        doomed: &'t mut IndexSet<InstanceHandle>,
    ) -> Scope<'t> {
        Scope {
            world: id,
            phase,
            frame: shared.frame,
            dt: shared.dt,
            resources: shared.resources,
            bus: shared.bus,
            doomed,
        }
    }

    /// Runs dispatch, update and render.
    pub(crate) fn run_frame(&mut self, shared: Shared<'_>, tracer: &impl Tracer) {
        self.dispatch(shared, tracer);
        self.flush(shared.resources);

        for phase in [Phase::Update, Phase::Render] {
            tracer.start_phase(self.id, phase);
            let Self { id, tables, doomed, .. } = self;
            let mut scope = Self::scope(*id, phase, shared, doomed);

            for &ty in shared.types.schedule() {
                let table = &mut tables[ty.0];
                let failures = match phase {
                    Phase::Update => table.update(&mut scope),
                    _ => table.render(&mut scope),
                };
                for (handle, err) in failures {
                    report(tracer, *id, phase, handle, table.type_name(), &err);
                }
            }

            tracer.end_phase(*id, phase);
            self.flush(shared.resources);
        }
    }

    fn dispatch(&mut self, shared: Shared<'_>, tracer: &impl Tracer) {
        tracer.start_phase(self.id, Phase::Dispatch);

        let messages = shared.bus.drain(self.id, shared.frame);
        let Self { id, tables, doomed, .. } = self;
        let mut scope = Self::scope(*id, Phase::Dispatch, shared, doomed);

        for message in &messages {
            match message.address() {
                &Address::Instance { instance, .. } => {
                    deliver(tables, &mut scope, instance, message, tracer);
                }
                Address::Broadcast { types, .. } => {
                    for &ty in types {
                        let targets = match tables.get(ty.0) {
                            Some(table) => table.added_handles(),
                            None => {
                                log::warn!("Broadcast {} to unregistered {ty:?}", message.id());
                                continue;
                            }
                        };
                        for target in targets {
                            deliver(tables, &mut scope, target, message, tracer);
                        }
                    }
                }
            }
        }

        tracer.end_phase(*id, Phase::Dispatch);
    }

    /// Frees instances destroyed from callbacks.
    fn flush(&mut self, resources: &Registry) {
        for handle in mem::take(&mut self.doomed) {
            if let Err(err) = self.destroy(handle, resources) {
                log::warn!("Cannot destroy {handle:?} of {}: {err}", self.id);
            }
        }
    }

    /// Calls the reload hooks of instances holding `resource`, in schedule order.
    pub(crate) fn reload(
        &mut self,
        shared: Shared<'_>,
        resource: resource::Handle,
        tracer: &impl Tracer,
    ) -> Vec<InstanceHandle> {
        tracer.start_phase(self.id, Phase::Reload);

        let mut reloaded = Vec::new();
        let Self { id, tables, doomed, .. } = self;
        let mut scope = Self::scope(*id, Phase::Reload, shared, doomed);

        for &ty in shared.types.schedule() {
            if !shared.types.get(ty).descriptor.supports_reload {
                continue;
            }
            for handle in tables[ty.0].on_reload(&mut scope, resource) {
                tracer.reload_instance(*id, handle);
                reloaded.push(handle);
            }
        }

        tracer.end_phase(*id, Phase::Reload);
        self.flush(shared.resources);
        reloaded
    }
}

fn mismatch<C: ComponentType>(ty: TypeIndex) -> Error {
    Error::InvalidHandle(format!("{ty:?} is not {}", std::any::type_name::<C>()))
}

fn deliver(
    tables: &mut [Box<dyn AnyTable>],
    scope: &mut Scope<'_>,
    target: InstanceHandle,
    message: &Message,
    tracer: &impl Tracer,
) {
    let table = match tables.get_mut(target.type_index().0) {
        Some(table) if !scope.doomed.contains(&target) => table,
        _ => {
            tracer.skip_message(scope.world, message.id(), target);
            return;
        }
    };

    match table.on_message(scope, target, message) {
        None => {
            log::trace!("Message {} to {target:?} has no receiver", message.id());
            tracer.skip_message(scope.world, message.id(), target);
        }
        Some(Ok(())) => {}
        Some(Err(err)) => report(tracer, scope.world, Phase::Dispatch, target, table.type_name(), &err),
    }
}

fn report(
    tracer: &impl Tracer,
    world: WorldId,
    phase: Phase,
    instance: InstanceHandle,
    type_name: &str,
    error: &Error,
) {
    log::warn!("{type_name} instance {instance:?} of {world} failed during {phase:?}: {error}");
    tracer.instance_failed(world, phase, instance, type_name, error);
}
