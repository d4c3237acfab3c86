use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use bitvec::prelude::BitVec;
use indexmap::IndexSet;

use super::{ComponentType, Context, CreateContext, InstanceHandle, NewWorldContext, TypeIndex};
use crate::message::{Message, MessageBus};
use crate::resource::{self, Registry};
use crate::tracer::Phase;
use crate::world::WorldId;
use crate::{Error, Result};

/// The world-level borrows needed to build a [`Context`].
pub(crate) struct Scope<'t> {
    pub(crate) world:     WorldId,
    pub(crate) phase:     Phase,
    pub(crate) frame:     u64,
    pub(crate) dt:        f32,
    pub(crate) resources: &'t Registry,
    pub(crate) bus:       &'t MessageBus,
    pub(crate) doomed:    &'t mut IndexSet<InstanceHandle>,
}

impl<'t> Scope<'t> {
    fn context(&mut self, instance: InstanceHandle) -> Context<'_> {
        Context {
            world: self.world,
            phase: self.phase,
            frame: self.frame,
            dt: self.dt,
            instance,
            resources: self.resources,
            bus: self.bus,
            doomed: &mut *self.doomed,
        }
    }
}

/// Object-safe access to the instance table of one component type in one world.
pub(crate) trait AnyTable: Send {
    fn type_name(&self) -> &str;

    fn live_count(&self) -> usize;

    fn contains(&self, handle: InstanceHandle) -> bool;

    fn is_added(&self, handle: InstanceHandle) -> bool;

    /// Makes an instance eligible for scheduling. Adding twice is a no-op.
    fn add_to_update(&mut self, handle: InstanceHandle) -> Result<()>;

    /// Frees an instance and returns the resource handles it held.
    fn destroy(&mut self, handle: InstanceHandle) -> Result<Vec<resource::Handle>>;

    /// Runs `update` on every added instance, returning the failures.
    fn update(&mut self, scope: &mut Scope<'_>) -> Vec<(InstanceHandle, Error)>;

    /// Runs `render` on every added instance that has not failed in this frame.
    fn render(&mut self, scope: &mut Scope<'_>) -> Vec<(InstanceHandle, Error)>;

    /// Delivers a message to a live instance.
    /// Returns `None` if the instance does not exist.
    fn on_message(
        &mut self,
        scope: &mut Scope<'_>,
        handle: InstanceHandle,
        message: &Message,
    ) -> Option<Result<()>>;

    /// Calls `on_reload` on every live instance holding `resource`.
    fn on_reload(&mut self, scope: &mut Scope<'_>, resource: resource::Handle) -> Vec<InstanceHandle>;

    fn added_handles(&self) -> Vec<InstanceHandle>;

    fn handles(&self) -> Vec<InstanceHandle>;

    /// Tears down the per-world state.
    fn delete(self: Box<Self>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<C: ComponentType> {
    generation: u32,
    instance:   Option<Instance<C>>,
}

struct Instance<C: ComponentType> {
    state:        C::Instance,
    resources:    Vec<resource::Handle>,
    /// The last frame in which a callback of this instance failed.
    failed_frame: Option<u64>,
}

/// The instances of one component type in one world.
pub(crate) struct Table<C: ComponentType> {
    ty:       Arc<C>,
    name:     String,
    world:    WorldId,
    index:    TypeIndex,
    state:    C::World,
    slots:    Vec<Slot<C>>,
    /// Bit `i` is set if the instance in slot `i` is live and added to scheduling.
    added:    BitVec,
    free:     BTreeSet<u32>,
    capacity: usize,
    live:     usize,
}

impl<C: ComponentType> Table<C> {
    pub(crate) fn new(
        ty: Arc<C>,
        index: TypeIndex,
        name: &str,
        ctx: &NewWorldContext<'_>,
    ) -> Result<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(ctx.capacity).map_err(|_| Error::OutOfResources {
            what:     format!("instance table of {name} in {}", ctx.world),
            capacity: ctx.capacity,
        })?;

        let state = ty.new_world(ctx)?;

        Ok(Self {
            ty,
            name: name.to_string(),
            world: ctx.world,
            index,
            state,
            slots,
            added: BitVec::new(),
            free: BTreeSet::new(),
            capacity: ctx.capacity,
            live: 0,
        })
    }

    /// Creates an instance, releasing any resources it acquired if the callback fails.
    pub(crate) fn create(
        &mut self,
        world: WorldId,
        resources: &Registry,
        params: C::Params,
    ) -> Result<InstanceHandle> {
        if self.live >= self.capacity {
            return Err(Error::OutOfResources {
                what:     format!("instance table of {} in {world}", self.name),
                capacity: self.capacity,
            });
        }

        let mut ctx = CreateContext { world, resources, acquired: Vec::new() };
        let state = match self.ty.create(&mut ctx, &mut self.state, params) {
            Ok(state) => state,
            Err(err) => {
                release_all(resources, ctx.acquired);
                return Err(match err {
                    err @ Error::CreateFailed { .. } => err,
                    err => Error::CreateFailed { type_name: self.name.clone(), reason: err.to_string() },
                });
            }
        };

        let index = match self.free.pop_first() {
            Some(index) => index,
            None => {
                self.slots.push(Slot { generation: 0, instance: None });
                u32::try_from(self.slots.len() - 1).expect("too many instance slots")
            }
        };
        if self.added.len() <= index as usize {
            self.added.resize(index as usize + 1, false);
        }

        let slot = self.slots.get_mut(index as usize).expect("index was just allocated");
        slot.instance = Some(Instance { state, resources: ctx.acquired, failed_frame: None });
        self.live += 1;

        let handle =
            InstanceHandle { world: self.world, ty: self.index, index, generation: slot.generation };
        log::debug!("Created {} instance {handle:?} in {world}", self.name);
        Ok(handle)
    }

    fn locate(&self, handle: InstanceHandle) -> Result<usize> {
        let index = handle.index as usize;
        match self.slots.get(index) {
            Some(slot)
                if handle.world == self.world
                    && handle.ty == self.index
                    && slot.generation == handle.generation
                    && slot.instance.is_some() =>
            {
                Ok(index)
            }
            _ => Err(Error::InvalidHandle(format!("{handle:?} is not a live {} instance", self.name))),
        }
    }

    fn instance(&self, handle: InstanceHandle) -> Result<&Instance<C>> {
        let index = self.locate(handle)?;
        Ok(self.slots[index].instance.as_ref().expect("located slot is occupied"))
    }

    pub(crate) fn get(&self, handle: InstanceHandle) -> Result<&C::Instance> {
        Ok(&self.instance(handle)?.state)
    }

    pub(crate) fn get_mut(&mut self, handle: InstanceHandle) -> Result<&mut C::Instance> {
        let index = self.locate(handle)?;
        Ok(&mut self.slots[index].instance.as_mut().expect("located slot is occupied").state)
    }

    pub(crate) fn state(&self) -> &C::World { &self.state }

    pub(crate) fn state_mut(&mut self) -> &mut C::World { &mut self.state }

    /// Calls `f` on each added instance that is neither doomed nor failed in this frame.
    fn each_added(
        &mut self,
        scope: &mut Scope<'_>,
        mut f: impl FnMut(&C, &mut Context<'_>, &mut C::World, &mut C::Instance) -> Result<()>,
    ) -> Vec<(InstanceHandle, Error)> {
        let Self { ty, world, index: ty_index, state, slots, added, .. } = self;
        let frame = scope.frame;
        let mut failures = Vec::new();

        for index in added.iter_ones() {
            let slot = &mut slots[index];
            let handle = InstanceHandle {
                world:      *world,
                ty:         *ty_index,
                index:      index as u32,
                generation: slot.generation,
            };
            if scope.doomed.contains(&handle) {
                continue;
            }
            let instance = match slot.instance.as_mut() {
                Some(instance) if instance.failed_frame != Some(frame) => instance,
                _ => continue,
            };

            let mut ctx = scope.context(handle);
            if let Err(err) = f(&**ty, &mut ctx, &mut *state, &mut instance.state) {
                instance.failed_frame = Some(frame);
                failures.push((handle, err));
            }
        }

        failures
    }
}

pub(crate) fn release_all(resources: &Registry, handles: Vec<resource::Handle>) {
    for handle in handles {
        if let Err(err) = resources.release(handle) {
            log::error!("Cannot release {handle:?}: {err}");
        }
    }
}

impl<C: ComponentType> AnyTable for Table<C> {
    fn type_name(&self) -> &str { &self.name }

    fn live_count(&self) -> usize { self.live }

    fn contains(&self, handle: InstanceHandle) -> bool { self.locate(handle).is_ok() }

    fn is_added(&self, handle: InstanceHandle) -> bool {
        match self.locate(handle) {
            Ok(index) => self.added[index],
            Err(_) => false,
        }
    }

    fn add_to_update(&mut self, handle: InstanceHandle) -> Result<()> {
        let index = self.locate(handle)?;
        if self.added[index] {
            return Ok(());
        }

        let instance = self.slots[index].instance.as_mut().expect("located slot is occupied");
        self.ty.add_to_update(&mut self.state, &mut instance.state)?;
        self.added.set(index, true);
        Ok(())
    }

    fn destroy(&mut self, handle: InstanceHandle) -> Result<Vec<resource::Handle>> {
        let index = self.locate(handle)?;

        let slot = &mut self.slots[index];
        let instance = slot.instance.take().expect("located slot is occupied");
        slot.generation = slot.generation.wrapping_add(1);
        self.added.set(index, false);
        self.free.insert(handle.index);
        self.live -= 1;

        log::debug!("Destroying {} instance {handle:?}", self.name);
        self.ty.destroy(&mut self.state, instance.state);
        Ok(instance.resources)
    }

    fn update(&mut self, scope: &mut Scope<'_>) -> Vec<(InstanceHandle, Error)> {
        self.each_added(scope, |ty, ctx, world, instance| ty.update(ctx, world, instance))
    }

    fn render(&mut self, scope: &mut Scope<'_>) -> Vec<(InstanceHandle, Error)> {
        self.each_added(scope, |ty, ctx, world, instance| ty.render(ctx, world, instance))
    }

    fn on_message(
        &mut self,
        scope: &mut Scope<'_>,
        handle: InstanceHandle,
        message: &Message,
    ) -> Option<Result<()>> {
        let index = self.locate(handle).ok()?;
        let Self { ty, state, slots, .. } = self;
        let instance = slots[index].instance.as_mut()?;

        let mut ctx = scope.context(handle);
        Some(ty.on_message(&mut ctx, state, &mut instance.state, message))
    }

    fn on_reload(&mut self, scope: &mut Scope<'_>, resource: resource::Handle) -> Vec<InstanceHandle> {
        let Self { ty, world, index: ty_index, state, slots, .. } = self;
        let mut reloaded = Vec::new();

        for (index, slot) in slots.iter_mut().enumerate() {
            let handle = InstanceHandle {
                world:      *world,
                ty:         *ty_index,
                index:      index as u32,
                generation: slot.generation,
            };
            let instance = match slot.instance.as_mut() {
                Some(instance) if instance.resources.contains(&resource) => instance,
                _ => continue,
            };
            if scope.doomed.contains(&handle) {
                continue;
            }

            let mut ctx = scope.context(handle);
            ty.on_reload(&mut ctx, state, &mut instance.state, resource);
            reloaded.push(handle);
        }

        reloaded
    }

    fn added_handles(&self) -> Vec<InstanceHandle> {
        self.added
            .iter_ones()
            .map(|index| InstanceHandle {
                world:      self.world,
                ty:         self.index,
                index:      index as u32,
                generation: self.slots[index].generation,
            })
            .collect()
    }

    fn handles(&self) -> Vec<InstanceHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.instance.is_some())
            .map(|(index, slot)| InstanceHandle {
                world:      self.world,
                ty:         self.index,
                index:      index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    fn delete(self: Box<Self>) {
        let Self { ty, name, state, live, .. } = *self;
        debug_assert_eq!(live, 0, "{name} table deleted with live instances");
        ty.delete_world(state);
    }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
