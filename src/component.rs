//! Component types and their per-world instances.
//!
//! A component type implements [`ComponentType`] and is registered once on the
//! [`Builder`](crate::engine::Builder) together with a [`Descriptor`].
//! Every [`World`](crate::World) then owns one instance table per registered type,
//! holding the per-world state returned by [`ComponentType::new_world`]
//! and the instances returned by [`ComponentType::create`].
//!
//! # Instance lifecycle
//! 1. [`Engine::create`](crate::Engine::create) allocates the instance.
//!    Resources loaded through [`CreateContext::load`] are bound to it.
//!    If creation fails, they are released again and no instance is registered.
//! 2. [`Engine::add_to_update`](crate::Engine::add_to_update) makes the instance eligible
//!    for update and render. Until then it only receives direct messages.
//! 3. [`Engine::destroy`](crate::Engine::destroy) (or [`Context::destroy`] from a callback)
//!    removes the instance from scheduling and releases its resources.

use std::fmt;

use indexmap::IndexSet;

use crate::message::{Message, MessageBus, Timing};
use crate::resource::{self, Registry};
use crate::tracer::Phase;
use crate::world::WorldId;
use crate::Result;

mod registry;
pub use registry::TypeIndex;
pub(crate) use registry::Types;

mod table;
pub(crate) use table::{release_all, AnyTable, Scope, Table};

/// The callback set of a component type.
///
/// Callbacks are synchronous.
/// All callbacks of one world run on one thread at a time,
/// but different worlds may run on different threads.
pub trait ComponentType: Send + Sync + 'static {
    /// The state of this type shared by all its instances in one world.
    type World: Send + 'static;
    /// The state of one instance.
    type Instance: Send + 'static;
    /// The parameters passed to [`Engine::create`](crate::Engine::create).
    type Params;

    /// Initializes the per-world state when a world is created.
    fn new_world(&self, ctx: &NewWorldContext<'_>) -> Result<Self::World>;

    /// Tears down the per-world state. All instances have been destroyed at this point.
    fn delete_world(&self, world: Self::World) { drop(world) }

    /// Creates an instance.
    ///
    /// Any resources loaded through `ctx` are released if this returns an error.
    fn create(
        &self,
        ctx: &mut CreateContext<'_>,
        world: &mut Self::World,
        params: Self::Params,
    ) -> Result<Self::Instance>;

    /// Frees an instance. Its resources are released by the engine afterwards.
    #[allow(unused_variables)]
    fn destroy(&self, world: &mut Self::World, instance: Self::Instance) {}

    /// Called once when the instance is added to scheduling.
    /// If this fails, the instance stays inert.
    #[allow(unused_variables)]
    fn add_to_update(&self, world: &mut Self::World, instance: &mut Self::Instance) -> Result<()> {
        Ok(())
    }

    /// Advances an added instance by one frame.
    #[allow(unused_variables)]
    fn update(
        &self,
        ctx: &mut Context<'_>,
        world: &mut Self::World,
        instance: &mut Self::Instance,
    ) -> Result<()> {
        Ok(())
    }

    /// Renders an added instance after all types have been updated.
    #[allow(unused_variables)]
    fn render(
        &self,
        ctx: &mut Context<'_>,
        world: &mut Self::World,
        instance: &Self::Instance,
    ) -> Result<()> {
        Ok(())
    }

    /// Handles a message addressed to the instance.
    #[allow(unused_variables)]
    fn on_message(
        &self,
        ctx: &mut Context<'_>,
        world: &mut Self::World,
        instance: &mut Self::Instance,
        message: &Message,
    ) -> Result<()> {
        Ok(())
    }

    /// Re-derives cached state after `resource` was recreated.
    ///
    /// Only called if the descriptor enables [`supports_reload`](Descriptor::supports_reload),
    /// and only for instances that loaded `resource` during creation.
    #[allow(unused_variables)]
    fn on_reload(
        &self,
        ctx: &mut Context<'_>,
        world: &mut Self::World,
        instance: &mut Self::Instance,
        resource: resource::Handle,
    ) {
    }
}

/// The registration record of a component type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// The unique name of the type, also used as the key of
    /// [`Config::type_capacity`](crate::Config::type_capacity).
    pub name:            String,
    /// Types with lower priority are updated and rendered first.
    /// Ties are broken by registration order.
    pub update_priority: i32,
    /// Whether [`ComponentType::on_reload`] is called.
    pub supports_reload: bool,
}

impl Descriptor {
    /// Creates a descriptor with priority 0 and reloading disabled.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), update_priority: 0, supports_reload: false }
    }

    /// Sets the update priority.
    pub fn priority(mut self, update_priority: i32) -> Self {
        self.update_priority = update_priority;
        self
    }

    /// Sets whether reload hooks are called.
    pub fn reload(mut self, supports_reload: bool) -> Self {
        self.supports_reload = supports_reload;
        self
    }
}

/// A handle to a component instance within its world.
///
/// Handles are generation-checked,
/// so a handle to a destroyed instance never resolves to an instance created later.
/// A handle only resolves in the world that created it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceHandle {
    world:      WorldId,
    ty:         TypeIndex,
    index:      u32,
    generation: u32,
}

impl InstanceHandle {
    /// The world owning the instance.
    pub fn world(self) -> WorldId { self.world }

    /// The component type of the instance.
    pub fn type_index(self) -> TypeIndex { self.ty }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{:?}#{}v{}", self.world, self.ty, self.index, self.generation)
    }
}

/// Passed to [`ComponentType::new_world`].
pub struct NewWorldContext<'t> {
    pub(crate) world:    WorldId,
    pub(crate) scene:    &'t str,
    pub(crate) capacity: usize,
}

impl<'t> NewWorldContext<'t> {
    /// The world being created.
    pub fn world(&self) -> WorldId { self.world }

    /// The scene the world was created for.
    pub fn scene(&self) -> &'t str { self.scene }

    /// The maximum number of live instances of this type in the world.
    pub fn capacity(&self) -> usize { self.capacity }
}

/// Passed to [`ComponentType::create`].
pub struct CreateContext<'t> {
    world:     WorldId,
    resources: &'t Registry,
    acquired:  Vec<resource::Handle>,
}

impl<'t> CreateContext<'t> {
    /// The world the instance is created in.
    pub fn world(&self) -> WorldId { self.world }

    /// Loads a resource and binds it to the new instance.
    ///
    /// The handle is released when the instance is destroyed
    /// or when creation fails.
    pub fn load(&mut self, path: &str) -> Result<resource::Handle> {
        let handle = self.resources.load(path)?;
        self.acquired.push(handle);
        Ok(handle)
    }

    /// Binds an additional reference of an already resident resource to the new instance.
    pub fn retain(&mut self, handle: resource::Handle) -> Result<()> {
        self.resources.retain(handle)?;
        self.acquired.push(handle);
        Ok(())
    }

    /// Read access to the resource registry.
    pub fn resources(&self) -> &'t Registry { self.resources }
}

/// Passed to the per-frame callbacks of a [`ComponentType`].
pub struct Context<'t> {
    world:     WorldId,
    phase:     Phase,
    frame:     u64,
    dt:        f32,
    instance:  InstanceHandle,
    resources: &'t Registry,
    bus:       &'t MessageBus,
    doomed:    &'t mut IndexSet<InstanceHandle>,
}

impl<'t> Context<'t> {
    /// The world of the instance.
    pub fn world(&self) -> WorldId { self.world }

    /// The instance receiving the callback.
    pub fn instance(&self) -> InstanceHandle { self.instance }

    /// The phase the callback runs in.
    pub fn phase(&self) -> Phase { self.phase }

    /// The number of the current frame, starting from 1.
    pub fn frame(&self) -> u64 { self.frame }

    /// The time step passed to [`Engine::tick`](crate::Engine::tick).
    pub fn dt(&self) -> f32 { self.dt }

    /// Read access to the resource registry.
    pub fn resources(&self) -> &'t Registry { self.resources }

    /// Posts a message with this instance as the sender.
    ///
    /// Messages posted during dispatch are deferred to the next frame.
    pub fn post(&self, mut message: Message) -> Result<()> {
        message.sender = Some(self.instance);
        message.timing = match self.phase {
            Phase::Dispatch => Timing::Deferred,
            _ => Timing::Immediate,
        };
        self.bus.post(message)
    }

    /// Destroys an instance of the same world.
    ///
    /// The instance receives no further callbacks.
    /// It is freed when the current phase ends.
    /// Handles of other worlds are ignored.
    pub fn destroy(&mut self, handle: InstanceHandle) {
        if handle.world != self.world {
            log::warn!("{:?} cannot destroy {handle:?} of another world", self.instance);
            return;
        }
        if self.doomed.insert(handle) {
            log::debug!("{:?} requested destruction of {handle:?} in {}", self.instance, self.world);
        }
    }

    /// Returns whether `handle` has been destroyed during the current phase.
    pub fn is_doomed(&self, handle: InstanceHandle) -> bool { self.doomed.contains(&handle) }
}
