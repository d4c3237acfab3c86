//! Messages between component instances and from external producers.
//!
//! Messages are queued per world on the [`MessageBus`]
//! and delivered to [`ComponentType::on_message`](crate::ComponentType::on_message)
//! during the dispatch phase of the target world, in the order they were posted.

use std::any::Any;
use std::fmt;

use crate::component::{InstanceHandle, TypeIndex};
use crate::world::WorldId;
use crate::Identity;

mod bus;
pub use bus::MessageBus;

/// The receivers of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// One instance, added to scheduling or not.
    Instance {
        /// The world of the instance.
        world:    WorldId,
        /// The receiving instance.
        instance: InstanceHandle,
    },
    /// Every live instance of the listed types that was added to scheduling.
    Broadcast {
        /// The receiving world.
        world: WorldId,
        /// The receiving component types.
        types: Vec<TypeIndex>,
    },
}

impl Address {
    /// Addresses a single instance.
    pub fn instance(world: WorldId, instance: InstanceHandle) -> Self {
        Self::Instance { world, instance }
    }

    /// Addresses all added instances of `types` in `world`.
    pub fn broadcast(world: WorldId, types: impl IntoIterator<Item = TypeIndex>) -> Self {
        Self::Broadcast { world, types: types.into_iter().collect() }
    }

    /// The world the message is queued for.
    pub fn world(&self) -> WorldId {
        match *self {
            Self::Instance { world, .. } | Self::Broadcast { world, .. } => world,
        }
    }
}

/// When a message becomes deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    /// Delivered at the next dispatch phase of the target world.
    Immediate,
    /// Posted during a dispatch phase;
    /// delivered no earlier than the dispatch phase of the next frame.
    Deferred,
}

/// A typed message.
pub struct Message {
    address:                 Address,
    pub(crate) sender:       Option<InstanceHandle>,
    id:                      Identity,
    data:                    Box<dyn Any + Send>,
    pub(crate) timing:       Timing,
    pub(crate) posted_frame: u64,
}

impl Message {
    /// Creates a message of kind `id` carrying `data`.
    pub fn new(address: Address, id: Identity, data: impl Any + Send) -> Self {
        Self {
            address,
            sender: None,
            id,
            data: Box::new(data),
            timing: Timing::Immediate,
            posted_frame: 0,
        }
    }

    /// Creates a message whose kind is the identity of `name`.
    pub fn named(address: Address, name: &str, data: impl Any + Send) -> Self {
        Self::new(address, Identity::of(name), data)
    }

    /// Sets the sender reported to the receiver.
    pub fn with_sender(mut self, sender: InstanceHandle) -> Self {
        self.sender = Some(sender);
        self
    }

    /// The receivers.
    pub fn address(&self) -> &Address { &self.address }

    /// The posting instance, if any.
    pub fn sender(&self) -> Option<InstanceHandle> { self.sender }

    /// The message kind.
    pub fn id(&self) -> Identity { self.id }

    /// Whether the message kind is the identity of `name`.
    pub fn is(&self, name: &str) -> bool { self.id == Identity::of(name) }

    /// The timing the message was posted with.
    pub fn timing(&self) -> Timing { self.timing }

    /// The frame during which the message was posted.
    pub fn posted_frame(&self) -> u64 { self.posted_frame }

    /// The payload, if it is a `T`.
    pub fn data<T: Any>(&self) -> Option<&T> { self.data.downcast_ref() }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Message")
            .field("address", &self.address)
            .field("sender", &self.sender)
            .field("id", &self.id)
            .field("timing", &self.timing)
            .field("posted_frame", &self.posted_frame)
            .finish_non_exhaustive()
    }
}
