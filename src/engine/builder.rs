use std::sync::Arc;

use super::{Engine, Executor, ReloadQueue};
use crate::component::{ComponentType, Descriptor, TypeIndex, Types};
use crate::message::MessageBus;
use crate::resource::{Factory, Fetch, Registry};
use crate::Config;

/// This type is used to build an engine.
/// No more types can be registered after the builder is built.
pub struct Builder {
    config:    Config,
    types:     Types,
    resources: Registry,
}

impl Builder {
    pub(super) fn new(config: Config, fetch: impl Fetch + 'static) -> Self {
        let resources = Registry::new(fetch, config.max_resources);
        Self { config, types: Types::default(), resources }
    }

    /// Registers a component type.
    ///
    /// Its instance capacity is looked up in [`Config::type_capacity`] by descriptor name.
    ///
    /// # Panics
    /// Panics if the type or its name is already registered.
    pub fn register<C: ComponentType>(&mut self, descriptor: Descriptor, ty: C) -> TypeIndex {
        let capacity = self.config.capacity_of(&descriptor.name);
        self.types.register(descriptor, ty, capacity)
    }

    /// Registers the factory of resources with the file extension `extension`.
    ///
    /// # Panics
    /// Panics if the extension already has a factory.
    pub fn resource_type<F: Factory>(&mut self, extension: &str, factory: F) {
        self.resources.register_type(extension, factory);
    }

    /// Builds the engine.
    pub fn build(self) -> Engine {
        let Self { config, types, resources } = self;

        log::debug!(
            "Building engine with {} component types and {} worker threads",
            types.len(),
            config.concurrency
        );

        Engine {
            executor: Executor::new(config.concurrency),
            bus: Arc::new(MessageBus::new(config.message_capacity)),
            resources: Arc::new(resources),
            reloads: Arc::new(ReloadQueue::default()),
            types,
            worlds: Vec::new(),
            next_world: 0,
            frame: 0,
            config,
        }
    }
}
