//! A runtime for pluggable component types driven frame by frame.
//!
//! scenery lets independently developed component types
//! (renderable effects, physics bodies, scripts, sound emitters...)
//! plug into a shared per-scene execution pipeline without knowing about each other.
//!
//! # Concepts
//! - A **component type** implements [`ComponentType`],
//!   a fixed set of lifecycle callbacks selected by registration.
//! - A **world** holds the instances of every component type for one scene.
//!   Worlds never share instance state, so they can run in parallel.
//! - A **resource** is shared, reference-counted data
//!   built by a [`resource::Factory`] from raw bytes.
//!   Instances hold [`resource::Handle`]s, never references,
//!   so a resource can be recreated in place when its file changes.
//! - A **message** is delivered to an instance during the dispatch phase of its world.
//!
//! # Frames
//! [`Engine::tick`] first applies pending reloads,
//! then runs three phases in every world:
//!
//! 1. **Dispatch** delivers pending messages in the order they were posted.
//!    Messages posted during dispatch are deferred to the next frame,
//!    so message cascades advance by at most one hop per frame.
//! 2. **Update** runs on every added instance,
//!    type by type in ascending [`Descriptor::update_priority`].
//! 3. **Render** runs in the same order after all updates have completed.
//!
//! A failing callback is logged and reported to the [`Tracer`];
//! the instance is skipped for the rest of the frame and everything else continues.
//!
//! # Example
//! ```
//! use scenery::resource::MemoryFetch;
//! use scenery::{ComponentType, Config, CreateContext, Descriptor, Engine, NewWorldContext};
//!
//! struct Spinner;
//!
//! impl ComponentType for Spinner {
//!     type World = ();
//!     type Instance = f32;
//!     type Params = f32;
//!
//!     fn new_world(&self, _: &NewWorldContext<'_>) -> scenery::Result<()> { Ok(()) }
//!
//!     fn create(
//!         &self,
//!         _: &mut CreateContext<'_>,
//!         _: &mut (),
//!         speed: f32,
//!     ) -> scenery::Result<f32> {
//!         Ok(speed)
//!     }
//! }
//!
//! let mut builder = Engine::builder(Config::default(), MemoryFetch::new());
//! builder.register(Descriptor::new("spinner"), Spinner);
//! let mut engine = builder.build();
//!
//! let world = engine.new_world("main").unwrap();
//! let spinner = engine.create::<Spinner>(world, 2.0).unwrap();
//! engine.add_to_update(world, spinner).unwrap();
//! engine.tick(1.0 / 60.0, &scenery::tracer::Noop);
//!
//! engine.destroy(world, spinner).unwrap();
//! engine.delete_world(world).unwrap();
//! ```

#![cfg_attr(doc, warn(missing_docs))]

pub mod tracer;
pub use tracer::{Phase, Tracer};

pub mod component;
pub use component::{
    ComponentType, Context, CreateContext, Descriptor, InstanceHandle, NewWorldContext, TypeIndex,
};

pub mod config;
pub use config::Config;

pub mod engine;
pub use engine::Engine;

mod error;
pub use error::{Error, FactoryError, Result};

pub mod identity;
pub use identity::Identity;

pub mod message;
pub use message::{Address, Message};

pub mod resource;

#[cfg(test)]
pub mod test_util;

pub mod world;
pub use world::{World, WorldId};
