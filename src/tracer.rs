//! Exposes testing, profiling and tracing capabilities.
//!
//! The scheduler reports every frame, phase, isolated failure and reload
//! to a [`Tracer`] passed to [`Engine::tick`](crate::Engine::tick).
//! All methods default to no-ops, so implementors only override the events they need.

use crate::component::InstanceHandle;
use crate::world::WorldId;
use crate::{Error, Identity};

/// Defines the [`Tracer`] trait and implements it for [`Log`] and [`Aggregate`].
///
/// All tracer method parameters must be [`Copy`]
/// (shared references are [`Copy`]).
///
/// Use the `{@LOG_WITH = transformer}` syntax to transform an argument for log printing,
/// where `transformer` is an invokable that accepts the argument
/// and returns any [`fmt::Debug`](std::fmt::Debug) type.
macro_rules! define_tracer {
    (
        $(
            $(#[$meta:meta])*
            fn $name:ident(
                &self
                $(,$arg_ident:ident: $arg_ty:ty $({@LOG_WITH = $log_with:expr})?)*
                $(,)?
            );
        )*
    ) => {
        /// A tracer used for recording the events throughout a frame.
        ///
        /// Can be used for profiling and testing.
        pub trait Tracer: Sync {
            $(
                $(#[$meta])*
                #[allow(unused_variables)]
                fn $name(&self, $($arg_ident: $arg_ty,)*) {}
            )*
        }

        impl Tracer for Log {
            $(
                fn $name(&self, $($arg_ident: $arg_ty,)*) {
                    log::log!(self.0, concat!(stringify!($name), "(", $(
                        stringify!($arg_ident),
                        " = {",
                        stringify!($arg_ident),
                        ":?}, ",
                    )* ")"), $(
                        $arg_ident = define_tracer!(@LOG_EXPR $arg_ident $(@LOG_WITH = $log_with)?),
                    )*);
                }
            )*
        }

        impl<'t> Tracer for Aggregate<'t> {
            $(
                fn $name(&self, $($arg_ident: $arg_ty,)*) {
                    for tracer in self.0 {
                        tracer.$name($($arg_ident,)*);
                    }
                }
            )*
        }
    };

    (@LOG_EXPR $ident:ident) => { $ident };
    (@LOG_EXPR $ident:ident @LOG_WITH = $closure:expr) => { ($closure)($ident) }
}

define_tracer! {
    /// A frame starts. Reloads queued before the frame have already been applied.
    fn start_frame(&self, frame: u64, dt: f32);

    /// A frame ends. All worlds have completed their render phase.
    fn end_frame(&self, frame: u64);

    /// A world enters a phase.
    fn start_phase(&self, world: WorldId, phase: Phase);

    /// A world leaves a phase.
    fn end_phase(&self, world: WorldId, phase: Phase);

    /// A callback of a component instance failed.
    /// If `phase` is [`Phase::Update`] or [`Phase::Render`],
    /// the instance is skipped for the rest of the frame.
    fn instance_failed(
        &self,
        world: WorldId,
        phase: Phase,
        instance: InstanceHandle,
        type_name: &str,
        error: &Error {@LOG_WITH = |error: &Error| error.to_string()},
    );

    /// A message was not delivered because its target no longer exists.
    fn skip_message(&self, world: WorldId, message: Identity, target: InstanceHandle);

    /// A resource was recreated from fresh data.
    fn reload_resource(&self, identity: Identity, success: bool);

    /// The reload hook of an instance holding a reloaded resource was called.
    fn reload_instance(&self, world: WorldId, instance: InstanceHandle);
}

/// The stage of the engine in which a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Pending messages are delivered to `on_message`.
    Dispatch,
    /// `update` runs for every added instance.
    Update,
    /// `render` runs for every added instance.
    Render,
    /// `on_reload` runs for instances holding a reloaded resource.
    /// This happens between frames.
    Reload,
}

/// An empty tracer.
pub struct Noop;

impl Tracer for Noop {}

/// Dispatches each call to every child tracer in order.
pub struct Aggregate<'t>(
    /// The child tracers.
    pub &'t [&'t dyn Tracer],
);

/// A tracer that logs all events.
pub struct Log(
    /// The log level to log events with.
    pub log::Level,
);
