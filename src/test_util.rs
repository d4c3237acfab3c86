#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, Once};

use crate::component::{Context, CreateContext, NewWorldContext};
use crate::error::FactoryError;
use crate::message::{Address, Message};
use crate::resource::{self, Factory, MemoryFetch};
use crate::tracer::{Phase, Tracer};
use crate::world::WorldId;
use crate::{ComponentType, Config, Descriptor, Engine, Error, Identity, InstanceHandle, Result};

/// Initializes the logger for the current test binary.
pub fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// An ordered record of lifecycle callbacks, one line per call.
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn record(&self, line: impl Into<String>) { self.0.lock().push(line.into()); }

    pub fn lines(&self) -> Vec<String> { self.0.lock().clone() }

    /// Returns and clears the recorded lines.
    pub fn take(&self) -> Vec<String> { std::mem::take(&mut *self.0.lock()) }

    /// Counts the lines starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|line| line.starts_with(prefix)).count()
    }

    /// Returns the position of the first line equal to `line`.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.0.lock().iter().position(|recorded| recorded == line)
    }
}

/// The payload of probe messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Recorded by the receiver.
    Note(String),
    /// The receiver replies to the sender with `Note("echo")`.
    Echo,
    /// The receiver posts `Note(text)` to the given address.
    Relay(Address, String),
    /// The receiver destroys the given instance of its world.
    Destroy(InstanceHandle),
    /// The receiver returns an error.
    Fail,
}

pub fn note(address: Address, text: &str) -> Message {
    Message::named(address, "note", Command::Note(text.to_string()))
}

#[derive(Debug, Default, Clone)]
pub struct ProbeParams {
    pub name:              String,
    pub resources:         Vec<String>,
    pub fail_create:       bool,
    pub fail_add:          bool,
    pub fail_update_at:    Option<u64>,
    pub fail_render:       bool,
    /// Destroyed by this instance during each update.
    pub destroy_on_update: Option<InstanceHandle>,
}

impl ProbeParams {
    pub fn named(name: &str) -> Self { Self { name: name.to_string(), ..Self::default() } }

    pub fn with_resource(mut self, path: &str) -> Self {
        self.resources.push(path.to_string());
        self
    }
}

#[derive(Debug)]
pub struct ProbeInstance {
    pub name:      String,
    pub resources: Vec<resource::Handle>,
    /// The text of the first resource, as seen by the last update or reload.
    pub observed:  Option<String>,
    params:        ProbeParams,
}

#[derive(Debug, Default)]
pub struct ProbeWorld {
    pub created: usize,
}

/// A component type that records every callback into a [`Journal`].
///
/// `N` distinguishes otherwise identical probe types.
pub struct Probe<const N: usize> {
    pub journal: Arc<Journal>,
}

fn first_text(ctx: &Context<'_>, instance: &ProbeInstance) -> Result<Option<String>> {
    match instance.resources.first() {
        Some(&handle) => Ok(Some(ctx.resources().get::<Prototype>(handle)?.text.clone())),
        None => Ok(None),
    }
}

impl<const N: usize> ComponentType for Probe<N> {
    type World = ProbeWorld;
    type Instance = ProbeInstance;
    type Params = ProbeParams;

    fn new_world(&self, ctx: &NewWorldContext<'_>) -> Result<ProbeWorld> {
        self.journal.record(format!("new_world:probe{N}:{}", ctx.world()));
        Ok(ProbeWorld::default())
    }

    fn delete_world(&self, world: ProbeWorld) {
        self.journal.record(format!("delete_world:probe{N}:{}", world.created));
    }

    fn create(
        &self,
        ctx: &mut CreateContext<'_>,
        world: &mut ProbeWorld,
        params: ProbeParams,
    ) -> Result<ProbeInstance> {
        let mut resources = Vec::new();
        for path in &params.resources {
            resources.push(ctx.load(path)?);
        }
        if params.fail_create {
            return Err(Error::component(format!("{} refused to be created", params.name)));
        }

        world.created += 1;
        self.journal.record(format!("create:{}", params.name));
        Ok(ProbeInstance { name: params.name.clone(), resources, observed: None, params })
    }

    fn destroy(&self, _: &mut ProbeWorld, instance: ProbeInstance) {
        self.journal.record(format!("destroy:{}", instance.name));
    }

    fn add_to_update(&self, _: &mut ProbeWorld, instance: &mut ProbeInstance) -> Result<()> {
        if instance.params.fail_add {
            return Err(Error::component("not ready"));
        }
        self.journal.record(format!("add:{}", instance.name));
        Ok(())
    }

    fn update(
        &self,
        ctx: &mut Context<'_>,
        _: &mut ProbeWorld,
        instance: &mut ProbeInstance,
    ) -> Result<()> {
        if instance.params.fail_update_at == Some(ctx.frame()) {
            return Err(Error::component("update failed"));
        }
        if let Some(target) = instance.params.destroy_on_update {
            ctx.destroy(target);
        }
        instance.observed = first_text(ctx, instance)?;
        self.journal.record(format!("update:{}@{}", instance.name, ctx.frame()));
        Ok(())
    }

    fn render(&self, ctx: &mut Context<'_>, _: &mut ProbeWorld, instance: &ProbeInstance) -> Result<()> {
        if instance.params.fail_render {
            return Err(Error::component("render failed"));
        }
        self.journal.record(format!("render:{}@{}", instance.name, ctx.frame()));
        Ok(())
    }

    fn on_message(
        &self,
        ctx: &mut Context<'_>,
        _: &mut ProbeWorld,
        instance: &mut ProbeInstance,
        message: &Message,
    ) -> Result<()> {
        let label = match message.data::<Command>() {
            Some(Command::Note(text)) => text.clone(),
            Some(Command::Echo) => {
                if let Some(sender) = message.sender() {
                    ctx.post(note(Address::instance(ctx.world(), sender), "echo"))?;
                }
                "echo".to_string()
            }
            Some(Command::Relay(address, text)) => {
                ctx.post(note(address.clone(), text))?;
                format!("relay {text}")
            }
            Some(&Command::Destroy(target)) => {
                ctx.destroy(target);
                format!("destroy {target:?}")
            }
            Some(Command::Fail) => return Err(Error::component("message refused")),
            None => format!("{}", message.id()),
        };
        self.journal.record(format!("message:{}@{}:{label}", instance.name, ctx.frame()));
        Ok(())
    }

    fn on_reload(
        &self,
        ctx: &mut Context<'_>,
        _: &mut ProbeWorld,
        instance: &mut ProbeInstance,
        _: resource::Handle,
    ) {
        match first_text(ctx, instance) {
            Ok(text) => instance.observed = text,
            Err(err) => log::error!("{} cannot read its resource: {err}", instance.name),
        }
        self.journal.record(format!("reload:{}", instance.name));
    }
}

/// The payload built by [`CountingFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Counters {
    pub created:   AtomicUsize,
    pub destroyed: AtomicUsize,
    pub recreated: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize { self.created.load(Ordering::SeqCst) }

    pub fn destroyed(&self) -> usize { self.destroyed.load(Ordering::SeqCst) }

    pub fn recreated(&self) -> usize { self.recreated.load(Ordering::SeqCst) }
}

/// A resource factory for UTF-8 text that counts its calls.
/// Data containing `corrupt` is rejected.
pub struct CountingFactory(pub Arc<Counters>);

fn parse(raw: &[u8]) -> Result<String, FactoryError> {
    let text = std::str::from_utf8(raw)?;
    if text.contains("corrupt") {
        return Err(format!("corrupt prototype: {text:?}").into());
    }
    Ok(text.to_string())
}

impl Factory for CountingFactory {
    type Payload = Prototype;

    fn create(&self, raw: &[u8]) -> Result<Prototype, FactoryError> {
        let text = parse(raw)?;
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(Prototype { text })
    }

    fn destroy(&self, _: Prototype) { self.0.destroyed.fetch_add(1, Ordering::SeqCst); }

    fn recreate(&self, payload: &mut Prototype, raw: &[u8]) -> Result<(), FactoryError> {
        payload.text = parse(raw)?;
        self.0.recreated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records tracer events as strings.
#[derive(Debug, Default)]
pub struct RecordingTracer(pub Mutex<Vec<String>>);

impl RecordingTracer {
    pub fn events(&self) -> Vec<String> { self.0.lock().clone() }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|event| event.starts_with(prefix)).count()
    }
}

impl Tracer for RecordingTracer {
    fn start_frame(&self, frame: u64, _: f32) { self.0.lock().push(format!("start_frame:{frame}")); }

    fn end_frame(&self, frame: u64) { self.0.lock().push(format!("end_frame:{frame}")); }

    fn instance_failed(
        &self,
        _: WorldId,
        phase: Phase,
        instance: InstanceHandle,
        type_name: &str,
        _: &Error,
    ) {
        self.0.lock().push(format!("failed:{type_name}:{phase:?}:{instance:?}"));
    }

    fn skip_message(&self, _: WorldId, message: Identity, target: InstanceHandle) {
        self.0.lock().push(format!("skip_message:{message}:{target:?}"));
    }

    fn reload_resource(&self, _: Identity, success: bool) {
        self.0.lock().push(format!("reload_resource:{success}"));
    }

    fn reload_instance(&self, world: WorldId, instance: InstanceHandle) {
        self.0.lock().push(format!("reload_instance:{world}:{instance:?}"));
    }
}

/// An engine with three probe types and a `.proto` resource type
/// backed by a mutable in-memory file table.
///
/// | type | name | priority | reload |
/// |---|---|---|---|
/// | `Probe<0>` | `late` | 10 | yes |
/// | `Probe<1>` | `early` | -5 | yes |
/// | `Probe<2>` | `silent` | 0 | no |
pub struct Fixture {
    pub engine:   Engine,
    pub journal:  Arc<Journal>,
    pub counters: Arc<Counters>,
    pub files:    Arc<MemoryFetch>,
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        init();

        let journal = Arc::new(Journal::default());
        let counters = Arc::new(Counters::default());
        let files = Arc::new(MemoryFetch::new());
        files.insert("hero.proto", "hero v1");
        files.insert("shared.proto", "shared v1");

        let mut builder = Engine::builder(config, Arc::clone(&files));
        builder.register(Descriptor::new("late").priority(10).reload(true), Probe::<0> {
            journal: Arc::clone(&journal),
        });
        builder.register(Descriptor::new("early").priority(-5).reload(true), Probe::<1> {
            journal: Arc::clone(&journal),
        });
        builder.register(Descriptor::new("silent"), Probe::<2> { journal: Arc::clone(&journal) });
        builder.resource_type("proto", CountingFactory(Arc::clone(&counters)));

        Self { engine: builder.build(), journal, counters, files }
    }
}
