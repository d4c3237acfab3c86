use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{Message, Timing};
use crate::world::WorldId;
use crate::{Error, Result};

/// Per-world bounded FIFO queues of pending messages.
///
/// The bus is shared with producers on other threads through
/// [`Engine::bus`](crate::Engine::bus). Posting never blocks on the frame loop.
pub struct MessageBus {
    capacity: usize,
    /// The frame currently running, or the last completed frame between ticks.
    frame:    AtomicU64,
    /// Only worlds that exist have a queue.
    queues:   Mutex<HashMap<WorldId, VecDeque<Message>>>,
}

static_assertions::assert_impl_all!(MessageBus: Send, Sync);

impl MessageBus {
    /// Creates a bus that keeps at most `capacity` pending messages per world.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, frame: AtomicU64::new(0), queues: Mutex::new(HashMap::new()) }
    }

    /// The backlog bound per world.
    pub fn capacity(&self) -> usize { self.capacity }

    /// Queues a message for the next dispatch phase of its target world.
    ///
    /// Fails with [`Error::QueueFull`] if the world already has `capacity` pending messages,
    /// in which case the message is dropped.
    pub fn post(&self, mut message: Message) -> Result<()> {
        let world = message.address.world();

        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&world)
            .ok_or_else(|| Error::InvalidHandle(format!("{world} does not exist")))?;

        if queue.len() >= self.capacity {
            log::warn!("Dropped message {} to {world}: queue is full", message.id);
            return Err(Error::QueueFull { world, capacity: self.capacity });
        }

        message.posted_frame = self.frame.load(Ordering::Acquire);
        log::trace!("Posted {message:?}");
        queue.push_back(message);
        Ok(())
    }

    /// Number of messages waiting for `world`.
    pub fn pending(&self, world: WorldId) -> usize {
        self.queues.lock().get(&world).map_or(0, VecDeque::len)
    }

    pub(crate) fn open(&self, world: WorldId) { self.queues.lock().entry(world).or_default(); }

    /// Discards the queue of a deleted world.
    pub(crate) fn forget(&self, world: WorldId) {
        if let Some(queue) = self.queues.lock().remove(&world) {
            if !queue.is_empty() {
                log::warn!("Discarded {} pending messages of deleted {world}", queue.len());
            }
        }
    }

    pub(crate) fn begin_frame(&self, frame: u64) { self.frame.store(frame, Ordering::Release); }

    /// Takes the messages of `world` deliverable in `frame`.
    ///
    /// Deferred messages posted during `frame` stay queued,
    /// and so does everything behind them to keep the queue FIFO.
    pub(crate) fn drain(&self, world: WorldId, frame: u64) -> Vec<Message> {
        let mut queues = self.queues.lock();
        let queue = match queues.get_mut(&world) {
            Some(queue) => queue,
            None => return Vec::new(),
        };

        let mut ready = Vec::with_capacity(queue.len());
        while let Some(front) = queue.front() {
            if front.timing == Timing::Deferred && front.posted_frame >= frame {
                break;
            }
            ready.extend(queue.pop_front());
        }
        ready
    }
}
