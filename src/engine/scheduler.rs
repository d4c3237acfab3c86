use rayon::prelude::*;

use crate::tracer::Tracer;
use crate::world::{Shared, World};

/// Runs the frame of every world, on a thread pool if one is configured.
pub(super) struct Executor {
    thread_pool: Option<rayon::ThreadPool>,
}

impl Executor {
    /// Builds a new executor with the given `concurrency`.
    ///
    /// A concurrency of 0 runs all worlds on the thread calling [`run`](Self::run).
    /// If the pool cannot be started, worlds also run on the calling thread.
    pub(super) fn new(concurrency: usize) -> Self {
        let thread_pool = (concurrency > 0)
            .then(|| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(concurrency)
                    .thread_name(|i| format!("scenery worker #{}", i))
                    .build()
            })
            .and_then(|result| match result {
                Ok(pool) => Some(pool),
                Err(err) => {
                    log::error!("Failed to create thread pool, running worlds sequentially: {err}");
                    None
                }
            });
        Self { thread_pool }
    }

    /// Runs one frame of each world.
    ///
    /// Worlds never share instance state,
    /// so each world is handed to exactly one worker.
    pub(super) fn run(&self, worlds: &mut [World], shared: Shared<'_>, tracer: &impl Tracer) {
        match &self.thread_pool {
            Some(pool) if worlds.len() > 1 => pool.install(|| {
                worlds.par_iter_mut().for_each(|world| world.run_frame(shared, tracer));
            }),
            _ => {
                for world in worlds {
                    world.run_frame(shared, tracer);
                }
            }
        }
    }
}
