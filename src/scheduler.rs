//! Deferred task scheduling.
//!
//! Promise handlers are never run inline. Settling a promise hands each
//! handler to a [`Scheduler`] as a [`Task`], and the scheduler decides when the
//! task runs. Every promise remembers the scheduler it was created with and
//! its dependents inherit it.
//!
//! By default a thread uses its own [`MicrotaskQueue`], flushed with
//! [`run_microtasks`]. [`with_scheduler`] swaps in another one for a scope.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;
use tracing::warn;

pub type Task = Box<dyn FnOnce()>;

/// The host's deferred task queue.
///
/// Implementations must run tasks in the order they were scheduled and must
/// not run a task from inside `schedule`.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

/// A FIFO queue of tasks that runs only when asked to.
///
/// Cloning gives another handle to the same queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs tasks until the queue is empty, including tasks scheduled by the
    /// tasks being run. Returns how many tasks ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        loop {
            // The borrow must end before the task runs: tasks schedule more tasks.
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("len", &self.len())
            .finish()
    }
}

/// Runs tasks on a `futures` local executor.
///
/// Tasks are collected in a [`MicrotaskQueue`]; a single drain future is
/// spawned whenever the queue goes from idle to busy, so tasks keep their
/// FIFO order no matter how the executor orders its futures.
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use futures::executor::LocalPool;
/// use promise_aplus::{scheduler::{self, LocalSpawnScheduler}, Promise, Value};
///
/// let mut pool = LocalPool::new();
/// let tasks = Rc::new(LocalSpawnScheduler::new(pool.spawner()));
/// let chained = scheduler::with_scheduler(tasks, || {
///     Promise::resolve(Value::from("hi")).then(Ok, Err)
/// });
/// assert_eq!(pool.run_until(chained.waiter()), Ok(Value::from("hi")));
/// ```
pub struct LocalSpawnScheduler {
    spawner: LocalSpawner,
    queue: MicrotaskQueue,
    draining: Rc<Cell<bool>>,
}

impl LocalSpawnScheduler {
    pub fn new(spawner: LocalSpawner) -> Self {
        LocalSpawnScheduler {
            spawner,
            queue: MicrotaskQueue::new(),
            draining: Rc::new(Cell::new(false)),
        }
    }
}

impl Scheduler for LocalSpawnScheduler {
    fn schedule(&self, task: Task) {
        self.queue.schedule(task);
        if self.draining.replace(true) {
            return;
        }
        let queue = self.queue.clone();
        let draining = self.draining.clone();
        let drain = async move {
            queue.run_until_stalled();
            draining.set(false);
        };
        if let Err(err) = self.spawner.spawn_local(drain) {
            warn!(%err, pending = self.queue.len(), "Failed to spawn microtask drain");
            self.draining.set(false);
        }
    }
}

impl fmt::Debug for LocalSpawnScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSpawnScheduler")
            .field("queue", &self.queue)
            .field("draining", &self.draining.get())
            .finish()
    }
}

thread_local! {
    static DEFAULT_QUEUE: MicrotaskQueue = MicrotaskQueue::new();
    static CURRENT: RefCell<Option<Rc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// The thread's default queue.
pub fn default_queue() -> MicrotaskQueue {
    DEFAULT_QUEUE.with(MicrotaskQueue::clone)
}

/// The scheduler new promises pick up: the innermost [`with_scheduler`]
/// override, or the thread's default queue.
pub fn current() -> Rc<dyn Scheduler> {
    match CURRENT.with(|current| current.borrow().clone()) {
        Some(scheduler) => scheduler,
        None => Rc::new(default_queue()),
    }
}

/// Runs `f` with `scheduler` as the current scheduler.
pub fn with_scheduler<R>(scheduler: Rc<dyn Scheduler>, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Rc<dyn Scheduler>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| *current.borrow_mut() = previous);
        }
    }

    let previous = CURRENT.with(|current| current.borrow_mut().replace(scheduler));
    let _restore = Restore(previous);
    f()
}

/// Flushes the thread's default queue. Returns how many tasks ran.
pub fn run_microtasks() -> usize {
    default_queue().run_until_stalled()
}
