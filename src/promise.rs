//! The promise itself: state, settlement and chaining.
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::resolution;
use crate::scheduler::{self, Scheduler};
use crate::{Callback, Completion, Value};

/// Runs once the promise settles, with the value or reason it settled with.
pub(crate) type Continuation = Box<dyn FnOnce(Value)>;

type HandlerFn = Box<dyn FnOnce(Value) -> Completion>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

enum State {
    Pending {
        on_fulfilled: Vec<Continuation>,
        on_rejected: Vec<Continuation>,
    },
    Fulfilled(Value),
    Rejected(Value),
}

struct Inner {
    id: u64,
    state: RefCell<State>,
    scheduler: Rc<dyn Scheduler>,
}

/// A Promise/A+ promise.
///
/// `Promise` is a handle: clones refer to the same promise, and `==` compares
/// identity.
///
/// # Examples
///
/// ```
/// use promise_aplus::{scheduler, Promise, Value};
///
/// let p = Promise::new(|resolve, _reject| {
///     resolve.call("done");
///     Ok(())
/// });
/// let seen = p.then(|v| Ok(v), Err);
/// assert!(seen.is_pending());
/// scheduler::run_microtasks();
/// assert_eq!(seen.value(), Some(Value::from("done")));
/// ```
#[derive(Clone)]
pub struct Promise {
    inner: Rc<Inner>,
}

/// A handler passed to [`Promise::then_with`]. [`Handler::none`] stands for a
/// missing handler.
#[derive(Default)]
pub struct Handler(Option<HandlerFn>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Value) -> Completion + 'static,
    {
        Handler(Some(Box::new(f)))
    }

    pub fn none() -> Self {
        Handler(None)
    }

    fn or_passthrough(self) -> HandlerFn {
        match self.0 {
            Some(handler) => handler,
            None => Box::new(|value: Value| Ok(value)),
        }
    }

    fn or_rethrow(self) -> HandlerFn {
        match self.0 {
            Some(handler) => handler,
            None => Box::new(|reason: Value| Err(reason)),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Handler"),
            None => f.write_str("Handler(none)"),
        }
    }
}

/// A handler bound to the dependent promise it settles.
struct Reaction {
    handler: HandlerFn,
    dependent: Promise,
}

impl Reaction {
    fn enqueue(self, scheduler: &Rc<dyn Scheduler>, argument: Value) {
        scheduler.schedule(Box::new(move || self.run(argument)));
    }

    fn run(self, argument: Value) {
        match (self.handler)(argument) {
            Ok(x) => resolution::resolve_promise(&self.dependent, x),
            Err(reason) => self.dependent.reject_with(reason),
        }
    }
}

impl Promise {
    /// Creates a promise on the current scheduler and runs `setup` with its
    /// resolving functions right away. An `Err` from `setup` rejects the
    /// promise unless it already settled.
    pub fn new<F>(setup: F) -> Promise
    where
        F: FnOnce(Callback, Callback) -> Result<(), Value>,
    {
        Promise::new_in(scheduler::current(), setup)
    }

    /// Like [`Promise::new`], with an explicit scheduler.
    pub fn new_in<F>(scheduler: Rc<dyn Scheduler>, setup: F) -> Promise
    where
        F: FnOnce(Callback, Callback) -> Result<(), Value>,
    {
        let promise = Promise::pending_in(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        if let Err(reason) = setup(resolve, reject) {
            promise.reject_with(reason);
        }
        promise
    }

    pub(crate) fn pending_in(scheduler: Rc<dyn Scheduler>) -> Promise {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Promise {
            inner: Rc::new(Inner {
                id,
                state: RefCell::new(State::Pending {
                    on_fulfilled: Vec::new(),
                    on_rejected: Vec::new(),
                }),
                scheduler,
            }),
        }
    }

    pub(crate) fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// The direct-transition `resolve`/`reject` pair of this promise.
    pub(crate) fn resolving_functions(&self) -> (Callback, Callback) {
        let fulfilled = self.clone();
        let rejected = self.clone();
        (
            Callback::new(move |value| fulfilled.fulfill(value)),
            Callback::new(move |reason| rejected.reject_with(reason)),
        )
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> PromiseState {
        match *self.inner.state.borrow() {
            State::Pending { .. } => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// The fulfillment value, once fulfilled.
    pub fn value(&self) -> Option<Value> {
        match &*self.inner.state.borrow() {
            State::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection reason, once rejected.
    pub fn reason(&self) -> Option<Value> {
        match &*self.inner.state.borrow() {
            State::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn fulfill(&self, value: Value) {
        self.settle(Ok(value));
    }

    pub(crate) fn reject_with(&self, reason: Value) {
        self.settle(Err(reason));
    }

    fn settle(&self, outcome: Completion) {
        let mut state = self.inner.state.borrow_mut();
        let State::Pending {
            on_fulfilled,
            on_rejected,
        } = &mut *state
        else {
            trace!(promise = self.inner.id, "Ignoring settlement of settled promise");
            return;
        };
        let on_fulfilled = mem::take(on_fulfilled);
        let on_rejected = mem::take(on_rejected);
        let (drained, discarded, value) = match outcome {
            Ok(value) => {
                *state = State::Fulfilled(value.clone());
                (on_fulfilled, on_rejected, value)
            }
            Err(reason) => {
                *state = State::Rejected(reason.clone());
                (on_rejected, on_fulfilled, reason)
            }
        };
        drop(state);
        trace!(
            promise = self.inner.id,
            state = ?self.state(),
            continuations = drained.len(),
            "Settled promise"
        );

        drop(discarded);
        for continuation in drained {
            continuation(value.clone());
        }
    }

    /// Registers raw continuations, run synchronously at settlement (or right
    /// away if already settled). They must not call user code.
    pub(crate) fn subscribe(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
        let mut state = self.inner.state.borrow_mut();
        let settled = match &mut *state {
            State::Pending {
                on_fulfilled: fulfilled_queue,
                on_rejected: rejected_queue,
            } => {
                fulfilled_queue.push(on_fulfilled);
                rejected_queue.push(on_rejected);
                return;
            }
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(reason) => Err(reason.clone()),
        };
        drop(state);
        match settled {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        }
    }

    /// Shorthand for `then_with(Handler::new(on_fulfilled), Handler::new(on_rejected))`.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Completion + 'static,
        R: FnOnce(Value) -> Completion + 'static,
    {
        self.then_with(Handler::new(on_fulfilled), Handler::new(on_rejected))
    }

    /// Returns a new promise settled by whichever handler matches this
    /// promise's outcome.
    ///
    /// The handler runs on a later scheduler turn. `Err` from the handler
    /// rejects the returned promise; `Ok(x)` resolves it with `x`, adopting
    /// `x`'s state when it is a promise or a thenable.
    pub fn then_with(&self, on_fulfilled: Handler, on_rejected: Handler) -> Promise {
        let scheduler = self.scheduler().clone();
        let dependent = Promise::pending_in(scheduler.clone());
        let fulfilled = Reaction {
            handler: on_fulfilled.or_passthrough(),
            dependent: dependent.clone(),
        };
        let rejected = Reaction {
            handler: on_rejected.or_rethrow(),
            dependent: dependent.clone(),
        };
        trace!(
            promise = self.inner.id,
            dependent = dependent.inner.id,
            "Registered reaction"
        );

        let on_rejected_scheduler = scheduler.clone();
        self.subscribe(
            Box::new(move |value| fulfilled.enqueue(&scheduler, value)),
            Box::new(move |reason| rejected.enqueue(&on_rejected_scheduler, reason)),
        );
        dependent
    }

    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Completion + 'static,
    {
        self.then_with(Handler::none(), Handler::new(on_rejected))
    }

    /// Runs `callback` once this promise settles either way, then passes the
    /// original outcome through.
    ///
    /// Whatever `callback` returns is waited on first. If `callback` raises, or
    /// its returned promise rejects, that error replaces the original outcome.
    pub fn finally<F>(&self, callback: F) -> Promise
    where
        F: FnOnce() -> Completion + 'static,
    {
        let callback = Rc::new(Cell::new(Some(callback)));
        let on_fulfilled = callback.clone();
        let scheduler = self.scheduler().clone();
        let on_rejected_scheduler = scheduler.clone();

        self.then(
            move |value| {
                let aux = Promise::adopt_in(scheduler, invoke_once(&on_fulfilled)?);
                let forwarded = aux.then_with(Handler::new(move |_| Ok(value)), Handler::none());
                Ok(Value::Promise(forwarded))
            },
            move |reason| {
                let aux = Promise::adopt_in(on_rejected_scheduler, invoke_once(&callback)?);
                let forwarded = aux.then_with(Handler::new(move |_| Err(reason)), Handler::none());
                Ok(Value::Promise(forwarded))
            },
        )
    }
}

fn invoke_once<F>(callback: &Cell<Option<F>>) -> Completion
where
    F: FnOnce() -> Completion,
{
    callback.take().map_or(Ok(Value::Undefined), |f| f())
}

impl PartialEq for Promise {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Promise");
        debug.field("id", &self.inner.id);
        match self.inner.state.try_borrow() {
            Ok(state) => match &*state {
                State::Pending { .. } => debug.field("state", &PromiseState::Pending),
                State::Fulfilled(value) => debug.field("value", value),
                State::Rejected(reason) => debug.field("reason", reason),
            },
            Err(_) => debug.field("state", &"<settling>"),
        };
        debug.finish()
    }
}
