use std::rc::Rc;

use crate::scheduler::{self, Scheduler};
use crate::{Callback, Promise};

/// A promise together with its own `resolve` and `reject`, for settling it
/// from outside. Conformance harnesses drive promises through this.
///
/// `resolve` is a direct transition: it stores whatever it is given, without
/// following thenables.
///
/// # Examples
///
/// ```
/// use promise_aplus::{scheduler, Deferred, Value};
///
/// let deferred = Deferred::new();
/// let doubled = deferred
///     .promise
///     .then(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) * 2.0)), Err);
///
/// deferred.resolve.call(21);
/// deferred.resolve.call(0);
/// scheduler::run_microtasks();
/// assert_eq!(doubled.value(), Some(Value::from(42)));
/// ```
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: Callback,
    pub reject: Callback,
}

impl Deferred {
    pub fn new() -> Self {
        Deferred::new_in(scheduler::current())
    }

    pub fn new_in(scheduler: Rc<dyn Scheduler>) -> Self {
        let promise = Promise::pending_in(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        Deferred {
            promise,
            resolve,
            reject,
        }
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Deferred::new()
    }
}

impl Promise {
    pub fn deferred() -> Deferred {
        Deferred::new()
    }
}
