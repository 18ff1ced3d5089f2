//! The promise resolution procedure: settles a promise from an arbitrary
//! value, adopting the state of promises and thenables.
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::promise::Handler;
use crate::{Callback, Error, Promise, ThenFn, Value};

/// Where the value went after one round of the procedure.
enum Step {
    Settled,
    /// A thenable fulfilled synchronously with another value.
    Unwrap(Value),
}

/// Settles `promise` from `x`.
///
/// Thenables that call back synchronously are unwrapped in a loop rather than
/// by recursion, so deeply nested thenables cannot exhaust the stack.
pub(crate) fn resolve_promise(promise: &Promise, x: Value) {
    let mut x = x;
    while let Step::Unwrap(y) = step(promise, x) {
        x = y;
    }
}

fn step(promise: &Promise, x: Value) -> Step {
    if let Value::Promise(candidate) = &x {
        if candidate.ptr_eq(promise) {
            debug!(promise = promise.id(), "Chaining cycle detected");
            promise.reject_with(Value::from(Error::ChainingCycle));
            return Step::Settled;
        }
    }
    if !x.is_object() {
        promise.fulfill(x);
        return Step::Settled;
    }
    match then_member(&x) {
        Err(reason) => {
            promise.reject_with(reason);
            Step::Settled
        }
        Ok(None) => {
            promise.fulfill(x);
            Step::Settled
        }
        Ok(Some(then)) => call_then(promise, &x, then),
    }
}

fn then_member(x: &Value) -> Result<Option<ThenFn>, Value> {
    match x {
        Value::Promise(source) => Ok(Some(promise_then(source.clone()))),
        Value::Object(object) => object.then_member(),
        _ => Ok(None),
    }
}

/// A promise's own `then`, shaped like a foreign one.
fn promise_then(source: Promise) -> ThenFn {
    Rc::new(move |_this: &Value, on_fulfilled: Callback, on_rejected: Callback| {
        source.then_with(
            Handler::new(move |value| {
                on_fulfilled.call(value);
                Ok(Value::Undefined)
            }),
            Handler::new(move |reason| {
                on_rejected.call(reason);
                Ok(Value::Undefined)
            }),
        );
        Ok(())
    })
}

/// Shared by the resolving functions handed to one `then` call.
struct Guard {
    called: Cell<bool>,
    /// Set while `then` is still on the stack.
    in_then: Cell<bool>,
    /// A value handed to `on_fulfilled` while `then` was on the stack.
    unwrapped: RefCell<Option<Value>>,
}

impl Guard {
    fn first_call(&self, promise: &Promise) -> bool {
        if self.called.replace(true) {
            debug!(promise = promise.id(), "Ignoring repeated thenable callback");
            return false;
        }
        true
    }
}

fn call_then(promise: &Promise, x: &Value, then: ThenFn) -> Step {
    let guard = Rc::new(Guard {
        called: Cell::new(false),
        in_then: Cell::new(true),
        unwrapped: RefCell::new(None),
    });

    let on_fulfilled = {
        let guard = guard.clone();
        let promise = promise.clone();
        Callback::new(move |y| {
            if !guard.first_call(&promise) {
                return;
            }
            if guard.in_then.get() {
                *guard.unwrapped.borrow_mut() = Some(y);
            } else {
                resolve_promise(&promise, y);
            }
        })
    };
    let on_rejected = {
        let guard = guard.clone();
        let promise = promise.clone();
        Callback::new(move |r| {
            if guard.first_call(&promise) {
                promise.reject_with(r);
            }
        })
    };

    let result = then(x, on_fulfilled, on_rejected);
    guard.in_then.set(false);
    if let Err(reason) = result {
        if guard.called.replace(true) {
            debug!(promise = promise.id(), "Swallowing error thrown after thenable settled");
        } else {
            promise.reject_with(reason);
            return Step::Settled;
        }
    }
    // Take before matching so the borrow ends here.
    let unwrapped = guard.unwrapped.borrow_mut().take();
    match unwrapped {
        Some(y) => Step::Unwrap(y),
        None => Step::Settled,
    }
}
