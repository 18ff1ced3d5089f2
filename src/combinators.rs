//! Static constructors: `resolve`, `reject`, `adopt`, `all` and `race`.
//!
//! Each has an `_in` form taking an explicit scheduler; the plain form uses
//! [`scheduler::current`].
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::resolution;
use crate::scheduler::{self, Scheduler};
use crate::{Completion, Promise, Value};

impl Promise {
    /// Wraps `value` in a fulfilled promise, or returns it unchanged when it
    /// already is a promise.
    ///
    /// The value is stored as is: a thenable is not unwrapped. Use
    /// [`Promise::adopt`] to follow it.
    pub fn resolve(value: Value) -> Promise {
        Promise::resolve_in(scheduler::current(), value)
    }

    pub fn resolve_in(scheduler: Rc<dyn Scheduler>, value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            value => {
                let promise = Promise::pending_in(scheduler);
                promise.fulfill(value);
                promise
            }
        }
    }

    /// Like [`Promise::resolve`], but a thenable is followed until it settles.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{scheduler, Promise, Thenable, Value};
    ///
    /// let thenable = Thenable::new(|_, on_fulfilled, _| {
    ///     on_fulfilled.call("unwrapped");
    ///     Ok(())
    /// })
    /// .into_value();
    ///
    /// assert_eq!(Promise::resolve(thenable.clone()).value(), Some(thenable.clone()));
    /// assert_eq!(Promise::adopt(thenable).value(), Some(Value::from("unwrapped")));
    /// # scheduler::run_microtasks();
    /// ```
    pub fn adopt(value: Value) -> Promise {
        Promise::adopt_in(scheduler::current(), value)
    }

    pub fn adopt_in(scheduler: Rc<dyn Scheduler>, value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            value => {
                let promise = Promise::pending_in(scheduler);
                resolution::resolve_promise(&promise, value);
                promise
            }
        }
    }

    pub fn reject(reason: Value) -> Promise {
        Promise::reject_in(scheduler::current(), reason)
    }

    pub fn reject_in(scheduler: Rc<dyn Scheduler>, reason: Value) -> Promise {
        let promise = Promise::pending_in(scheduler);
        promise.reject_with(reason);
        promise
    }

    /// Fulfills with every item's value, in input order, once each promise
    /// item has fulfilled. Items that are not promises count as already
    /// fulfilled with themselves. The first rejection rejects the result.
    ///
    /// When no item is a promise the result fulfills with the input array
    /// itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{scheduler, Promise, Value};
    ///
    /// let all = Promise::all(vec![
    ///     Value::Promise(Promise::resolve(Value::from(1))),
    ///     Value::from(2),
    /// ]);
    /// scheduler::run_microtasks();
    /// assert_eq!(all.value(), Some(Value::from(vec![Value::from(1), Value::from(2)])));
    /// ```
    pub fn all(items: impl Into<Rc<[Value]>>) -> Promise {
        Promise::all_in(scheduler::current(), items)
    }

    pub fn all_in(scheduler: Rc<dyn Scheduler>, items: impl Into<Rc<[Value]>>) -> Promise {
        let items: Rc<[Value]> = items.into();
        let aggregate = Promise::pending_in(scheduler.clone());
        if items.is_empty() {
            aggregate.fulfill(Value::Array(items));
            return aggregate;
        }

        let outstanding = items
            .iter()
            .filter(|item| matches!(item, Value::Promise(_)))
            .count();
        if outstanding == 0 {
            let target = aggregate.clone();
            scheduler.schedule(Box::new(move || target.fulfill(Value::Array(items))));
            return aggregate;
        }

        let results = Rc::new(RefCell::new(items.to_vec()));
        let outstanding = Rc::new(Cell::new(outstanding));
        for (index, item) in items.iter().enumerate() {
            let Value::Promise(element) = item else {
                continue;
            };
            let fulfilled = {
                let aggregate = aggregate.clone();
                let results = results.clone();
                let outstanding = outstanding.clone();
                move |value: Value| -> Completion {
                    results.borrow_mut()[index] = value;
                    outstanding.set(outstanding.get() - 1);
                    if outstanding.get() == 0 {
                        let values = results.take();
                        aggregate.fulfill(Value::from(values));
                    }
                    Ok(Value::Undefined)
                }
            };
            let rejected = {
                let aggregate = aggregate.clone();
                move |reason: Value| -> Completion {
                    aggregate.reject_with(reason);
                    Ok(Value::Undefined)
                }
            };
            element.then(fulfilled, rejected);
        }
        aggregate
    }

    /// Settles like the first promise item to settle. Items that are not
    /// promises are ignored, so an input without promises never settles.
    pub fn race(items: impl Into<Rc<[Value]>>) -> Promise {
        Promise::race_in(scheduler::current(), items)
    }

    pub fn race_in(scheduler: Rc<dyn Scheduler>, items: impl Into<Rc<[Value]>>) -> Promise {
        let items: Rc<[Value]> = items.into();
        let winner = Promise::pending_in(scheduler);
        for element in items.iter().filter_map(Value::as_promise) {
            let on_fulfilled = winner.clone();
            let on_rejected = winner.clone();
            element.then(
                move |value| {
                    on_fulfilled.fulfill(value);
                    Ok(Value::Undefined)
                },
                move |reason| {
                    on_rejected.reject_with(reason);
                    Ok(Value::Undefined)
                },
            );
        }
        winner
    }
}
