use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::trace;

use crate::{Completion, Error, Promise, Value};

/// A future that completes with a promise's outcome: `Ok(value)` when it
/// fulfills, `Err(reason)` when it rejects.
///
/// If the promise is dropped while still pending, and with it everything that
/// could have settled it, the waiter completes with [`Error::Abandoned`].
///
/// # Examples
///
/// ```
/// use promise_aplus::{Deferred, Value};
/// use futures::executor::block_on;
///
/// let deferred = Deferred::new();
/// let waiter = deferred.promise.waiter();
/// deferred.resolve.call("Hi");
/// assert_eq!(block_on(waiter), Ok(Value::from("Hi")));
/// ```
#[derive(Debug)]
pub struct Waiter {
    slot: Rc<RefCell<Slot>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Slot {
    outcome: Option<Completion>,
    waker: Result<Waker, WakerState>,
}

/// Delivers the outcome into the slot. Shared by both continuations; when the
/// last one goes away without delivering, the waiter is told it never will.
struct Notifier {
    slot: Rc<RefCell<Slot>>,
}

impl Notifier {
    fn deliver(&self, outcome: Completion) {
        let mut slot = self.slot.borrow_mut();
        slot.outcome = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl Drop for Notifier {
    /// If this is an undelivered notifier, wake with error.
    fn drop(&mut self) {
        let mut slot = self.slot.borrow_mut();
        if slot.outcome.is_some() {
            return;
        }
        trace!("Promise dropped before it settled");
        slot.outcome = Some(Err(Value::from(Error::Abandoned)));
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl Promise {
    /// A future for this promise's outcome. Awaiting it does not need the
    /// promise's scheduler to run: the waiter is notified at settlement.
    pub fn waiter(&self) -> Waiter {
        let slot = Rc::new(RefCell::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let notifier = Rc::new(Notifier { slot: slot.clone() });
        let on_rejected = notifier.clone();
        self.subscribe(
            Box::new(move |value| notifier.deliver(Ok(value))),
            Box::new(move |reason| on_rejected.deliver(Err(reason))),
        );
        Waiter { slot }
    }
}

impl IntoFuture for Promise {
    type Output = Completion;
    type IntoFuture = Waiter;

    fn into_future(self) -> Waiter {
        self.waiter()
    }
}

impl Future for Waiter {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Ok(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
