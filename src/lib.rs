//! Promise/A+ promises for rust.
//!
//! A [`Promise`] holds the eventual result of an asynchronous operation. It is
//! single-threaded: handlers registered with [`Promise::then`] never run on the
//! stack that settled the promise, they are handed to a [`scheduler`] and run
//! on a later turn in registration order.
//!
//! ```
//! use promise_aplus::{scheduler, Promise, Value};
//!
//! let doubled = Promise::resolve(Value::from(21))
//!     .then(|v| Ok(Value::from(v.as_number().unwrap_or(0.0) * 2.0)), Err);
//! assert!(doubled.is_pending());
//!
//! scheduler::run_microtasks();
//! assert_eq!(doubled.value(), Some(Value::from(42)));
//! ```
mod combinators;
pub mod deferred;
pub mod promise;
mod resolution;
pub mod scheduler;
pub mod value;
pub mod waiter;

pub use deferred::Deferred;
pub use promise::{Handler, Promise, PromiseState};
pub use scheduler::{MicrotaskQueue, Scheduler};
pub use value::{Callback, Object, ThenFn, Thenable, Value};
pub use waiter::Waiter;

/// The outcome of a handler or setup routine. `Err` carries a raised value.
pub type Completion = Result<Value, Value>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A handler returned the very promise it was meant to settle.
    #[error("TypeError: chaining cycle detected for promise")]
    ChainingCycle,
    /// Every path that could settle the promise was dropped.
    #[error("promise was dropped before it settled")]
    Abandoned,
    #[error("{0}")]
    Message(String),
}
