//! Values that promises settle with.
//!
//! [`Value`] is deliberately dynamic: a promise must be able to hold anything
//! a handler returns, including foreign promise-like objects that only show
//! their nature through a `then` member. Those objects implement [`Object`].
use std::fmt;
use std::rc::Rc;

use crate::{Error, Promise};

/// A `then` member that can be invoked: `(receiver, on_fulfilled, on_rejected)`.
///
/// Returning `Err` models a synchronous throw from inside `then`.
pub type ThenFn = Rc<dyn Fn(&Value, Callback, Callback) -> Result<(), Value>>;

/// Anything with a (possibly missing) `then` member.
pub trait Object {
    /// Reads the `then` member.
    ///
    /// `Err` means reading the member raised, `Ok(None)` means the member is
    /// absent or not invocable, so the object is a plain value.
    fn then_member(&self) -> Result<Option<ThenFn>, Value>;
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<[Value]>),
    Error(Rc<Error>),
    Promise(Promise),
    Object(Rc<dyn Object>),
}

impl Value {
    /// Shorthand for a [`Error::Message`] value.
    pub fn error(message: impl Into<String>) -> Self {
        Value::from(Error::Message(message.into()))
    }

    pub fn object(object: impl Object + 'static) -> Self {
        Value::Object(Rc::new(object))
    }

    /// Whether the resolution procedure must look for a `then` member.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Error(_) | Value::Promise(_) | Value::Object(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Rc<[Value]>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(promise) => Some(promise),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Error(err) => write!(f, "Error({err})"),
            // Only the id: a promise may hold itself.
            Value::Promise(promise) => write!(f, "Promise {{ id: {} }}", promise.id()),
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items.into())
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(Rc::new(err))
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Value::Promise(promise)
    }
}

/// A resolving function: `resolve` or `reject` handed to a setup routine, or
/// the `on_fulfilled`/`on_rejected` pair handed to a foreign `then`.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(Value)>);

impl Callback {
    pub fn new(f: impl Fn(Value) + 'static) -> Self {
        Callback(Rc::new(f))
    }

    pub fn call(&self, value: impl Into<Value>) {
        (self.0)(value.into())
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

/// An [`Object`] whose `then` member is the given closure.
///
/// # Examples
///
/// ```
/// use promise_aplus::{scheduler, Promise, Thenable, Value};
///
/// let answer = Thenable::new(|_this, on_fulfilled, _on_rejected| {
///     on_fulfilled.call(42);
///     Ok(())
/// });
/// let p = Promise::resolve(Value::Undefined).then(move |_| Ok(answer.into_value()), Err);
/// scheduler::run_microtasks();
/// assert_eq!(p.value(), Some(Value::from(42)));
/// ```
pub struct Thenable {
    then: ThenFn,
}

impl Thenable {
    pub fn new<F>(then: F) -> Self
    where
        F: Fn(&Value, Callback, Callback) -> Result<(), Value> + 'static,
    {
        Thenable { then: Rc::new(then) }
    }

    pub fn into_value(self) -> Value {
        Value::object(self)
    }
}

impl Object for Thenable {
    fn then_member(&self) -> Result<Option<ThenFn>, Value> {
        Ok(Some(self.then.clone()))
    }
}
