//! Error taxonomy (§7 of the core design).
//!
//! `Disposed`, `Cycle`, and `Contract` are programming errors: they panic at
//! the call site and are never cached, mirroring how the teacher crate
//! signals misuse (`flourish`'s raw modules `panic!` on reentrant borrow
//! conflicts rather than returning a `Result`). `ComputeError` and
//! `AsyncError` are *values*: a compute function that panics has its payload
//! captured and cached on the node, to be re-observed on every subsequent
//! read until the dependency set changes and a fresh compute succeeds.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A panic payload caught around a user compute/async closure, turned into a
/// cacheable, `Clone`-able value.
#[derive(Clone)]
pub struct ComputeError {
    message: Rc<str>,
}

impl ComputeError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self { message: panic_message(payload) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Extracts a readable message from a `catch_unwind` payload, falling back to
/// a generic description for a non-string panic value. Shared by
/// `ComputeError`/`AsyncError` and by the devtools `ListenerError` reporting
/// path (§4.9, §7's `Listener` row).
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> Rc<str> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Rc::from(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Rc::from(s.as_str())
    } else {
        Rc::from("panicked with a non-string payload")
    }
}

impl fmt::Debug for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeError").field("message", &self.message).finish()
    }
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compute error: {}", self.message)
    }
}

/// A rejection from an async computed signal's future (§4.3).
#[derive(Clone)]
pub struct AsyncError {
    message: Rc<str>,
}

impl AsyncError {
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self { message: message.into() }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        ComputeError::from_panic(payload).into()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ComputeError> for AsyncError {
    fn from(e: ComputeError) -> Self {
        Self { message: e.message }
    }
}

impl fmt::Debug for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncError").field("message", &self.message).finish()
    }
}

impl fmt::Display for AsyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "async error: {}", self.message)
    }
}

/// Programming errors (§7: Disposed / Cycle / Contract). `Cycle` is raised by
/// `rxblox-runtime` itself during dependency tracking; the other two are
/// raised here, always via `panic!`, never returned as a `Result` — per I6
/// and the propagation policy in §7 these are not recoverable at the
/// call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// An operation that requires a live signal was attempted on a disposed one.
    Disposed { name: Rc<str> },
    /// Misuse not covered by `Disposed` — e.g. a tag operation on the wrong kind.
    Contract { message: Rc<str> },
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::Disposed { name } => write!(f, "signal `{name}` is disposed"),
            ContractError::Contract { message } => write!(f, "contract violation: {message}"),
        }
    }
}

pub(crate) fn panic_disposed(name: &str) -> ! {
    panic!("{}", ContractError::Disposed { name: Rc::from(name) })
}

pub(crate) fn panic_contract(message: impl Into<String>) -> ! {
    panic!("{}", ContractError::Contract { message: Rc::from(message.into()) })
}
