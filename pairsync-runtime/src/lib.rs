//! Session runtime: watcher ticks, event routing, snapshot intake and teardown.

mod error;
mod runtime;

pub use error::RuntimeError;
pub use runtime::{init_tracing, HostSignal, Session, SessionCommand, SessionHandle, SessionParts};
