// Panic isolation: a failing task body or result handler must not take the
// scheduler down with it.

use crate::port::{Alert, AlertSink};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// Result of a panic-guarded call
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Call completed
    Success(T),
    /// Call panicked, with the panic message
    Panicked(String),
}

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Run a synchronous closure, converting a panic into `Panicked`
///
/// # Example
/// ```text
/// match execute_guarded(|| handler(output)) {
///     PanicGuardResult::Panicked(msg) => warn!("handler panicked: {}", msg),
///     PanicGuardResult::Success(()) => {}
/// }
/// ```
pub fn execute_guarded<F, T>(context: &str, f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(context = %context, panic_msg = %panic_msg, "Guarded call panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

/// Deliver an alert; a panicking sink is logged and never reaches the caller
pub fn raise_guarded(sink: &dyn AlertSink, alert: &Alert) {
    let _ = execute_guarded(&alert.subject(), || sink.raise(alert));
}
