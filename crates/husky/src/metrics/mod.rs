//! Metrics for husky (statements, loads, runs).

pub mod events;

pub use events::*;

/// Macro for emitting husky metric events.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        <_ as $crate::metrics::events::InternalEvent>::emit($event)
    };
}
