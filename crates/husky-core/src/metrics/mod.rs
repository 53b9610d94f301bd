//! Metrics emission.
//!
//! Every measurable occurrence is a struct implementing
//! [`events::InternalEvent`]; call sites record it with [`emit!`](crate::emit).
//! The `metrics` facade routes values to whatever recorder the binary
//! installs, and is a no-op when none is installed.

pub mod events;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric. Event types defined in other
/// crates work as long as they implement
/// `husky_core::metrics::events::InternalEvent`.
///
/// # Example
///
/// ```ignore
/// use husky_core::emit;
/// use husky_core::metrics::events::{RequestStatus, StorageOperation, StorageRequest};
///
/// emit!(StorageRequest { operation: StorageOperation::Get, status: RequestStatus::Success });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
