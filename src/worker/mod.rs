//! The offline cache worker.
//!
//! A worker version moves through install, activate and then serves fetch,
//! sync, push and notification-click events. Every event goes through
//! `ServiceWorker::dispatch`, which awaits the handler to completion; the
//! only work that outlives a handler is the dynamic-cache write, which
//! `ServiceWorker::settle` waits for.

mod events;
mod fetch;
mod lifecycle;
mod notification;
mod sync;

#[cfg(test)]
mod tests;

pub use events::{Event, EventOutcome, WorkerState};
pub use lifecycle::ServiceWorker;
pub use sync::CONTACT_FORM_TAG;
