//! Lifecycle shared by long-lived components.

use std::future::Future;

use crate::config::AddressDefaults;

/// A long-lived component with a configure/run/stop lifecycle.
///
/// Implemented by the node service, the storage server and the master server
/// so the CLI can drive all three the same way:
///
/// 1. [`configure`](Service::configure) fills unset settings from explicit
///    defaults without overwriting anything already set.
/// 2. [`run`](Service::run) starts the component's background tasks and
///    returns once they are started.
/// 3. [`stop`](Service::stop) signals those tasks to finish. It is idempotent
///    and safe to call without a prior `run`.
pub trait Service {
    /// Error returned when the component cannot start.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fills the component's unset settings from `defaults`.
    fn configure(&mut self, defaults: &AddressDefaults);

    /// Starts the component.
    fn run(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Stops the component.
    fn stop(&mut self);
}
