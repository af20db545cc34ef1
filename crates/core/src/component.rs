//! Component lifecycle seam.
//!
//! Collaborators that participate in a host application's lifecycle (the
//! permissions manager, storage backends, reload-sensitive caches) implement
//! [`Component`]. An external driver owns the call order; the engine never
//! invokes these hooks itself.

/// A collaborator that receives host lifecycle events.
///
/// All hooks default to no-ops; implementors override the subset they need.
pub trait Component {
    /// Fired before the component is enabled. No assumptions may be made
    /// about the readiness of other components.
    fn on_load(&mut self) {}

    /// Fired when the component is enabled and the host is initialized.
    fn on_enable(&mut self) {}

    /// Fired when the component is disabled. Other components may already be
    /// disabled.
    fn on_disable(&mut self) {}

    /// Instructs the component to reload. No assumptions may be made about
    /// the order in which components reload.
    fn on_reload(&mut self) {}
}
