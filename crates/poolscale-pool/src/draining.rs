//! Hand-off of nodes for graceful removal.

use poolscale_core::InstanceMetadata;

/// Queue-backed draining service.
///
/// Submission only enqueues; the drain and the eventual termination
/// happen elsewhere.
pub trait DrainingClient: Send {
    /// Enqueue `instance` for draining. `sender` is the kind of the
    /// resource group that owns it.
    fn submit_instance_for_draining(
        &self,
        instance: &InstanceMetadata,
        sender: &str,
        scheduler: &str,
    ) -> anyhow::Result<()>;
}
