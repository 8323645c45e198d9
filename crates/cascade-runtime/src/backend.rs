use crate::RuntimeError;
use cascade_api::{CancelToken, Execution};

/// The execution layer driven by the reconcile controller.
///
/// Implementations mutate the execution's status in place (phase, observed
/// generation, exports, deploy item observations) and the controller
/// persists the result. A successful `reconcile` is expected to
/// clear `status.last_error`; the controller merges errors but never clears
/// them on the backend's behalf.
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Perform the substantive reconciliation of the execution's deploy
    /// items, driving `status.phase` toward `Completed`.
    fn reconcile(&self, token: &CancelToken, exec: &mut Execution) -> Result<(), RuntimeError>;

    /// Tear down the execution's workload. Returning `Ok` means teardown is
    /// complete and the controller may release the finalizer.
    fn delete(&self, token: &CancelToken, exec: &mut Execution) -> Result<(), RuntimeError>;

    /// Check whether any constituent deploy item changed phase or
    /// generation since last observed, updating `status` accordingly.
    /// Used by the completed-phase fast path to skip no-op invocations.
    fn handle_deploy_item_changes(
        &self,
        token: &CancelToken,
        exec: &mut Execution,
    ) -> Result<bool, RuntimeError>;
}
