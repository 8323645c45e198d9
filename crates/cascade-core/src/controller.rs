//! Phase state machine driving execution reconciliation.
//!
//! One invocation runs the full pipeline: annotation/generation
//! normalization, finalizer management, the teardown branch, the
//! completed-phase fast path, dependency gating via the import resolver,
//! the backend's substantive reconcile, force-reconcile annotation cleanup,
//! and finally the error-merge / phase-escalation policy with a single
//! conditional status write. Invocations for the same identity must not
//! run concurrently; the host's scheduler guarantees that.

use crate::{imports, CoreError};
use cascade_api::{
    phase_for_last_error, reconcile_trigger, try_update_error, CancelToken, Execution, LastError,
    ObjectRef, Operation, Phase, ReconcileTrigger, Resource, FINALIZER,
};
use cascade_runtime::ExecutionBackend;
use cascade_store::{Client, EventRecorder, EventType};
use chrono::{Duration, Utc};
use std::sync::Arc;

const DEFAULT_ERROR_THRESHOLD_MINUTES: i64 = 5;

pub struct ExecutionController {
    client: Client,
    backend: Arc<dyn ExecutionBackend>,
    recorder: Arc<dyn EventRecorder>,
    /// How long one error may persist before the phase escalates.
    error_threshold: Duration,
}

impl ExecutionController {
    pub fn new(
        client: Client,
        backend: Arc<dyn ExecutionBackend>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            client,
            backend,
            recorder,
            error_threshold: Duration::minutes(DEFAULT_ERROR_THRESHOLD_MINUTES),
        }
    }

    pub fn with_error_threshold(mut self, threshold: Duration) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Run one reconcile invocation for `target`.
    ///
    /// A vanished object is success-no-op. A status write conflict ends the
    /// invocation with an error; the host requeues on the resulting watch
    /// event instead of retrying in-process.
    pub fn reconcile(&self, token: &CancelToken, target: &ObjectRef) -> Result<(), CoreError> {
        if token.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let mut exec = match self.client.executions().get(target) {
            Ok(exec) => exec,
            Err(e) if e.is_not_found() => {
                tracing::debug!(object = %target, "execution vanished before reconcile");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if exec.meta.has_ignore_annotation() && exec.status.phase.is_completed() {
            tracing::debug!(object = %target, "ignore annotation set on completed execution, skipping");
            return Ok(());
        }

        let old_status = exec.status.clone();
        let is_delete = exec.meta.is_deleting();

        let primary = match self.ensure(token, &mut exec) {
            Ok(Outcome::Reclaimed) => return Ok(()),
            Ok(Outcome::Done) => None,
            Err(e) => Some(e),
        };
        let secondary = self.remove_force_reconcile_annotation(&mut exec).err();
        // a cleanup failure never overrides a primary reconcile error
        let last_error = primary.or(secondary);

        self.handle_error(&mut exec, &old_status, is_delete, last_error)
    }

    fn ensure(&self, token: &CancelToken, exec: &mut Execution) -> Result<Outcome, LastError> {
        let now = Utc::now();
        let object = exec.meta.object_ref();

        // Annotation/generation normalization: any trigger resets the unit
        // to Init. The plain reconcile annotation is consumed here; the
        // force-reconcile one stays visible through the whole pass.
        let trigger = reconcile_trigger(&exec.meta, exec.status.observed_generation);
        if trigger != ReconcileTrigger::None {
            exec.status.phase = Phase::Init;
            exec.status.observed_generation = exec.meta.generation;
            if exec.meta.has_operation(Operation::Reconcile) {
                exec.meta.remove_operation();
            }
            self.client
                .executions()
                .update(exec)
                .map_err(|e| LastError::new("Reconcile", "Normalize", e.to_string(), now))?;
            tracing::info!(object = %object, ?trigger, "reset to Init");
        }

        if !exec.meta.is_deleting() && !exec.meta.has_finalizer(FINALIZER) {
            exec.meta.add_finalizer(FINALIZER);
            self.client
                .executions()
                .update(exec)
                .map_err(|e| LastError::new("Reconcile", "AddFinalizer", e.to_string(), now))?;
        }

        if exec.meta.is_deleting() {
            self.backend
                .delete(token, exec)
                .map_err(|e| LastError::new("Delete", "DeleteFailed", e.to_string(), now))?;
            exec.meta.remove_finalizer(FINALIZER);
            exec.status.last_error = None;
            // with the last finalizer gone the store reclaims the object
            self.client
                .executions()
                .update(exec)
                .map_err(|e| LastError::new("Delete", "RemoveFinalizer", e.to_string(), now))?;
            tracing::info!(object = %object, "teardown complete, object reclaimed");
            return Ok(Outcome::Reclaimed);
        }

        // Completed fast path: skip the substantive reconcile unless a
        // constituent deploy item moved underneath us.
        if exec.status.phase.is_completed() {
            let changed = self
                .backend
                .handle_deploy_item_changes(token, exec)
                .map_err(|e| LastError::new("Reconcile", "DeployItemCheck", e.to_string(), now))?;
            if !changed {
                tracing::debug!(object = %object, "completed and unchanged, nothing to do");
                return Ok(Outcome::Done);
            }
            tracing::info!(object = %object, "deploy items changed, re-running reconcile");
        }

        // Forward progress is gated on the owning installation's data
        // dependencies; an execution without an owner runs unguarded.
        if let Some(owner) = exec.meta.owner.clone() {
            match self.client.installations().get(&owner) {
                Ok(inst) => {
                    let satisfied = imports::dependencies_satisfied(&self.client, token, &inst)
                        .map_err(|e| {
                            LastError::new("Reconcile", "CheckDependencies", e.to_string(), now)
                        })?;
                    if !satisfied {
                        tracing::info!(object = %object, owner = %owner, "upstream dependencies not settled, waiting");
                        return Ok(Outcome::Done);
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(LastError::new(
                        "Reconcile",
                        "CheckDependencies",
                        e.to_string(),
                        now,
                    ))
                }
            }
        }

        self.backend
            .reconcile(token, exec)
            .map_err(|e| LastError::new("Reconcile", "ReconcileFailed", e.to_string(), now))?;
        Ok(Outcome::Done)
    }

    /// Strip a residual force-reconcile annotation after the main work.
    fn remove_force_reconcile_annotation(&self, exec: &mut Execution) -> Result<(), LastError> {
        if !exec.meta.has_operation(Operation::ForceReconcile) {
            return Ok(());
        }
        let old = exec.clone();
        exec.meta.remove_operation();
        match self.client.executions().patch(exec, &old) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                // realign the copy with the store so a later whole-object
                // status write cannot strip the annotation as a side effect
                exec.meta.set_operation(Operation::ForceReconcile);
                let err = LastError::new(
                    "Reconcile",
                    "RemoveForceReconcileAnnotation",
                    e.to_string(),
                    Utc::now(),
                );
                self.recorder.event(
                    Execution::KIND,
                    &exec.meta.object_ref(),
                    EventType::Warning,
                    &err.reason,
                    &err.message,
                );
                Err(err)
            }
        }
    }

    /// Merge the invocation's error into status, compute the next phase,
    /// and write status back only if it changed.
    fn handle_error(
        &self,
        exec: &mut Execution,
        old_status: &cascade_api::ExecutionStatus,
        is_delete: bool,
        err: Option<LastError>,
    ) -> Result<(), CoreError> {
        let now = Utc::now();
        let object = exec.meta.object_ref();

        // An invocation without a new error leaves the recorded one in
        // place: the backend clears it on a successful reconcile, and the
        // policy below keeps aging it through waiting passes.
        if let Some(e) = err.clone() {
            let prior = exec.status.last_error.take();
            exec.status.last_error = Some(try_update_error(prior, e));
        }

        let mut phase = phase_for_last_error(
            exec.status.phase,
            exec.status.last_error.as_ref(),
            self.error_threshold,
            now,
        );
        if is_delete && phase == Phase::Failed {
            phase = Phase::DeleteFailed;
        }
        exec.status.phase = phase;

        if let Some(last) = &exec.status.last_error {
            tracing::error!(object = %object, phase = %phase, "{last}");
            self.recorder.event(
                Execution::KIND,
                &object,
                EventType::Warning,
                &last.reason,
                &last.message,
            );
        }

        if exec.status != *old_status {
            if let Err(store_err) = self.client.executions().update_status(exec) {
                if store_err.is_conflict() {
                    tracing::debug!(object = %object, "status write conflicted, deferring to next trigger");
                } else {
                    tracing::error!(object = %object, "status write failed: {store_err}");
                }
                return Err(store_err.into());
            }
        }

        match err {
            Some(e) => Err(CoreError::Reconcile(e)),
            None => Ok(()),
        }
    }
}

enum Outcome {
    /// The invocation ran to its natural end; status may need persisting.
    Done,
    /// Teardown finished and the object was reclaimed; nothing remains to
    /// write.
    Reclaimed,
}
