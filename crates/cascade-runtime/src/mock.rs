//! Scriptable in-memory backend for engine tests.

use crate::{ExecutionBackend, RuntimeError};
use cascade_api::{CancelToken, Execution, Phase};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Backend whose outcomes are scripted per call.
///
/// Each `reconcile` pops the front of the failure queue: a queued message
/// fails the call, an empty queue succeeds. Successful reconciles complete
/// the execution, stamp its observed generation, publish the configured
/// exports and clear any previous error. Deletes and deploy-item checks are
/// scripted the same way, succeeding by default.
pub struct MockBackend {
    exports: BTreeMap<String, Value>,
    reconcile_failures: Mutex<VecDeque<String>>,
    delete_failures: Mutex<VecDeque<String>>,
    deploy_item_changes: Mutex<VecDeque<bool>>,
    reconcile_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    change_checks: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            exports: BTreeMap::new(),
            reconcile_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
            deploy_item_changes: Mutex::new(VecDeque::new()),
            reconcile_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            change_checks: AtomicUsize::new(0),
        }
    }

    /// Set the exports published on every successful reconcile.
    pub fn with_exports(mut self, exports: BTreeMap<String, Value>) -> Self {
        self.exports = exports;
        self
    }

    /// Queue a failure for the next unscripted `reconcile` call.
    pub fn push_reconcile_failure(&self, message: impl Into<String>) {
        self.reconcile_failures
            .lock()
            .expect("mock poisoned")
            .push_back(message.into());
    }

    /// Queue a failure for the next unscripted `delete` call.
    pub fn push_delete_failure(&self, message: impl Into<String>) {
        self.delete_failures
            .lock()
            .expect("mock poisoned")
            .push_back(message.into());
    }

    /// Queue the result of the next deploy-item change check.
    pub fn push_deploy_item_change(&self, changed: bool) {
        self.deploy_item_changes
            .lock()
            .expect("mock poisoned")
            .push_back(changed);
    }

    pub fn reconcile_calls(&self) -> usize {
        self.reconcile_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn change_checks(&self) -> usize {
        self.change_checks.load(Ordering::SeqCst)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn reconcile(&self, token: &CancelToken, exec: &mut Execution) -> Result<(), RuntimeError> {
        self.reconcile_calls.fetch_add(1, Ordering::SeqCst);
        if token.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let scripted = self
            .reconcile_failures
            .lock()
            .expect("mock poisoned")
            .pop_front();
        if let Some(message) = scripted {
            exec.status.phase = Phase::Progressing;
            return Err(RuntimeError::ReconcileFailed(message));
        }
        exec.status.phase = Phase::Completed;
        exec.status.observed_generation = exec.meta.generation;
        exec.status.exports = self.exports.clone();
        exec.status.last_error = None;
        Ok(())
    }

    fn delete(&self, token: &CancelToken, exec: &mut Execution) -> Result<(), RuntimeError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if token.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let scripted = self
            .delete_failures
            .lock()
            .expect("mock poisoned")
            .pop_front();
        if let Some(message) = scripted {
            exec.status.phase = Phase::Progressing;
            return Err(RuntimeError::DeleteFailed(message));
        }
        Ok(())
    }

    fn handle_deploy_item_changes(
        &self,
        token: &CancelToken,
        exec: &mut Execution,
    ) -> Result<bool, RuntimeError> {
        self.change_checks.fetch_add(1, Ordering::SeqCst);
        if token.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let changed = self
            .deploy_item_changes
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .unwrap_or(false);
        if changed {
            // A constituent moved; the execution has to run through the
            // state machine again.
            exec.status.phase = Phase::Init;
        }
        Ok(changed)
    }
}
