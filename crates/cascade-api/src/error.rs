//! Persisted reconcile errors and the pure error-merge / phase-escalation
//! policy.
//!
//! Both functions are free of I/O: the controller threads timestamps in, so
//! tests can exercise the escalation threshold without waiting for it.

use crate::phase::Phase;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable classification of a reconcile error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Timeout,
    Unauthorized,
    Unrecoverable,
}

/// The last error observed for an installation or execution, persisted in
/// status so operators polling the object see the same message a warning
/// event carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastError {
    /// The lifecycle operation that failed, e.g. `Reconcile` or `Delete`.
    pub operation: String,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<ErrorCode>,
    /// When an error with this reason/message was first observed.
    pub last_transition_time: DateTime<Utc>,
    /// When the error was last observed.
    pub last_update_time: DateTime<Utc>,
}

impl LastError {
    pub fn new(
        operation: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
            message: message.into(),
            codes: Vec::new(),
            last_transition_time: now,
            last_update_time: now,
        }
    }

    pub fn with_codes(mut self, codes: Vec<ErrorCode>) -> Self {
        self.codes = codes;
        self
    }
}

impl std::fmt::Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.operation, self.reason, self.message)
    }
}

/// Merge a newly observed error into the previously recorded one.
///
/// The same error (reason and message unchanged) keeps its original
/// `last_transition_time`, so its age keeps accumulating toward the
/// escalation threshold; a different error restarts the clock.
pub fn try_update_error(prior: Option<LastError>, new: LastError) -> LastError {
    match prior {
        Some(prior) if prior.reason == new.reason && prior.message == new.message => LastError {
            last_transition_time: prior.last_transition_time,
            ..new
        },
        _ => new,
    }
}

/// Compute the next observable phase from the recorded error.
///
/// No error keeps the phase produced by the main reconcile. An error that
/// has persisted past `threshold` escalates to `Failed`; a younger error
/// keeps the prior phase, treated as still in progress and expected to
/// self-heal on the next retry.
pub fn phase_for_last_error(
    phase: Phase,
    last_error: Option<&LastError>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Phase {
    let Some(err) = last_error else {
        return phase;
    };
    if now.signed_duration_since(err.last_transition_time) >= threshold {
        Phase::Failed
    } else {
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn merge_same_error_keeps_transition_time() {
        let first = LastError::new("Reconcile", "ReconcileFailed", "boom", t0());
        let later = t0() + Duration::minutes(2);
        let second = LastError::new("Reconcile", "ReconcileFailed", "boom", later);

        let merged = try_update_error(Some(first), second);
        assert_eq!(merged.last_transition_time, t0());
        assert_eq!(merged.last_update_time, later);
    }

    #[test]
    fn merge_different_error_restarts_clock() {
        let first = LastError::new("Reconcile", "ReconcileFailed", "boom", t0());
        let later = t0() + Duration::minutes(2);
        let second = LastError::new("Reconcile", "ReconcileFailed", "other boom", later);

        let merged = try_update_error(Some(first), second);
        assert_eq!(merged.last_transition_time, later);
        assert_eq!(merged.message, "other boom");
    }

    #[test]
    fn merge_without_prior_takes_new() {
        let e = LastError::new("Delete", "DeleteFailed", "gone wrong", t0());
        let merged = try_update_error(None, e.clone());
        assert_eq!(merged, e);
    }

    #[test]
    fn no_error_keeps_phase() {
        let phase = phase_for_last_error(Phase::Progressing, None, Duration::minutes(5), t0());
        assert_eq!(phase, Phase::Progressing);
    }

    #[test]
    fn young_error_keeps_phase() {
        let err = LastError::new("Reconcile", "ReconcileFailed", "boom", t0());
        let now = t0() + Duration::minutes(3);
        let phase = phase_for_last_error(Phase::Progressing, Some(&err), Duration::minutes(5), now);
        assert_eq!(phase, Phase::Progressing);
    }

    #[test]
    fn persistent_error_escalates_to_failed() {
        let err = LastError::new("Reconcile", "ReconcileFailed", "boom", t0());
        let now = t0() + Duration::minutes(6);
        let phase = phase_for_last_error(Phase::Progressing, Some(&err), Duration::minutes(5), now);
        assert_eq!(phase, Phase::Failed);
    }

    #[test]
    fn escalation_at_exact_threshold() {
        let err = LastError::new("Reconcile", "ReconcileFailed", "boom", t0());
        let now = t0() + Duration::minutes(5);
        let phase = phase_for_last_error(Phase::Init, Some(&err), Duration::minutes(5), now);
        assert_eq!(phase, Phase::Failed);
    }

    #[test]
    fn last_error_display() {
        let err = LastError::new("Reconcile", "AddFinalizer", "update failed", t0());
        assert_eq!(err.to_string(), "Reconcile: AddFinalizer: update failed");
    }

    #[test]
    fn codes_serde_roundtrip() {
        let err = LastError::new("Reconcile", "ReconcileFailed", "boom", t0())
            .with_codes(vec![ErrorCode::Timeout, ErrorCode::Unrecoverable]);
        let json = serde_json::to_string(&err).unwrap();
        let back: LastError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.codes, vec![ErrorCode::Timeout, ErrorCode::Unrecoverable]);
    }
}
