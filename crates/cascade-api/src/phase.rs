//! Lifecycle phases for installations and executions.

use serde::{Deserialize, Serialize};

/// Phase of an Installation or Execution.
///
/// `Completed`, `Failed`, and `DeleteFailed` are terminal for one
/// reconciliation pass but re-enterable: a new generation, a reconcile
/// annotation, or an upstream dependency change resets the unit to `Init`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Init,
    Progressing,
    Completed,
    Failed,
    DeleteFailed,
}

impl Phase {
    /// `true` only for `Completed`, the only phase safe to treat as a
    /// satisfied dependency.
    pub fn is_completed(self) -> bool {
        matches!(self, Phase::Completed)
    }

    /// `true` for any terminal phase, including failures.
    pub fn is_finished(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::DeleteFailed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Init => write!(f, "Init"),
            Phase::Progressing => write!(f, "Progressing"),
            Phase::Completed => write!(f, "Completed"),
            Phase::Failed => write!(f, "Failed"),
            Phase::DeleteFailed => write!(f, "DeleteFailed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_satisfies_dependencies() {
        assert!(Phase::Completed.is_completed());
        assert!(!Phase::Init.is_completed());
        assert!(!Phase::Progressing.is_completed());
        assert!(!Phase::Failed.is_completed());
        assert!(!Phase::DeleteFailed.is_completed());
    }

    #[test]
    fn finished_phases() {
        assert!(Phase::Completed.is_finished());
        assert!(Phase::Failed.is_finished());
        assert!(Phase::DeleteFailed.is_finished());
        assert!(!Phase::Init.is_finished());
        assert!(!Phase::Progressing.is_finished());
    }

    #[test]
    fn default_is_init() {
        assert_eq!(Phase::default(), Phase::Init);
    }

    #[test]
    fn display_matches_variant_names() {
        assert_eq!(Phase::DeleteFailed.to_string(), "DeleteFailed");
        assert_eq!(Phase::Progressing.to_string(), "Progressing");
    }
}
