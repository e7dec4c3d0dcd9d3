use thiserror::Error;

use trellis_client::{ConflictCode, StoreError};
use trellis_template::{ActionKind, StepId, StepStatus};

/// Errors surfaced by checklist action dispatch.
#[derive(Debug, Error)]
pub enum ActionError {
  /// The same action on the same step is already outstanding. The caller
  /// should disable, not queue.
  #[error("'{action}' already in flight for step {step}")]
  AlreadyInFlight { step: StepId, action: String },

  #[error("step not found in checklist: {0}")]
  UnknownStep(StepId),

  #[error("cannot {action:?} step {step} while it is {from:?}")]
  InvalidTransition {
    step: StepId,
    from: StepStatus,
    action: ActionKind,
  },

  #[error("step {0} is not automated")]
  NotAutomated(StepId),

  #[error("step {0} is not an external verification gate")]
  NotVerificationGate(StepId),

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl ActionError {
  /// `STEP_ALREADY_COMPLETED` is informational: retrying completion is an
  /// idempotent no-op and should not render as an error banner.
  pub fn is_informational(&self) -> bool {
    matches!(
      self,
      ActionError::Store(StoreError::Conflict {
        code: ConflictCode::StepAlreadyCompleted,
        ..
      })
    )
  }

  pub fn conflict_code(&self) -> Option<ConflictCode> {
    match self {
      ActionError::Store(e) => e.conflict_code(),
      _ => None,
    }
  }
}
