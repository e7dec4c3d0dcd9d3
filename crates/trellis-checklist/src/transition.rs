//! Per-step instance state machine.
//!
//! `not_started -> ready -> {completed | skipped | blocked | failed}`.
//! `blocked -> ready` happens automatically when a re-derivation finds the
//! unmet dependencies resolved; `completed -> ready` only via an explicit
//! revert.

use trellis_template::{ActionKind, StepStatus};

/// Whether `action` is a legal request for a step currently in `from`.
pub fn is_allowed(from: StepStatus, action: ActionKind) -> bool {
  match action {
    ActionKind::Complete => matches!(from, StepStatus::Ready | StepStatus::InProgress),
    ActionKind::Start => from == StepStatus::Ready,
    ActionKind::Block => matches!(
      from,
      StepStatus::NotStarted | StepStatus::Ready | StepStatus::InProgress
    ),
    ActionKind::Skip => matches!(
      from,
      StepStatus::NotStarted | StepStatus::Ready | StepStatus::InProgress
    ),
    ActionKind::Revert => from == StepStatus::Completed,
    // Assignment does not move the step; it is legal anywhere short of a
    // terminal state.
    ActionKind::Assign => !from.is_terminal(),
  }
}

/// The status a successful action lands in. `None` for actions that do
/// not move the step.
pub fn target_status(action: ActionKind) -> Option<StepStatus> {
  match action {
    ActionKind::Complete => Some(StepStatus::Completed),
    ActionKind::Start => Some(StepStatus::InProgress),
    ActionKind::Block => Some(StepStatus::Blocked),
    ActionKind::Skip => Some(StepStatus::Skipped),
    ActionKind::Revert => Some(StepStatus::Ready),
    ActionKind::Assign => None,
  }
}
