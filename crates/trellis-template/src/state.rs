use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::step::{Step, StepId};
use crate::template::ProgressMode;

/// Identifier of a running workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub i64);

impl fmt::Display for InstanceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Status of a step within a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  NotStarted,
  Ready,
  Blocked,
  InProgress,
  Completed,
  Skipped,
  Failed,
}

impl StepStatus {
  /// Terminal for normal flow; only `revert` leaves `Completed`.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      StepStatus::Completed | StepStatus::Skipped | StepStatus::Failed
    )
  }
}

/// Manual actions that can be requested on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
  Complete,
  Start,
  Block,
  Skip,
  Revert,
  Assign,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ActionKind::Complete => "complete",
      ActionKind::Start => "start",
      ActionKind::Block => "block",
      ActionKind::Skip => "skip",
      ActionKind::Revert => "revert",
      ActionKind::Assign => "assign",
    }
  }
}

/// One entry in an instance's action history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub step_id: StepId,
  pub action: String,
  pub actor: String,
  pub at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

/// Live per-instance execution state as reported by the backing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
  #[serde(default = "default_started")]
  pub started: bool,
  pub statuses: HashMap<StepId, StepStatus>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub history: Vec<HistoryEntry>,
  /// Reported percentage; when absent the checklist derives one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress_percent: Option<u8>,
}

fn default_started() -> bool {
  true
}

impl ExecutionState {
  pub fn status_of(&self, id: StepId) -> StepStatus {
    self
      .statuses
      .get(&id)
      .copied()
      .unwrap_or(StepStatus::NotStarted)
  }
}

/// Everything needed to render an instance's checklist: the persisted step
/// graph, the live status map, and the template's progress mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistSnapshot {
  pub instance: InstanceId,
  pub progress_mode: ProgressMode,
  pub steps: Vec<Step>,
  pub state: ExecutionState,
}
