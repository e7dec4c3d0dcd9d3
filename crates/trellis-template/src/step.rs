use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handler::AutomationHandler;

/// Stable identifier for a step, independent of its position.
///
/// Identifiers are assigned once and never reused. The backing service
/// assigns positive identifiers on save; steps created in the builder carry
/// negative identifiers from a [`StepIdAllocator`] until the first save
/// reconciles them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub i64);

impl StepId {
  /// Whether this identifier was allocated locally and has not been
  /// persisted yet.
  pub fn is_local(&self) -> bool {
    self.0 < 0
  }
}

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Issues builder-local step identifiers.
///
/// Local identifiers count down from -1 so they can never collide with a
/// server-assigned identifier.
#[derive(Debug)]
pub struct StepIdAllocator {
  next: i64,
}

impl StepIdAllocator {
  pub fn new() -> Self {
    Self { next: -1 }
  }

  pub fn allocate(&mut self) -> StepId {
    let id = StepId(self.next);
    self.next -= 1;
    id
  }
}

impl Default for StepIdAllocator {
  fn default() -> Self {
    Self::new()
  }
}

/// The kind of work a step represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
  Action,
  Decision,
  Notification,
  Assignment,
  Approval,
}

impl Default for StepType {
  fn default() -> Self {
    StepType::Action
  }
}

/// A single step within a workflow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
  pub identifier: StepId,
  /// Human/machine label. Immutable once the step has been persisted.
  pub key: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  #[serde(rename = "type", default)]
  pub step_type: StepType,
  /// 1-based position within the template, contiguous with no gaps.
  pub sequence_order: u32,
  pub is_required: bool,
  pub is_gate: bool,
  #[serde(default)]
  pub is_automated: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub automation_handler: Option<AutomationHandler>,
  /// Identifiers of steps that must reach a satisfied terminal state
  /// before this step is ready. Only steps earlier in the sequence are
  /// valid entries; the graph sanitize pass enforces this.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub depends_on: Vec<StepId>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assigned_role: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub estimated_duration_minutes: Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instructions: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date_offset_days: Option<i32>,
  #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
  pub metadata: serde_json::Map<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub form_fields: Vec<serde_json::Value>,
}

impl Step {
  /// Create a default-initialized step at the given sequence position.
  pub fn new(identifier: StepId, sequence_order: u32) -> Self {
    Self {
      identifier,
      key: format!("step_{}", identifier.0.unsigned_abs()),
      name: "New step".to_string(),
      description: String::new(),
      step_type: StepType::default(),
      sequence_order,
      is_required: true,
      is_gate: false,
      is_automated: false,
      automation_handler: None,
      depends_on: Vec::new(),
      assigned_role: None,
      estimated_duration_minutes: None,
      instructions: None,
      due_date_offset_days: None,
      metadata: serde_json::Map::new(),
      form_fields: Vec::new(),
    }
  }

  /// Whether this step is completed by an external-system verification
  /// handler rather than a plain automation.
  pub fn is_verification_gate(&self) -> bool {
    self.is_gate
      && self
        .automation_handler
        .as_ref()
        .is_some_and(|h| h.is_external_verification())
  }
}
