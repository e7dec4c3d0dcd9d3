use serde::{Deserialize, Serialize};

use crate::step::{Step, StepId};

/// What kind of entity a workflow attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
  Course,
  Item,
}

/// Template-level policy controlling how far gating propagates downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
  /// An incomplete gate blocks every step with a larger sequence order.
  Strict,
  /// Only direct dependents are blocked; skipped steps satisfy
  /// dependencies.
  Loose,
  /// The backing service computes blocking itself; its statuses are
  /// passed through untouched.
  Legacy,
}

impl ProgressMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgressMode::Strict => "strict",
      ProgressMode::Loose => "loose",
      ProgressMode::Legacy => "legacy",
    }
  }
}

/// An edge in the template's transition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
  pub from: StepId,
  pub to: StepId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<serde_json::Value>,
  #[serde(rename = "type")]
  pub kind: TransitionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
  Sequential,
  Conditional,
}

/// A workflow template: an ordered list of steps plus dependency and
/// transition edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>,
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub description: String,
  pub workflow_type: WorkflowKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default = "default_active")]
  pub is_active: bool,
  /// Absent on templates created before progress modes existed; the
  /// validator refuses to save a template without one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress_mode: Option<ProgressMode>,
  #[serde(default)]
  pub steps: Vec<Step>,
  /// Placeholder feature, carried opaquely.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub conditions: Vec<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub transitions: Vec<Transition>,
}

fn default_active() -> bool {
  true
}

impl Template {
  /// Get a step by identifier.
  pub fn get_step(&self, id: StepId) -> Option<&Step> {
    self.steps.iter().find(|s| s.identifier == id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_progress_mode_wire_names() {
    assert_eq!(
      serde_json::to_value(ProgressMode::Legacy).unwrap(),
      serde_json::json!("legacy")
    );
    let mode: ProgressMode = serde_json::from_value(serde_json::json!("strict")).unwrap();
    assert_eq!(mode, ProgressMode::Strict);
  }

  #[test]
  fn test_template_defaults() {
    let template: Template = serde_json::from_value(serde_json::json!({
      "name": "Onboarding",
      "workflow_type": "course"
    }))
    .unwrap();
    assert!(template.is_active);
    assert!(template.progress_mode.is_none());
    assert!(template.steps.is_empty());
  }
}
