//! Wire payloads for the HTTP stores.
//!
//! The service encodes step flag booleans as `0/1` integers and
//! `depends_on` as a numeric identifier array. These payload types own
//! that encoding so the model types stay idiomatic.

use serde::{Deserialize, Serialize};

use trellis_template::{
  AutomationHandler, ProgressMode, Step, StepId, StepType, Template, Transition, WorkflowKind,
};

/// Serde helper for booleans carried as `0`/`1` on the wire. Plain JSON
/// booleans are also accepted on the way in.
pub mod int_bool {
  use serde::de::{self, Deserializer, Unexpected};
  use serde::Serializer;

  pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(*value as u8)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct Visitor;

    impl de::Visitor<'_> for Visitor {
      type Value = bool;

      fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("0, 1 or a boolean")
      }

      fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
        Ok(v)
      }

      fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
        match v {
          0 => Ok(false),
          1 => Ok(true),
          _ => Err(E::invalid_value(Unexpected::Unsigned(v), &self)),
        }
      }

      fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
        match v {
          0 => Ok(false),
          1 => Ok(true),
          _ => Err(E::invalid_value(Unexpected::Signed(v), &self)),
        }
      }
    }

    deserializer.deserialize_any(Visitor)
  }
}

/// A step as sent to and received from the template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPayload {
  pub id: i64,
  pub step_key: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "type")]
  pub step_type: StepType,
  pub sequence_order: u32,
  #[serde(with = "int_bool")]
  pub is_required: bool,
  #[serde(with = "int_bool")]
  pub is_gate: bool,
  #[serde(with = "int_bool", default)]
  pub is_automated: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub automation_handler: Option<String>,
  #[serde(default)]
  pub depends_on: Vec<i64>,
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

impl From<&Step> for StepPayload {
  fn from(step: &Step) -> Self {
    Self {
      id: step.identifier.0,
      step_key: step.key.clone(),
      name: step.name.clone(),
      description: step.description.clone(),
      step_type: step.step_type,
      sequence_order: step.sequence_order,
      is_required: step.is_required,
      is_gate: step.is_gate,
      is_automated: step.is_automated,
      automation_handler: step.automation_handler.as_ref().map(|h| h.to_string()),
      depends_on: step.depends_on.iter().map(|d| d.0).collect(),
      assigned_role: step.assigned_role.clone(),
      estimated_duration_minutes: step.estimated_duration_minutes,
      instructions: step.instructions.clone(),
      due_date_offset_days: step.due_date_offset_days,
      metadata: step.metadata.clone(),
      form_fields: step.form_fields.clone(),
    }
  }
}

impl From<StepPayload> for Step {
  fn from(payload: StepPayload) -> Self {
    Step {
      identifier: StepId(payload.id),
      key: payload.step_key,
      name: payload.name,
      description: payload.description,
      step_type: payload.step_type,
      sequence_order: payload.sequence_order,
      is_required: payload.is_required,
      is_gate: payload.is_gate,
      is_automated: payload.is_automated,
      automation_handler: payload
        .automation_handler
        .as_deref()
        .map(AutomationHandler::from_wire),
      depends_on: payload.depends_on.into_iter().map(StepId).collect(),
      assigned_role: payload.assigned_role,
      estimated_duration_minutes: payload.estimated_duration_minutes,
      instructions: payload.instructions,
      due_date_offset_days: payload.due_date_offset_days,
      metadata: payload.metadata,
      form_fields: payload.form_fields,
    }
  }
}

/// A template as exchanged with the template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>,
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub workflow_type: WorkflowKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(with = "int_bool")]
  pub is_active: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress_mode: Option<ProgressMode>,
  #[serde(default)]
  pub steps: Vec<StepPayload>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub conditions: Vec<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub transitions: Vec<Transition>,
}

impl From<&Template> for TemplatePayload {
  fn from(template: &Template) -> Self {
    Self {
      id: template.id,
      name: template.name.clone(),
      description: template.description.clone(),
      workflow_type: template.workflow_type,
      category: template.category.clone(),
      is_active: template.is_active,
      progress_mode: template.progress_mode,
      steps: template.steps.iter().map(StepPayload::from).collect(),
      conditions: template.conditions.clone(),
      transitions: template.transitions.clone(),
    }
  }
}

impl From<TemplatePayload> for Template {
  fn from(payload: TemplatePayload) -> Self {
    Template {
      id: payload.id,
      name: payload.name,
      description: payload.description,
      workflow_type: payload.workflow_type,
      category: payload.category,
      is_active: payload.is_active,
      progress_mode: payload.progress_mode,
      steps: payload.steps.into_iter().map(Step::from).collect(),
      conditions: payload.conditions,
      transitions: payload.transitions,
    }
  }
}
