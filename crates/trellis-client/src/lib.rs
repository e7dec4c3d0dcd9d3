//! Trellis Client
//!
//! This crate defines the abstract template and execution store interfaces
//! the rest of Trellis is written against, plus the HTTP implementation
//! (JSON over HTTP with bearer-token auth).
//!
//! The [`TemplateStore`] trait covers template CRUD; the
//! [`ExecutionStore`] trait covers running instances: checklist fetches,
//! step transitions, automation and external verification dispatch, and
//! step reply threads.

mod error;
mod http;
mod wire;

pub use error::{ConflictCode, StoreError};
pub use http::{ClientConfig, HttpClient};
pub use wire::{StepPayload, TemplatePayload};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trellis_template::{
  ActionKind, ChecklistSnapshot, InstanceId, StepId, StepStatus, Template, WorkflowKind,
};

/// Filters for listing templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workflow_type: Option<WorkflowKind>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

/// Filters for listing workflow instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceFilters {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template_id: Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
}

/// One row in a template listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
  pub id: i64,
  pub name: String,
  pub workflow_type: WorkflowKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  pub is_active: bool,
  pub step_count: u32,
}

/// One row in an instance listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSummary {
  pub id: InstanceId,
  pub template_id: i64,
  /// What the workflow runs against (a course or an item name).
  pub subject: String,
  pub status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress_percent: Option<u8>,
}

/// A single workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
  pub id: InstanceId,
  pub template_id: i64,
  pub subject: String,
  pub status: String,
  pub started: bool,
}

/// A manual step transition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
  pub action: ActionKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub assignee: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub step_data: Option<serde_json::Value>,
}

impl TransitionRequest {
  pub fn action(action: ActionKind) -> Self {
    Self {
      action,
      reason: None,
      assignee: None,
      step_data: None,
    }
  }
}

/// An automation invocation for an automated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRequest {
  pub intent: String,
  #[serde(default)]
  pub payload: serde_json::Value,
}

/// The service's report of an automation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationOutcome {
  pub status: StepStatus,
  #[serde(default)]
  pub output: serde_json::Value,
}

/// Linkage metadata returned by a successful external verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
  pub external_id: String,
  pub verified_by: String,
  pub verified_at: DateTime<Utc>,
}

/// One message in a step's reply thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<i64>,
  pub author: String,
  pub body: String,
  pub at: DateTime<Utc>,
}

/// Template CRUD against the backing service.
#[async_trait]
pub trait TemplateStore: Send + Sync {
  async fn list_templates(
    &self,
    filters: &TemplateFilters,
  ) -> Result<Vec<TemplateSummary>, StoreError>;

  async fn get_template(&self, id: i64) -> Result<Template, StoreError>;

  /// Create a template. The returned template carries server-assigned
  /// step identifiers; callers reconcile their local graph against it.
  async fn create_template(&self, data: &Template) -> Result<Template, StoreError>;

  async fn update_template(&self, id: i64, data: &Template) -> Result<Template, StoreError>;

  async fn delete_template(&self, id: i64) -> Result<(), StoreError>;

  async fn duplicate_template(&self, id: i64) -> Result<Template, StoreError>;
}

/// Operations on running workflow instances.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
  async fn list_instances(
    &self,
    filters: &InstanceFilters,
  ) -> Result<Vec<InstanceSummary>, StoreError>;

  async fn get_instance(&self, id: InstanceId) -> Result<Instance, StoreError>;

  async fn get_instance_checklist(&self, id: InstanceId) -> Result<ChecklistSnapshot, StoreError>;

  async fn transition_step(
    &self,
    instance: InstanceId,
    step: StepId,
    request: &TransitionRequest,
  ) -> Result<(), StoreError>;

  async fn run_step_automation(
    &self,
    instance: InstanceId,
    step: StepId,
    request: &AutomationRequest,
  ) -> Result<AutomationOutcome, StoreError>;

  async fn run_external_verification(
    &self,
    instance: InstanceId,
    step: StepId,
    identifiers: &std::collections::HashMap<String, String>,
  ) -> Result<VerificationRecord, StoreError>;

  async fn start_workflow(&self, instance: InstanceId) -> Result<(), StoreError>;

  async fn get_step_replies(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Vec<Reply>, StoreError>;

  async fn post_step_reply(
    &self,
    instance: InstanceId,
    step: StepId,
    body: &str,
  ) -> Result<Reply, StoreError>;
}
