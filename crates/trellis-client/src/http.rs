//! HTTP implementation of the template and execution stores.
//!
//! All requests are JSON with a bearer token. Recognized 409 bodies map to
//! [`StoreError::Conflict`]; anything else non-success maps to
//! [`StoreError::Server`].

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use trellis_template::{ChecklistSnapshot, ExecutionState, InstanceId, ProgressMode, Step, StepId, Template};

use crate::error::{ConflictCode, StoreError};
use crate::wire::{StepPayload, TemplatePayload};
use crate::{
  AutomationOutcome, AutomationRequest, ExecutionStore, Instance, InstanceFilters,
  InstanceSummary, Reply, TemplateFilters, TemplateStore, TemplateSummary, TransitionRequest,
  VerificationRecord,
};

/// Connection settings for the backing service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: Url,
  pub token: String,
}

/// The HTTP template/execution store client.
#[derive(Debug, Clone)]
pub struct HttpClient {
  http: reqwest::Client,
  config: ClientConfig,
}

/// Shape of the service's error responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  code: Option<String>,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  blockers: Vec<BlockerRef>,
}

#[derive(Debug, Deserialize)]
struct BlockerRef {
  message: String,
}

/// Wire shape of a checklist fetch.
#[derive(Debug, Deserialize)]
struct ChecklistPayload {
  instance: InstanceId,
  progress_mode: ProgressMode,
  steps: Vec<StepPayload>,
  state: ExecutionState,
}

impl HttpClient {
  pub fn new(config: ClientConfig) -> Self {
    Self {
      http: reqwest::Client::new(),
      config,
    }
  }

  fn url(&self, path: &str) -> Result<Url, StoreError> {
    Ok(self.config.base_url.join(path)?)
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, StoreError> {
    let response = self
      .http
      .get(self.url(path)?)
      .bearer_auth(&self.config.token)
      .query(query)
      .send()
      .await?;
    decode(response).await
  }

  async fn post_json<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, StoreError> {
    let response = self
      .http
      .post(self.url(path)?)
      .bearer_auth(&self.config.token)
      .json(body)
      .send()
      .await?;
    decode(response).await
  }

  async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), StoreError> {
    let response = self
      .http
      .post(self.url(path)?)
      .bearer_auth(&self.config.token)
      .json(body)
      .send()
      .await?;
    classify_empty(response).await
  }

  async fn put_json<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, StoreError> {
    let response = self
      .http
      .put(self.url(path)?)
      .bearer_auth(&self.config.token)
      .json(body)
      .send()
      .await?;
    decode(response).await
  }

  async fn delete(&self, path: &str) -> Result<(), StoreError> {
    let response = self
      .http
      .delete(self.url(path)?)
      .bearer_auth(&self.config.token)
      .send()
      .await?;
    classify_empty(response).await
  }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response.json().await?);
  }
  Err(classify_failure(status, response).await)
}

async fn classify_empty(response: Response) -> Result<(), StoreError> {
  let status = response.status();
  if status.is_success() {
    return Ok(());
  }
  Err(classify_failure(status, response).await)
}

/// Map a non-success response onto the error taxonomy. A 409 with a
/// recognized machine code becomes a conflict; everything else is a
/// generic server error.
async fn classify_failure(status: StatusCode, response: Response) -> StoreError {
  let text = response.text().await.unwrap_or_default();

  if status == StatusCode::CONFLICT {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
      if let Some(code) = body.code.as_deref().and_then(ConflictCode::parse) {
        return StoreError::Conflict {
          code,
          message: body.message.unwrap_or_else(|| code.as_str().to_string()),
          blockers: body.blockers.into_iter().map(|b| b.message).collect(),
        };
      }
    }
  }

  StoreError::Server {
    status: status.as_u16(),
    message: if text.is_empty() {
      status.to_string()
    } else {
      text
    },
  }
}

fn template_filter_query(filters: &TemplateFilters) -> Vec<(&'static str, String)> {
  let mut query = Vec::new();
  if let Some(kind) = filters.workflow_type {
    query.push((
      "workflow_type",
      serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default(),
    ));
  }
  if let Some(category) = &filters.category {
    query.push(("category", category.clone()));
  }
  if let Some(active) = filters.is_active {
    query.push(("is_active", if active { "1" } else { "0" }.to_string()));
  }
  if let Some(search) = &filters.search {
    query.push(("search", search.clone()));
  }
  query
}

fn instance_filter_query(filters: &InstanceFilters) -> Vec<(&'static str, String)> {
  let mut query = Vec::new();
  if let Some(template_id) = filters.template_id {
    query.push(("template_id", template_id.to_string()));
  }
  if let Some(status) = &filters.status {
    query.push(("status", status.clone()));
  }
  if let Some(search) = &filters.search {
    query.push(("search", search.clone()));
  }
  query
}

#[async_trait]
impl TemplateStore for HttpClient {
  async fn list_templates(
    &self,
    filters: &TemplateFilters,
  ) -> Result<Vec<TemplateSummary>, StoreError> {
    self
      .get_json("api/workflow-templates", &template_filter_query(filters))
      .await
  }

  async fn get_template(&self, id: i64) -> Result<Template, StoreError> {
    let payload: TemplatePayload = self
      .get_json(&format!("api/workflow-templates/{}", id), &[])
      .await?;
    Ok(payload.into())
  }

  async fn create_template(&self, data: &Template) -> Result<Template, StoreError> {
    let payload: TemplatePayload = self
      .post_json("api/workflow-templates", &TemplatePayload::from(data))
      .await?;
    Ok(payload.into())
  }

  async fn update_template(&self, id: i64, data: &Template) -> Result<Template, StoreError> {
    let payload: TemplatePayload = self
      .put_json(
        &format!("api/workflow-templates/{}", id),
        &TemplatePayload::from(data),
      )
      .await?;
    Ok(payload.into())
  }

  async fn delete_template(&self, id: i64) -> Result<(), StoreError> {
    self.delete(&format!("api/workflow-templates/{}", id)).await
  }

  async fn duplicate_template(&self, id: i64) -> Result<Template, StoreError> {
    let payload: TemplatePayload = self
      .post_json(
        &format!("api/workflow-templates/{}/duplicate", id),
        &serde_json::json!({}),
      )
      .await?;
    Ok(payload.into())
  }
}

#[async_trait]
impl ExecutionStore for HttpClient {
  async fn list_instances(
    &self,
    filters: &InstanceFilters,
  ) -> Result<Vec<InstanceSummary>, StoreError> {
    self
      .get_json("api/workflow-instances", &instance_filter_query(filters))
      .await
  }

  async fn get_instance(&self, id: InstanceId) -> Result<Instance, StoreError> {
    self
      .get_json(&format!("api/workflow-instances/{}", id), &[])
      .await
  }

  async fn get_instance_checklist(&self, id: InstanceId) -> Result<ChecklistSnapshot, StoreError> {
    let payload: ChecklistPayload = self
      .get_json(&format!("api/workflow-instances/{}/checklist", id), &[])
      .await?;
    Ok(ChecklistSnapshot {
      instance: payload.instance,
      progress_mode: payload.progress_mode,
      steps: payload.steps.into_iter().map(Step::from).collect(),
      state: payload.state,
    })
  }

  async fn transition_step(
    &self,
    instance: InstanceId,
    step: StepId,
    request: &TransitionRequest,
  ) -> Result<(), StoreError> {
    self
      .post_empty(
        &format!(
          "api/workflow-instances/{}/steps/{}/transition",
          instance, step
        ),
        request,
      )
      .await
  }

  async fn run_step_automation(
    &self,
    instance: InstanceId,
    step: StepId,
    request: &AutomationRequest,
  ) -> Result<AutomationOutcome, StoreError> {
    self
      .post_json(
        &format!(
          "api/workflow-instances/{}/steps/{}/automation",
          instance, step
        ),
        request,
      )
      .await
  }

  async fn run_external_verification(
    &self,
    instance: InstanceId,
    step: StepId,
    identifiers: &HashMap<String, String>,
  ) -> Result<VerificationRecord, StoreError> {
    self
      .post_json(
        &format!("api/workflow-instances/{}/steps/{}/verify", instance, step),
        identifiers,
      )
      .await
  }

  async fn start_workflow(&self, instance: InstanceId) -> Result<(), StoreError> {
    self
      .post_empty(
        &format!("api/workflow-instances/{}/start", instance),
        &serde_json::json!({}),
      )
      .await
  }

  async fn get_step_replies(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Vec<Reply>, StoreError> {
    self
      .get_json(
        &format!("api/workflow-instances/{}/steps/{}/replies", instance, step),
        &[],
      )
      .await
  }

  async fn post_step_reply(
    &self,
    instance: InstanceId,
    step: StepId,
    body: &str,
  ) -> Result<Reply, StoreError> {
    self
      .post_json(
        &format!("api/workflow-instances/{}/steps/{}/replies", instance, step),
        &serde_json::json!({ "body": body }),
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_conflict_body_parses_blocker_messages() {
    let body: ErrorBody = serde_json::from_str(
      r#"{"code":"WORKFLOW_GATED","message":"step is gated","blockers":[{"message":"Verify enrollment"},{"message":"Approve syllabus"}]}"#,
    )
    .unwrap();
    assert_eq!(body.code.as_deref(), Some("WORKFLOW_GATED"));
    let messages: Vec<String> = body.blockers.into_iter().map(|b| b.message).collect();
    assert_eq!(messages, vec!["Verify enrollment", "Approve syllabus"]);
  }

  #[test]
  fn test_filter_queries() {
    let filters = TemplateFilters {
      workflow_type: Some(trellis_template::WorkflowKind::Course),
      category: None,
      is_active: Some(true),
      search: Some("intake".to_string()),
    };
    let query = template_filter_query(&filters);
    assert_eq!(
      query,
      vec![
        ("workflow_type", "course".to_string()),
        ("is_active", "1".to_string()),
        ("search", "intake".to_string()),
      ]
    );
  }
}
