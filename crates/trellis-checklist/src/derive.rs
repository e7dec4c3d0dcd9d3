//! Per-step status derivation.
//!
//! The backing service owns execution state; this is a faithful shadow of
//! its gating rules so the checklist can render without a round trip. A
//! step is ready only when every dependency is satisfied. How far blocking
//! propagates depends on the progress mode:
//!
//! - strict: an incomplete gate blocks every step with a larger sequence
//!   order, not only its direct dependents. Only `completed` satisfies a
//!   dependency.
//! - loose: only direct dependents are blocked; `skipped` also satisfies.
//! - legacy: the service's statuses are passed through untouched.

use serde::Serialize;

use trellis_template::{
  AutomationHandler, ChecklistSnapshot, InstanceId, ProgressMode, Step, StepId, StepStatus,
};

/// The derived render model for one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
  pub step_id: StepId,
  pub key: String,
  pub name: String,
  pub status: StepStatus,
  pub is_gate: bool,
  pub is_required: bool,
  pub is_automated: bool,
  /// Steps whose incompleteness keeps this one blocked. Empty unless
  /// `status` is `Blocked`, and always empty in legacy mode.
  pub blocked_by: Vec<StepId>,
  /// Whether the caller may dispatch an action on this step right now.
  pub can_act: bool,
  pub automation: Option<AutomationHandler>,
}

/// A derived checklist for one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checklist {
  pub instance: InstanceId,
  pub progress_mode: ProgressMode,
  pub views: Vec<StepView>,
  pub progress_percent: u8,
}

impl Checklist {
  pub fn view(&self, id: StepId) -> Option<&StepView> {
    self.views.iter().find(|v| v.step_id == id)
  }
}

/// Derive the per-step render model from a checklist snapshot.
pub fn derive_checklist(snapshot: &ChecklistSnapshot) -> Checklist {
  let mut steps: Vec<&Step> = snapshot.steps.iter().collect();
  steps.sort_by_key(|s| s.sequence_order);

  let views: Vec<StepView> = steps
    .iter()
    .map(|step| derive_step(step, &steps, snapshot))
    .collect();

  let derived_percent = progress_percent(&views);

  Checklist {
    instance: snapshot.instance,
    progress_mode: snapshot.progress_mode,
    views,
    progress_percent: snapshot.state.progress_percent.unwrap_or(derived_percent),
  }
}

fn derive_step(step: &Step, ordered: &[&Step], snapshot: &ChecklistSnapshot) -> StepView {
  let reported = snapshot.state.status_of(step.identifier);
  let mode = snapshot.progress_mode;

  let (status, blocked_by) = if mode == ProgressMode::Legacy || !snapshot.state.started {
    // Legacy defers to the service's own gating computation; an
    // unstarted instance has nothing to derive.
    (reported, Vec::new())
  } else if reported.is_terminal() || reported == StepStatus::InProgress {
    (reported, Vec::new())
  } else {
    let blocked_by = compute_blockers(step, ordered, snapshot);
    if blocked_by.is_empty() {
      (StepStatus::Ready, blocked_by)
    } else {
      (StepStatus::Blocked, blocked_by)
    }
  };

  StepView {
    step_id: step.identifier,
    key: step.key.clone(),
    name: step.name.clone(),
    status,
    is_gate: step.is_gate,
    is_required: step.is_required,
    is_automated: step.is_automated,
    blocked_by,
    can_act: snapshot.state.started
      && matches!(status, StepStatus::Ready | StepStatus::InProgress),
    automation: step.automation_handler.clone(),
  }
}

fn compute_blockers(step: &Step, ordered: &[&Step], snapshot: &ChecklistSnapshot) -> Vec<StepId> {
  let mode = snapshot.progress_mode;
  let mut blocked_by: Vec<StepId> = Vec::new();

  for dep in &step.depends_on {
    if !dependency_satisfied(snapshot.state.status_of(*dep), mode) {
      blocked_by.push(*dep);
    }
  }

  if mode == ProgressMode::Strict {
    // An incomplete gate blocks everything after it, dependency or not.
    // A skipped gate still blocks: only completion opens a gate.
    for earlier in ordered
      .iter()
      .filter(|s| s.sequence_order < step.sequence_order)
    {
      if earlier.is_gate
        && snapshot.state.status_of(earlier.identifier) != StepStatus::Completed
        && !blocked_by.contains(&earlier.identifier)
      {
        blocked_by.push(earlier.identifier);
      }
    }
  }

  blocked_by
}

fn dependency_satisfied(status: StepStatus, mode: ProgressMode) -> bool {
  match status {
    StepStatus::Completed => true,
    StepStatus::Skipped => mode == ProgressMode::Loose,
    _ => false,
  }
}

/// Percent of steps in a satisfied terminal state, floor-rounded.
fn progress_percent(views: &[StepView]) -> u8 {
  if views.is_empty() {
    return 0;
  }
  let done = views
    .iter()
    .filter(|v| matches!(v.status, StepStatus::Completed | StepStatus::Skipped))
    .count();
  ((done * 100) / views.len()) as u8
}
