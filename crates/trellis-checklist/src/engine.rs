//! Checklist action dispatch.
//!
//! The engine wraps an [`ExecutionStore`] with the client-side contracts
//! around step actions: legality pre-checks against the derived checklist,
//! in-flight suppression keyed by `(instance, step, action)`, the
//! `WORKFLOW_GATED` blockers cache, and the re-fetch-after-write
//! consistency rule.
//!
//! There is no client-side cancellation: a failed request clears its
//! pending flag and surfaces a classified error, so every action is safely
//! re-invokable by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use trellis_client::{
  AutomationRequest, ConflictCode, ExecutionStore, StoreError, TransitionRequest,
  VerificationRecord,
};
use trellis_template::{ActionKind, ChecklistSnapshot, InstanceId, Step, StepId, StepStatus};

use crate::derive::{derive_checklist, Checklist, StepView};
use crate::error::ActionError;
use crate::threads::{ReplyThreads, ThreadReply};
use crate::transition::is_allowed;

/// What kind of call is outstanding for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingAction {
  Transition(ActionKind),
  Automation,
  Verification,
}

impl PendingAction {
  fn name(&self) -> &'static str {
    match self {
      PendingAction::Transition(action) => action.as_str(),
      PendingAction::Automation => "automation",
      PendingAction::Verification => "verification",
    }
  }
}

#[derive(Debug, Default)]
struct EngineState {
  pending: HashSet<(InstanceId, StepId, PendingAction)>,
  blockers: HashMap<(InstanceId, StepId), Vec<String>>,
  verifications: HashMap<(InstanceId, StepId), VerificationRecord>,
  snapshots: HashMap<InstanceId, ChecklistSnapshot>,
  threads: ReplyThreads,
}

/// The checklist engine for one execution store.
///
/// Methods take `&self`; internal bookkeeping sits behind a mutex that is
/// never held across an await, so a shared engine can serve independent
/// actions on different steps concurrently while duplicate invocations of
/// the same action are suppressed.
pub struct ChecklistEngine<S> {
  store: S,
  state: Mutex<EngineState>,
}

impl<S: ExecutionStore> ChecklistEngine<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      state: Mutex::new(EngineState::default()),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  fn lock(&self) -> MutexGuard<'_, EngineState> {
    // Poisoning only marks a panic elsewhere; the bookkeeping itself is
    // valid, so recover the guard.
    self
      .state
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner)
  }

  /// Fetch the instance's checklist from the store and derive the render
  /// model. The fetched snapshot becomes the cache for pre-checks.
  pub async fn refresh(&self, instance: InstanceId) -> Result<Checklist, ActionError> {
    let snapshot = self.store.get_instance_checklist(instance).await?;
    let checklist = derive_checklist(&snapshot);
    self.lock().snapshots.insert(instance, snapshot);
    info!(instance = %instance, "checklist_refreshed");
    Ok(checklist)
  }

  /// The last derived checklist, if one has been fetched.
  pub fn cached_checklist(&self, instance: InstanceId) -> Option<Checklist> {
    self
      .lock()
      .snapshots
      .get(&instance)
      .map(derive_checklist)
  }

  /// Cached blockers for a step, populated verbatim from the last
  /// `WORKFLOW_GATED` rejection and cleared by the next successful action.
  pub fn blockers(&self, instance: InstanceId, step: StepId) -> Vec<String> {
    self
      .lock()
      .blockers
      .get(&(instance, step))
      .cloned()
      .unwrap_or_default()
  }

  /// Linkage metadata from the last successful external verification.
  pub fn verification(&self, instance: InstanceId, step: StepId) -> Option<VerificationRecord> {
    self.lock().verifications.get(&(instance, step)).cloned()
  }

  /// Complete a manual step.
  ///
  /// Pre-checks, in order: already completed (informational conflict),
  /// automated step (must go through the automation dispatch), gated
  /// (conflict carrying the blocking step names).
  #[instrument(name = "complete_step", skip(self))]
  pub async fn complete_step(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Checklist, ActionError> {
    let snapshot = self.snapshot(instance).await?;
    let checklist = derive_checklist(&snapshot);
    let (def, view) = resolve_step(&snapshot, &checklist, step)?;

    if view.status == StepStatus::Completed {
      return Err(
        StoreError::conflict(
          ConflictCode::StepAlreadyCompleted,
          format!("step '{}' is already completed", def.name),
        )
        .into(),
      );
    }
    if def.is_automated {
      return Err(
        StoreError::conflict(
          ConflictCode::AutomatedStepUseAutomationEndpoint,
          format!("step '{}' is automated and cannot be completed manually", def.name),
        )
        .into(),
      );
    }
    if view.status == StepStatus::Blocked {
      let blockers: Vec<String> = view
        .blocked_by
        .iter()
        .filter_map(|id| checklist.view(*id))
        .map(|v| v.name.clone())
        .collect();
      return Err(ActionError::Store(StoreError::Conflict {
        code: ConflictCode::WorkflowGated,
        message: format!("step '{}' is blocked by unmet dependencies", def.name),
        blockers,
      }));
    }
    if !is_allowed(view.status, ActionKind::Complete) {
      return Err(ActionError::InvalidTransition {
        step,
        from: view.status,
        action: ActionKind::Complete,
      });
    }

    self
      .dispatch_transition(instance, step, TransitionRequest::action(ActionKind::Complete))
      .await
  }

  #[instrument(name = "start_step", skip(self))]
  pub async fn start_step(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Checklist, ActionError> {
    self
      .manual_transition(instance, step, TransitionRequest::action(ActionKind::Start))
      .await
  }

  #[instrument(name = "block_step", skip(self, reason))]
  pub async fn block_step(
    &self,
    instance: InstanceId,
    step: StepId,
    reason: Option<String>,
  ) -> Result<Checklist, ActionError> {
    let mut request = TransitionRequest::action(ActionKind::Block);
    request.reason = reason;
    self.manual_transition(instance, step, request).await
  }

  #[instrument(name = "skip_step", skip(self, reason))]
  pub async fn skip_step(
    &self,
    instance: InstanceId,
    step: StepId,
    reason: Option<String>,
  ) -> Result<Checklist, ActionError> {
    let mut request = TransitionRequest::action(ActionKind::Skip);
    request.reason = reason;
    self.manual_transition(instance, step, request).await
  }

  /// Move a completed step back to ready. The refresh that follows
  /// re-derives every downstream step that the completion had unblocked.
  #[instrument(name = "revert_step", skip(self))]
  pub async fn revert_step(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Checklist, ActionError> {
    self
      .manual_transition(instance, step, TransitionRequest::action(ActionKind::Revert))
      .await
  }

  #[instrument(name = "assign_step", skip(self, assignee))]
  pub async fn assign_step(
    &self,
    instance: InstanceId,
    step: StepId,
    assignee: String,
  ) -> Result<Checklist, ActionError> {
    let mut request = TransitionRequest::action(ActionKind::Assign);
    request.assignee = Some(assignee);
    self.manual_transition(instance, step, request).await
  }

  /// Invoke an automated step's handler. Used instead of `complete_step`
  /// for automated steps.
  #[instrument(name = "run_automation", skip(self, request))]
  pub async fn run_automation(
    &self,
    instance: InstanceId,
    step: StepId,
    request: AutomationRequest,
  ) -> Result<Checklist, ActionError> {
    let snapshot = self.snapshot(instance).await?;
    let def = step_def(&snapshot, step)?;
    if !def.is_automated {
      return Err(ActionError::NotAutomated(step));
    }

    self.begin(instance, step, PendingAction::Automation)?;
    let correlation = Uuid::new_v4();
    info!(
      correlation = %correlation,
      instance = %instance,
      step = %step,
      intent = %request.intent,
      "automation_dispatched"
    );

    let result = self.store.run_step_automation(instance, step, &request).await;
    self.finish(instance, step, PendingAction::Automation);

    match result {
      Ok(outcome) => {
        info!(
          correlation = %correlation,
          status = ?outcome.status,
          "automation_succeeded"
        );
        self.lock().blockers.remove(&(instance, step));
        self.refresh(instance).await
      }
      Err(error) => {
        warn!(correlation = %correlation, error = %error, "automation_failed");
        Err(self.note_failure(instance, step, error))
      }
    }
  }

  /// Run the external-system existence check for a verification gate.
  /// Success completes the step and stores the returned linkage metadata
  /// for display.
  #[instrument(name = "run_external_verification", skip(self, identifiers))]
  pub async fn run_external_verification(
    &self,
    instance: InstanceId,
    step: StepId,
    identifiers: HashMap<String, String>,
  ) -> Result<Checklist, ActionError> {
    let snapshot = self.snapshot(instance).await?;
    let def = step_def(&snapshot, step)?;
    if !def.is_verification_gate() {
      return Err(ActionError::NotVerificationGate(step));
    }
    if identifiers.is_empty() || identifiers.values().all(|v| v.trim().is_empty()) {
      return Err(
        StoreError::conflict(
          ConflictCode::MissingIdentifiers,
          "external verification requires at least one identifier",
        )
        .into(),
      );
    }

    self.begin(instance, step, PendingAction::Verification)?;
    let correlation = Uuid::new_v4();
    info!(
      correlation = %correlation,
      instance = %instance,
      step = %step,
      "verification_dispatched"
    );

    let result = self
      .store
      .run_external_verification(instance, step, &identifiers)
      .await;
    self.finish(instance, step, PendingAction::Verification);

    match result {
      Ok(record) => {
        info!(
          correlation = %correlation,
          external_id = %record.external_id,
          "verification_succeeded"
        );
        {
          let mut state = self.lock();
          state.verifications.insert((instance, step), record);
          state.blockers.remove(&(instance, step));
        }
        self.refresh(instance).await
      }
      Err(error) => {
        warn!(correlation = %correlation, error = %error, "verification_failed");
        Err(self.note_failure(instance, step, error))
      }
    }
  }

  #[instrument(name = "start_workflow", skip(self))]
  pub async fn start_workflow(&self, instance: InstanceId) -> Result<Checklist, ActionError> {
    self.store.start_workflow(instance).await?;
    info!(instance = %instance, "workflow_started");
    self.refresh(instance).await
  }

  /// Post a reply to a step's thread. This is the one optimistic path:
  /// the local thread gains the reply immediately; a failed post removes
  /// it again, and [`ChecklistEngine::refresh_replies`] reconciles.
  pub async fn post_reply(
    &self,
    instance: InstanceId,
    step: StepId,
    author: &str,
    body: &str,
  ) -> Result<(), ActionError> {
    self
      .lock()
      .threads
      .append_optimistic(instance, step, author, body);

    match self.store.post_step_reply(instance, step, body).await {
      Ok(_) => Ok(()),
      Err(error) => {
        self.lock().threads.remove_pending(instance, step, body);
        Err(error.into())
      }
    }
  }

  /// Background reconciliation for a step's reply thread.
  pub async fn refresh_replies(
    &self,
    instance: InstanceId,
    step: StepId,
  ) -> Result<Vec<ThreadReply>, ActionError> {
    let replies = self.store.get_step_replies(instance, step).await?;
    let mut state = self.lock();
    state.threads.reconcile(instance, step, replies);
    Ok(state.threads.get(instance, step).to_vec())
  }

  pub fn thread(&self, instance: InstanceId, step: StepId) -> Vec<ThreadReply> {
    self.lock().threads.get(instance, step).to_vec()
  }

  async fn manual_transition(
    &self,
    instance: InstanceId,
    step: StepId,
    request: TransitionRequest,
  ) -> Result<Checklist, ActionError> {
    let snapshot = self.snapshot(instance).await?;
    let checklist = derive_checklist(&snapshot);
    let (def, view) = resolve_step(&snapshot, &checklist, step)?;

    if def.is_automated {
      return Err(
        StoreError::conflict(
          ConflictCode::AutomatedStepUseAutomationEndpoint,
          format!(
            "step '{}' is automated; manual transitions are not valid",
            def.name
          ),
        )
        .into(),
      );
    }
    if !is_allowed(view.status, request.action) {
      return Err(ActionError::InvalidTransition {
        step,
        from: view.status,
        action: request.action,
      });
    }

    self.dispatch_transition(instance, step, request).await
  }

  async fn dispatch_transition(
    &self,
    instance: InstanceId,
    step: StepId,
    request: TransitionRequest,
  ) -> Result<Checklist, ActionError> {
    let action = PendingAction::Transition(request.action);
    self.begin(instance, step, action)?;

    let correlation = Uuid::new_v4();
    info!(
      correlation = %correlation,
      instance = %instance,
      step = %step,
      action = request.action.as_str(),
      "action_dispatched"
    );

    let result = self.store.transition_step(instance, step, &request).await;
    self.finish(instance, step, action);

    match result {
      Ok(()) => {
        info!(correlation = %correlation, "action_succeeded");
        self.lock().blockers.remove(&(instance, step));
        self.refresh(instance).await
      }
      Err(error) => {
        warn!(correlation = %correlation, error = %error, "action_failed");
        Err(self.note_failure(instance, step, error))
      }
    }
  }

  /// The cached snapshot for pre-checks, fetched on first use.
  async fn snapshot(&self, instance: InstanceId) -> Result<ChecklistSnapshot, ActionError> {
    if let Some(snapshot) = self.lock().snapshots.get(&instance).cloned() {
      return Ok(snapshot);
    }
    let snapshot = self.store.get_instance_checklist(instance).await?;
    self.lock().snapshots.insert(instance, snapshot.clone());
    Ok(snapshot)
  }

  fn begin(
    &self,
    instance: InstanceId,
    step: StepId,
    action: PendingAction,
  ) -> Result<(), ActionError> {
    let mut state = self.lock();
    if !state.pending.insert((instance, step, action)) {
      return Err(ActionError::AlreadyInFlight {
        step,
        action: action.name().to_string(),
      });
    }
    Ok(())
  }

  fn finish(&self, instance: InstanceId, step: StepId, action: PendingAction) {
    self.lock().pending.remove(&(instance, step, action));
  }

  /// Record a `WORKFLOW_GATED` rejection's blockers verbatim; the service
  /// is authoritative for gating, so the list is never recomputed locally.
  fn note_failure(&self, instance: InstanceId, step: StepId, error: StoreError) -> ActionError {
    if let StoreError::Conflict {
      code: ConflictCode::WorkflowGated,
      blockers,
      ..
    } = &error
    {
      self
        .lock()
        .blockers
        .insert((instance, step), blockers.clone());
    }
    error.into()
  }
}

fn step_def(snapshot: &ChecklistSnapshot, step: StepId) -> Result<&Step, ActionError> {
  snapshot
    .steps
    .iter()
    .find(|s| s.identifier == step)
    .ok_or(ActionError::UnknownStep(step))
}

fn resolve_step<'a>(
  snapshot: &'a ChecklistSnapshot,
  checklist: &'a Checklist,
  step: StepId,
) -> Result<(&'a Step, &'a StepView), ActionError> {
  let def = step_def(snapshot, step)?;
  let view = checklist
    .view(step)
    .ok_or(ActionError::UnknownStep(step))?;
  Ok((def, view))
}
