//! Integration tests for ChecklistEngine against a scripted in-memory
//! execution store.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use trellis_checklist::{target_status, ActionError, ChecklistEngine};
use trellis_client::{
  AutomationOutcome, AutomationRequest, ConflictCode, ExecutionStore, Instance, InstanceFilters,
  InstanceSummary, Reply, StoreError, TransitionRequest, VerificationRecord,
};
use trellis_template::{
  ChecklistSnapshot, ExecutionState, InstanceId, ProgressMode, Step, StepId, StepStatus,
};

const INSTANCE: InstanceId = InstanceId(11);

fn step(id: i64, order: u32, deps: &[i64]) -> Step {
  let mut s = Step::new(StepId(id), order);
  s.key = format!("k{}", id);
  s.name = format!("Step {}", id);
  s.depends_on = deps.iter().map(|d| StepId(*d)).collect();
  s
}

fn snapshot(
  mode: ProgressMode,
  steps: Vec<Step>,
  statuses: &[(i64, StepStatus)],
) -> ChecklistSnapshot {
  ChecklistSnapshot {
    instance: INSTANCE,
    progress_mode: mode,
    steps,
    state: ExecutionState {
      started: true,
      statuses: statuses.iter().map(|(id, st)| (StepId(*id), *st)).collect(),
      history: Vec::new(),
      progress_percent: None,
    },
  }
}

#[derive(Default)]
struct MockState {
  snapshot: Option<ChecklistSnapshot>,
  transition_results: VecDeque<Result<(), StoreError>>,
  transition_calls: usize,
  checklist_fetches: usize,
  automation_calls: usize,
  verification_calls: usize,
  replies: Vec<Reply>,
  in_transition: bool,
}

/// Execution store double. Transitions succeed by default (updating the
/// held snapshot per the action's target status); tests can queue
/// rejections, and an optional gate holds transitions in flight.
struct MockStore {
  state: Mutex<MockState>,
  gate: Option<Arc<Notify>>,
}

impl MockStore {
  fn new(snapshot: ChecklistSnapshot) -> Self {
    Self {
      state: Mutex::new(MockState {
        snapshot: Some(snapshot),
        ..MockState::default()
      }),
      gate: None,
    }
  }

  fn with_gate(mut self) -> Self {
    self.gate = Some(Arc::new(Notify::new()));
    self
  }

  fn queue_transition_error(&self, error: StoreError) {
    self
      .state
      .lock()
      .unwrap()
      .transition_results
      .push_back(Err(error));
  }

  fn release_gate(&self) {
    if let Some(gate) = &self.gate {
      gate.notify_one();
    }
  }

  fn transition_calls(&self) -> usize {
    self.state.lock().unwrap().transition_calls
  }

  fn checklist_fetches(&self) -> usize {
    self.state.lock().unwrap().checklist_fetches
  }

  fn in_transition(&self) -> bool {
    self.state.lock().unwrap().in_transition
  }
}

#[async_trait]
impl ExecutionStore for MockStore {
  async fn list_instances(
    &self,
    _filters: &InstanceFilters,
  ) -> Result<Vec<InstanceSummary>, StoreError> {
    Ok(Vec::new())
  }

  async fn get_instance(&self, id: InstanceId) -> Result<Instance, StoreError> {
    Ok(Instance {
      id,
      template_id: 1,
      subject: "Course 101".to_string(),
      status: "active".to_string(),
      started: true,
    })
  }

  async fn get_instance_checklist(&self, _id: InstanceId) -> Result<ChecklistSnapshot, StoreError> {
    let mut state = self.state.lock().unwrap();
    state.checklist_fetches += 1;
    state.snapshot.clone().ok_or(StoreError::Server {
      status: 404,
      message: "no snapshot".to_string(),
    })
  }

  async fn transition_step(
    &self,
    _instance: InstanceId,
    step: StepId,
    request: &TransitionRequest,
  ) -> Result<(), StoreError> {
    self.state.lock().unwrap().in_transition = true;
    if let Some(gate) = &self.gate {
      gate.notified().await;
    }

    let mut state = self.state.lock().unwrap();
    state.in_transition = false;
    state.transition_calls += 1;

    if let Some(result) = state.transition_results.pop_front() {
      return result;
    }

    if let (Some(snapshot), Some(target)) = (&mut state.snapshot, target_status(request.action)) {
      snapshot.state.statuses.insert(step, target);
    }
    Ok(())
  }

  async fn run_step_automation(
    &self,
    _instance: InstanceId,
    step: StepId,
    _request: &AutomationRequest,
  ) -> Result<AutomationOutcome, StoreError> {
    let mut state = self.state.lock().unwrap();
    state.automation_calls += 1;
    if let Some(snapshot) = &mut state.snapshot {
      snapshot.state.statuses.insert(step, StepStatus::Completed);
    }
    Ok(AutomationOutcome {
      status: StepStatus::Completed,
      output: serde_json::Value::Null,
    })
  }

  async fn run_external_verification(
    &self,
    _instance: InstanceId,
    step: StepId,
    identifiers: &HashMap<String, String>,
  ) -> Result<VerificationRecord, StoreError> {
    let mut state = self.state.lock().unwrap();
    state.verification_calls += 1;
    if let Some(snapshot) = &mut state.snapshot {
      snapshot.state.statuses.insert(step, StepStatus::Completed);
    }
    Ok(VerificationRecord {
      external_id: identifiers
        .get("external_id")
        .cloned()
        .unwrap_or_default(),
      verified_by: "system".to_string(),
      verified_at: Utc::now(),
    })
  }

  async fn start_workflow(&self, _instance: InstanceId) -> Result<(), StoreError> {
    let mut state = self.state.lock().unwrap();
    if let Some(snapshot) = &mut state.snapshot {
      snapshot.state.started = true;
    }
    Ok(())
  }

  async fn get_step_replies(
    &self,
    _instance: InstanceId,
    _step: StepId,
  ) -> Result<Vec<Reply>, StoreError> {
    Ok(self.state.lock().unwrap().replies.clone())
  }

  async fn post_step_reply(
    &self,
    _instance: InstanceId,
    _step: StepId,
    body: &str,
  ) -> Result<Reply, StoreError> {
    let mut state = self.state.lock().unwrap();
    let reply = Reply {
      id: Some(state.replies.len() as i64 + 1),
      author: "dana".to_string(),
      body: body.to_string(),
      at: Utc::now(),
    };
    state.replies.push(reply.clone());
    Ok(reply)
  }
}

fn two_ready_steps() -> ChecklistSnapshot {
  snapshot(
    ProgressMode::Loose,
    vec![step(1, 1, &[]), step(2, 2, &[])],
    &[(1, StepStatus::Ready), (2, StepStatus::Ready)],
  )
}

#[tokio::test]
async fn test_gated_rejection_populates_blockers_cache() {
  let store = MockStore::new(two_ready_steps());
  store.queue_transition_error(StoreError::Conflict {
    code: ConflictCode::WorkflowGated,
    message: "gated".to_string(),
    blockers: vec!["X".to_string()],
  });
  let engine = ChecklistEngine::new(store);

  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert_eq!(err.conflict_code(), Some(ConflictCode::WorkflowGated));
  assert_eq!(
    engine.blockers(INSTANCE, StepId(1)),
    vec!["X".to_string()]
  );

  // A later successful action on the same step clears the cache entry.
  engine.complete_step(INSTANCE, StepId(1)).await.unwrap();
  assert!(engine.blockers(INSTANCE, StepId(1)).is_empty());
}

#[tokio::test]
async fn test_completed_step_rejected_without_network_call() {
  let snap = snapshot(
    ProgressMode::Loose,
    vec![step(1, 1, &[])],
    &[(1, StepStatus::Completed)],
  );
  let engine = ChecklistEngine::new(MockStore::new(snap));

  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert_eq!(err.conflict_code(), Some(ConflictCode::StepAlreadyCompleted));
  assert!(err.is_informational());
  assert_eq!(engine.store().transition_calls(), 0);
}

#[tokio::test]
async fn test_automated_step_must_use_automation_dispatch() {
  let mut automated = step(1, 1, &[]);
  automated.is_automated = true;
  let snap = snapshot(
    ProgressMode::Loose,
    vec![automated],
    &[(1, StepStatus::Ready)],
  );
  let engine = ChecklistEngine::new(MockStore::new(snap));

  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert_eq!(
    err.conflict_code(),
    Some(ConflictCode::AutomatedStepUseAutomationEndpoint)
  );
  assert_eq!(engine.store().transition_calls(), 0);

  // The automation dispatch is the valid path and completes the step.
  let checklist = engine
    .run_automation(
      INSTANCE,
      StepId(1),
      AutomationRequest {
        intent: "run".to_string(),
        payload: serde_json::Value::Null,
      },
    )
    .await
    .unwrap();
  assert_eq!(
    checklist.view(StepId(1)).unwrap().status,
    StepStatus::Completed
  );
}

#[tokio::test]
async fn test_blocked_step_rejected_locally_with_blocker_names() {
  let mut gate = step(1, 1, &[]);
  gate.is_gate = true;
  gate.name = "Verify enrollment".to_string();
  let snap = snapshot(
    ProgressMode::Strict,
    vec![gate, step(2, 2, &[])],
    &[(1, StepStatus::Ready), (2, StepStatus::Ready)],
  );
  let engine = ChecklistEngine::new(MockStore::new(snap));

  let err = engine.complete_step(INSTANCE, StepId(2)).await.unwrap_err();
  match err {
    ActionError::Store(StoreError::Conflict { code, blockers, .. }) => {
      assert_eq!(code, ConflictCode::WorkflowGated);
      assert_eq!(blockers, vec!["Verify enrollment".to_string()]);
    }
    other => panic!("expected gated conflict, got {:?}", other),
  }
  assert_eq!(engine.store().transition_calls(), 0);
}

#[tokio::test]
async fn test_successful_action_refetches_checklist() {
  let engine = ChecklistEngine::new(MockStore::new(two_ready_steps()));
  engine.refresh(INSTANCE).await.unwrap();
  assert_eq!(engine.store().checklist_fetches(), 1);

  let checklist = engine.complete_step(INSTANCE, StepId(1)).await.unwrap();
  assert_eq!(
    checklist.view(StepId(1)).unwrap().status,
    StepStatus::Completed
  );
  // One initial fetch plus the re-fetch after the write.
  assert_eq!(engine.store().checklist_fetches(), 2);
}

#[tokio::test]
async fn test_same_action_suppressed_while_in_flight() {
  let store = MockStore::new(two_ready_steps()).with_gate();
  let engine = Arc::new(ChecklistEngine::new(store));
  engine.refresh(INSTANCE).await.unwrap();

  let background = {
    let engine = Arc::clone(&engine);
    tokio::spawn(async move { engine.complete_step(INSTANCE, StepId(1)).await })
  };

  // Wait until the first call is actually held inside the store.
  while !engine.store().in_transition() {
    tokio::task::yield_now().await;
  }

  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert!(matches!(err, ActionError::AlreadyInFlight { .. }));

  engine.store().release_gate();
  background.await.unwrap().unwrap();

  // The pending flag cleared; the action can be dispatched again.
  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert!(err.is_informational());
}

#[tokio::test]
async fn test_failed_action_clears_pending_flag() {
  let store = MockStore::new(two_ready_steps());
  store.queue_transition_error(StoreError::Server {
    status: 500,
    message: "boom".to_string(),
  });
  let engine = ChecklistEngine::new(store);

  let err = engine.complete_step(INSTANCE, StepId(1)).await.unwrap_err();
  assert!(matches!(err, ActionError::Store(StoreError::Server { .. })));

  // Safely re-invokable.
  engine.complete_step(INSTANCE, StepId(1)).await.unwrap();
  assert_eq!(engine.store().transition_calls(), 2);
}

#[tokio::test]
async fn test_external_verification_stores_linkage_metadata() {
  let mut gate = step(1, 1, &[]);
  gate.is_gate = true;
  gate.is_automated = true;
  gate.automation_handler = Some("external_verification:sis".parse().unwrap());
  let snap = snapshot(ProgressMode::Strict, vec![gate], &[(1, StepStatus::Ready)]);
  let engine = ChecklistEngine::new(MockStore::new(snap));

  // Missing identifiers are rejected before any network call.
  let err = engine
    .run_external_verification(INSTANCE, StepId(1), HashMap::new())
    .await
    .unwrap_err();
  assert_eq!(err.conflict_code(), Some(ConflictCode::MissingIdentifiers));

  let mut identifiers = HashMap::new();
  identifiers.insert("external_id".to_string(), "SIS-4411".to_string());
  let checklist = engine
    .run_external_verification(INSTANCE, StepId(1), identifiers)
    .await
    .unwrap();

  assert_eq!(
    checklist.view(StepId(1)).unwrap().status,
    StepStatus::Completed
  );
  let record = engine.verification(INSTANCE, StepId(1)).unwrap();
  assert_eq!(record.external_id, "SIS-4411");
  assert_eq!(record.verified_by, "system");
}

#[tokio::test]
async fn test_verification_rejected_on_plain_step() {
  let engine = ChecklistEngine::new(MockStore::new(two_ready_steps()));
  let err = engine
    .run_external_verification(INSTANCE, StepId(1), HashMap::new())
    .await
    .unwrap_err();
  assert!(matches!(err, ActionError::NotVerificationGate(StepId(1))));
}

#[tokio::test]
async fn test_revert_rederives_downstream_steps() {
  let snap = snapshot(
    ProgressMode::Loose,
    vec![step(1, 1, &[]), step(2, 2, &[1])],
    &[(1, StepStatus::Completed), (2, StepStatus::Ready)],
  );
  let engine = ChecklistEngine::new(MockStore::new(snap));

  let checklist = engine.revert_step(INSTANCE, StepId(1)).await.unwrap();
  assert_eq!(
    checklist.view(StepId(1)).unwrap().status,
    StepStatus::Ready
  );
  // Step 2 had been unblocked by the completion; the refresh re-derives
  // it as blocked again.
  let downstream = checklist.view(StepId(2)).unwrap();
  assert_eq!(downstream.status, StepStatus::Blocked);
  assert_eq!(downstream.blocked_by, vec![StepId(1)]);
}

#[tokio::test]
async fn test_optimistic_reply_then_reconcile() {
  let engine = ChecklistEngine::new(MockStore::new(two_ready_steps()));

  engine
    .post_reply(INSTANCE, StepId(1), "dana", "double-checked the roster")
    .await
    .unwrap();

  let thread = engine.thread(INSTANCE, StepId(1));
  assert_eq!(thread.len(), 1);
  assert!(thread[0].pending);

  let thread = engine.refresh_replies(INSTANCE, StepId(1)).await.unwrap();
  assert_eq!(thread.len(), 1);
  assert!(!thread[0].pending);
  assert_eq!(thread[0].reply.id, Some(1));
}
