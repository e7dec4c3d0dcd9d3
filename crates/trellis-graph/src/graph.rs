use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use trellis_template::{AutomationHandler, Step, StepId, StepIdAllocator, StepType};

/// Errors raised by graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("step not found: {0}")]
  StepNotFound(StepId),

  #[error("step key is immutable once persisted: {0}")]
  KeyImmutable(StepId),
}

/// A field-wise update to a single step.
///
/// `None` leaves the field untouched. `automation_handler` and the other
/// optional step fields use a nested `Option` so a patch can also clear
/// them.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
  pub key: Option<String>,
  pub name: Option<String>,
  pub description: Option<String>,
  pub step_type: Option<StepType>,
  pub is_required: Option<bool>,
  pub is_gate: Option<bool>,
  pub is_automated: Option<bool>,
  pub automation_handler: Option<Option<AutomationHandler>>,
  pub depends_on: Option<Vec<StepId>>,
  pub assigned_role: Option<Option<String>>,
  pub estimated_duration_minutes: Option<Option<u32>>,
  pub instructions: Option<Option<String>>,
  pub due_date_offset_days: Option<Option<i32>>,
  pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
  pub form_fields: Option<Vec<serde_json::Value>>,
}

/// An ordered list of steps with dependency edges.
///
/// All operations return a new graph value; the input is never mutated.
/// After every operation the result is renumbered (`sequence_order` is
/// exactly `1..=N`) and sanitized (dependencies only point strictly
/// earlier).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepGraph {
  steps: Vec<Step>,
}

impl StepGraph {
  /// Build a graph from loaded steps.
  ///
  /// Steps are ordered by their stored `sequence_order`, renumbered and
  /// sanitized, so a graph is internally consistent even when the loaded
  /// data was not.
  pub fn from_steps(mut steps: Vec<Step>) -> Self {
    steps.sort_by_key(|s| s.sequence_order);
    Self { steps }.renumbered().sanitize()
  }

  pub fn steps(&self) -> &[Step] {
    &self.steps
  }

  pub fn into_steps(self) -> Vec<Step> {
    self.steps
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// Get a step by identifier.
  pub fn get(&self, id: StepId) -> Option<&Step> {
    self.steps.iter().find(|s| s.identifier == id)
  }

  /// Insert a default-initialized step at `position` (clamped to the end)
  /// and return the new graph along with the new step's identifier.
  pub fn add_step(&self, position: usize, alloc: &mut StepIdAllocator) -> (StepGraph, StepId) {
    let id = alloc.allocate();
    let position = position.min(self.steps.len());

    let mut steps = self.steps.clone();
    steps.insert(position, Step::new(id, 0));

    let graph = StepGraph { steps }.renumbered().sanitize();
    (graph, id)
  }

  /// Merge `patch` into the step with identifier `id`.
  ///
  /// Changing `key` is rejected once the step has been persisted. A
  /// patched dependency list has self-references removed before the
  /// sanitize pass runs.
  pub fn update_step(&self, id: StepId, patch: StepPatch) -> Result<StepGraph, GraphError> {
    let index = self
      .steps
      .iter()
      .position(|s| s.identifier == id)
      .ok_or(GraphError::StepNotFound(id))?;

    let mut steps = self.steps.clone();
    let step = &mut steps[index];

    if let Some(key) = patch.key {
      if !step.identifier.is_local() && key != step.key {
        return Err(GraphError::KeyImmutable(id));
      }
      step.key = key;
    }
    if let Some(name) = patch.name {
      step.name = name;
    }
    if let Some(description) = patch.description {
      step.description = description;
    }
    if let Some(step_type) = patch.step_type {
      step.step_type = step_type;
    }
    if let Some(is_required) = patch.is_required {
      step.is_required = is_required;
    }
    if let Some(is_gate) = patch.is_gate {
      step.is_gate = is_gate;
      // A gate must be required; flipping the flag on enforces it.
      if is_gate {
        step.is_required = true;
      }
    }
    if let Some(is_automated) = patch.is_automated {
      step.is_automated = is_automated;
    }
    if let Some(handler) = patch.automation_handler {
      step.automation_handler = handler;
    }
    if let Some(mut depends_on) = patch.depends_on {
      depends_on.retain(|dep| *dep != id);
      step.depends_on = depends_on;
    }
    if let Some(assigned_role) = patch.assigned_role {
      step.assigned_role = assigned_role;
    }
    if let Some(minutes) = patch.estimated_duration_minutes {
      step.estimated_duration_minutes = minutes;
    }
    if let Some(instructions) = patch.instructions {
      step.instructions = instructions;
    }
    if let Some(offset) = patch.due_date_offset_days {
      step.due_date_offset_days = offset;
    }
    if let Some(metadata) = patch.metadata {
      step.metadata = metadata;
    }
    if let Some(form_fields) = patch.form_fields {
      step.form_fields = form_fields;
    }

    Ok(StepGraph { steps }.sanitize())
  }

  /// Remove the step with identifier `id`, renumber the remainder and
  /// prune every dependency that referenced it or that the renumbering
  /// made forward-pointing.
  pub fn delete_step(&self, id: StepId) -> Result<StepGraph, GraphError> {
    if self.get(id).is_none() {
      return Err(GraphError::StepNotFound(id));
    }

    let steps: Vec<Step> = self
      .steps
      .iter()
      .filter(|s| s.identifier != id)
      .cloned()
      .collect();

    Ok(StepGraph { steps }.renumbered().sanitize())
  }

  /// Reassign `sequence_order` per the given identifier order.
  ///
  /// Unknown identifiers are ignored; steps absent from `order` keep
  /// their relative order after the mentioned ones.
  pub fn reorder_steps(&self, order: &[StepId]) -> StepGraph {
    let mut remaining: Vec<Step> = self.steps.clone();
    let mut steps: Vec<Step> = Vec::with_capacity(remaining.len());

    for id in order {
      if let Some(index) = remaining.iter().position(|s| s.identifier == *id) {
        steps.push(remaining.remove(index));
      }
    }
    steps.append(&mut remaining);

    StepGraph { steps }.renumbered().sanitize()
  }

  /// Drop every dependency that does not resolve to a strictly earlier
  /// step, and deduplicate the rest. Idempotent.
  pub fn sanitize(&self) -> StepGraph {
    let index_of: HashMap<StepId, usize> = self
      .steps
      .iter()
      .enumerate()
      .map(|(i, s)| (s.identifier, i))
      .collect();

    let steps = self
      .steps
      .iter()
      .enumerate()
      .map(|(i, step)| {
        let mut step = step.clone();
        let mut seen: Vec<StepId> = Vec::with_capacity(step.depends_on.len());
        step.depends_on.retain(|dep| {
          let earlier = index_of.get(dep).is_some_and(|&j| j < i);
          let fresh = !seen.contains(dep);
          if earlier && fresh {
            seen.push(*dep);
          }
          earlier && fresh
        });
        step
      })
      .collect();

    StepGraph { steps }
  }

  /// Rewrite identifiers per `map`, both step identities and every
  /// `depends_on` entry. Identifiers absent from the map are kept.
  pub fn remap_ids(&self, map: &HashMap<StepId, StepId>) -> StepGraph {
    let remap = |id: StepId| map.get(&id).copied().unwrap_or(id);

    let steps = self
      .steps
      .iter()
      .map(|step| {
        let mut step = step.clone();
        step.identifier = remap(step.identifier);
        step.depends_on = step.depends_on.iter().copied().map(remap).collect();
        step
      })
      .collect();

    StepGraph { steps }
  }

  fn renumbered(mut self) -> StepGraph {
    for (i, step) in self.steps.iter_mut().enumerate() {
      step.sequence_order = (i + 1) as u32;
    }
    self
  }
}
