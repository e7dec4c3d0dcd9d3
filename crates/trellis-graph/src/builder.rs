//! Builder facade over the step graph.
//!
//! Holds the current template snapshot and its step graph, applies the
//! pure graph operations, and owns the save path: validate, regenerate the
//! default sequential transitions, persist, then reconcile local step
//! identifiers against the saved template.

use thiserror::Error;

use trellis_client::{StoreError, TemplateStore};
use trellis_template::{StepId, StepIdAllocator, Template};

use crate::graph::{GraphError, StepGraph, StepPatch};
use crate::reconcile::reconcile_saved;
use crate::transitions::generate_sequential;
use crate::validator::{validate, ValidationError};

/// Errors raised by [`TemplateBuilder::save`].
#[derive(Debug, Error)]
pub enum SaveError {
  /// Validation failed; nothing was sent to the store.
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Interactive editing session for one template.
pub struct TemplateBuilder {
  template: Template,
  graph: StepGraph,
  alloc: StepIdAllocator,
}

impl TemplateBuilder {
  /// Start editing a template. Its steps are normalized into a graph
  /// (ordered, renumbered, sanitized) immediately.
  pub fn new(mut template: Template) -> Self {
    let graph = StepGraph::from_steps(std::mem::take(&mut template.steps));
    Self {
      template,
      graph,
      alloc: StepIdAllocator::new(),
    }
  }

  pub fn graph(&self) -> &StepGraph {
    &self.graph
  }

  /// Insert a default-initialized step at `position` and return its
  /// builder-local identifier.
  pub fn add_step(&mut self, position: usize) -> StepId {
    let (graph, id) = self.graph.add_step(position, &mut self.alloc);
    self.graph = graph;
    id
  }

  pub fn update_step(&mut self, id: StepId, patch: StepPatch) -> Result<(), GraphError> {
    self.graph = self.graph.update_step(id, patch)?;
    Ok(())
  }

  pub fn delete_step(&mut self, id: StepId) -> Result<(), GraphError> {
    self.graph = self.graph.delete_step(id)?;
    Ok(())
  }

  pub fn reorder_steps(&mut self, order: &[StepId]) {
    self.graph = self.graph.reorder_steps(order);
  }

  /// The template as it would be persisted right now, with the default
  /// sequential transitions filled in.
  pub fn assembled(&self) -> Template {
    let mut template = self.template.clone();
    template.steps = self.graph.clone().into_steps();
    template.transitions = generate_sequential(&template.steps, &template.transitions);
    template
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    validate(&self.assembled())
  }

  /// Validate and persist. A validation failure blocks the save entirely;
  /// nothing reaches the store. On success the saved template becomes
  /// canonical: server-assigned step identifiers replace local ones
  /// without breaking `depends_on` references.
  pub async fn save<S: TemplateStore>(&mut self, store: &S) -> Result<Template, SaveError> {
    let template = self.assembled();
    validate(&template)?;

    let saved = match template.id {
      Some(id) => store.update_template(id, &template).await?,
      None => store.create_template(&template).await?,
    };

    let (graph, _) = reconcile_saved(&self.graph, &saved);
    self.graph = graph;
    self.template.id = saved.id;
    self.template.transitions = saved.transitions.clone();

    Ok(saved)
  }
}
