//! Trellis Graph
//!
//! This crate owns the builder-side step graph: an ordered list of steps
//! with dependency edges that must stay acyclic and internally consistent
//! across interactive edits.
//!
//! Key properties:
//! - Every operation is a pure transformation: it takes a graph value and
//!   returns a new one, never mutating shared state.
//! - Acyclicity is structural. A dependency may only point to a step
//!   strictly earlier in the current order, so no cycle detection is
//!   needed anywhere.
//! - A sanitize pass runs after every mutation and is idempotent.
//! - [`validate`] re-checks the same invariants once before persistence,
//!   as a last line of defense against edits that bypassed the model.

mod builder;
mod graph;
mod reconcile;
mod transitions;
mod validator;

pub use builder::{SaveError, TemplateBuilder};
pub use graph::{GraphError, StepGraph, StepPatch};
pub use reconcile::{reconcile_saved, IdMap};
pub use transitions::generate_sequential;
pub use validator::{validate, ValidationError};
