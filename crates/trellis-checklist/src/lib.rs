//! Trellis Checklist
//!
//! Execution-time derivation and dispatch for workflow instances. Given a
//! persisted step graph and the live per-step status map, this crate
//! derives the checklist render model (ready/blocked/completed per step,
//! who blocks whom, what the user can act on) under the template's
//! progress mode, and dispatches step actions against the execution store.
//!
//! Consistency model: after any successful mutating action the engine
//! re-fetches the instance's checklist instead of merging local state. The
//! single exception is step reply threads, which append optimistically and
//! reconcile on the next refresh; the two strategies are deliberately kept
//! in separate types.

mod derive;
mod engine;
mod error;
mod threads;
mod transition;

pub use derive::{derive_checklist, Checklist, StepView};
pub use engine::ChecklistEngine;
pub use error::ActionError;
pub use threads::{ReplyThreads, ThreadReply};
pub use transition::{is_allowed, target_status};
