//! Trellis Template
//!
//! This crate contains the serializable workflow template types for Trellis.
//! These types represent templates as they are edited in the builder and as
//! they are exchanged with the backing service, before they are sanitized
//! and validated by `trellis-graph`.
//!
//! Templates can be loaded from:
//! - JSON files (via CLI with `trellis validate template.json`)
//! - The template store (as JSON payloads)

mod handler;
mod state;
mod step;
mod template;

pub use handler::AutomationHandler;
pub use state::{ActionKind, ChecklistSnapshot, ExecutionState, HistoryEntry, InstanceId, StepStatus};
pub use step::{Step, StepId, StepIdAllocator, StepType};
pub use template::{ProgressMode, Template, Transition, TransitionKind, WorkflowKind};
