//! Pre-save validation of a complete template.
//!
//! The graph model keeps these invariants proactively; the validator
//! re-checks them once before persistence to catch any path that bypassed
//! the model, such as a raw edit to loaded data. Checks run in a fixed
//! order and return on the first failure.

use std::collections::HashSet;

use thiserror::Error;

use trellis_template::{Step, Template};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("template name is required")]
  EmptyName,

  #[error("template must have at least one step")]
  NoSteps,

  #[error("progress mode must be one of strict, loose, legacy")]
  ProgressModeUnset,

  #[error("step '{step}' is a gate and must be required")]
  GateNotRequired { step: String },

  #[error("step '{step}' lists the same dependency more than once")]
  DuplicateDependency { step: String },

  #[error("step '{step}' depends on unknown step {dependency}")]
  UnknownDependency {
    step: String,
    dependency: trellis_template::StepId,
  },

  #[error("step '{step}' depends on itself")]
  SelfDependency { step: String },

  #[error("step '{step}' depends on '{dependency}', which does not come before it")]
  DependencyOrder { step: String, dependency: String },
}

/// Validate a template against the graph invariants. Fail-fast: the first
/// violated check is returned and later checks do not run.
pub fn validate(template: &Template) -> Result<(), ValidationError> {
  validate_name(template)?;
  validate_has_steps(template)?;
  validate_progress_mode(template)?;
  validate_gates_required(template)?;
  validate_no_duplicate_dependencies(template)?;
  validate_dependencies_known(template)?;
  validate_no_self_dependencies(template)?;
  validate_dependency_ordering(template)?;
  Ok(())
}

fn validate_name(template: &Template) -> Result<(), ValidationError> {
  if template.name.trim().is_empty() {
    return Err(ValidationError::EmptyName);
  }
  Ok(())
}

fn validate_has_steps(template: &Template) -> Result<(), ValidationError> {
  if template.steps.is_empty() {
    return Err(ValidationError::NoSteps);
  }
  Ok(())
}

fn validate_progress_mode(template: &Template) -> Result<(), ValidationError> {
  if template.progress_mode.is_none() {
    return Err(ValidationError::ProgressModeUnset);
  }
  Ok(())
}

fn validate_gates_required(template: &Template) -> Result<(), ValidationError> {
  for step in &template.steps {
    if step.is_gate && !step.is_required {
      return Err(ValidationError::GateNotRequired {
        step: label(step),
      });
    }
  }
  Ok(())
}

fn validate_no_duplicate_dependencies(template: &Template) -> Result<(), ValidationError> {
  for step in &template.steps {
    let mut seen = HashSet::new();
    for dep in &step.depends_on {
      if !seen.insert(dep) {
        return Err(ValidationError::DuplicateDependency {
          step: label(step),
        });
      }
    }
  }
  Ok(())
}

fn validate_dependencies_known(template: &Template) -> Result<(), ValidationError> {
  for step in &template.steps {
    for dep in &step.depends_on {
      if template.get_step(*dep).is_none() {
        return Err(ValidationError::UnknownDependency {
          step: label(step),
          dependency: *dep,
        });
      }
    }
  }
  Ok(())
}

fn validate_no_self_dependencies(template: &Template) -> Result<(), ValidationError> {
  for step in &template.steps {
    if step.depends_on.contains(&step.identifier) {
      return Err(ValidationError::SelfDependency {
        step: label(step),
      });
    }
  }
  Ok(())
}

fn validate_dependency_ordering(template: &Template) -> Result<(), ValidationError> {
  for step in &template.steps {
    for dep in &step.depends_on {
      let Some(dependency) = template.get_step(*dep) else {
        continue;
      };
      if dependency.sequence_order >= step.sequence_order {
        return Err(ValidationError::DependencyOrder {
          step: label(step),
          dependency: label(dependency),
        });
      }
    }
  }
  Ok(())
}

fn label(step: &Step) -> String {
  if step.name.is_empty() {
    step.key.clone()
  } else {
    step.name.clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use trellis_template::{ProgressMode, StepId, WorkflowKind};

  fn step(id: i64, order: u32, deps: &[i64]) -> Step {
    let mut s = Step::new(StepId(id), order);
    s.key = format!("k{}", id);
    s.name = format!("Step {}", id);
    s.depends_on = deps.iter().map(|d| StepId(*d)).collect();
    s
  }

  fn template(steps: Vec<Step>) -> Template {
    Template {
      id: None,
      name: "Course intake".to_string(),
      description: String::new(),
      workflow_type: WorkflowKind::Course,
      category: None,
      is_active: true,
      progress_mode: Some(ProgressMode::Strict),
      steps,
      conditions: Vec::new(),
      transitions: Vec::new(),
    }
  }

  #[test]
  fn test_valid_template_passes() {
    let mut a = step(1, 1, &[]);
    a.is_gate = true;
    a.is_required = true;
    let b = step(2, 2, &[1]);
    let c = step(3, 3, &[1, 2]);
    assert_eq!(validate(&template(vec![a, b, c])), Ok(()));
  }

  #[test]
  fn test_gate_must_be_required_names_the_step() {
    let mut a = step(1, 1, &[]);
    a.is_gate = true;
    a.is_required = false;
    let err = validate(&template(vec![a, step(2, 2, &[1])])).unwrap_err();
    assert_eq!(
      err,
      ValidationError::GateNotRequired {
        step: "Step 1".to_string()
      }
    );
    assert!(err.to_string().contains("Step 1"));
  }

  #[test]
  fn test_gate_flag_is_the_only_gate_error_source() {
    // No gates anywhere: validation cannot produce GateNotRequired.
    let result = validate(&template(vec![step(1, 1, &[]), step(2, 2, &[1])]));
    assert_eq!(result, Ok(()));
  }

  #[test]
  fn test_empty_name_rejected_first() {
    let mut t = template(vec![]);
    t.name = "  ".to_string();
    assert_eq!(validate(&t), Err(ValidationError::EmptyName));
  }

  #[test]
  fn test_no_steps_rejected() {
    assert_eq!(validate(&template(vec![])), Err(ValidationError::NoSteps));
  }

  #[test]
  fn test_missing_progress_mode_rejected() {
    let mut t = template(vec![step(1, 1, &[])]);
    t.progress_mode = None;
    assert_eq!(validate(&t), Err(ValidationError::ProgressModeUnset));
  }

  #[test]
  fn test_duplicate_dependency_rejected() {
    let t = template(vec![step(1, 1, &[]), step(2, 2, &[1, 1])]);
    assert_eq!(
      validate(&t),
      Err(ValidationError::DuplicateDependency {
        step: "Step 2".to_string()
      })
    );
  }

  #[test]
  fn test_unknown_dependency_rejected() {
    let t = template(vec![step(1, 1, &[]), step(2, 2, &[42])]);
    assert_eq!(
      validate(&t),
      Err(ValidationError::UnknownDependency {
        step: "Step 2".to_string(),
        dependency: StepId(42),
      })
    );
  }

  #[test]
  fn test_self_dependency_rejected() {
    let t = template(vec![step(1, 1, &[1])]);
    assert_eq!(
      validate(&t),
      Err(ValidationError::SelfDependency {
        step: "Step 1".to_string()
      })
    );
  }

  #[test]
  fn test_forward_dependency_names_both_steps() {
    let t = template(vec![step(1, 1, &[2]), step(2, 2, &[])]);
    let err = validate(&t).unwrap_err();
    assert_eq!(
      err,
      ValidationError::DependencyOrder {
        step: "Step 1".to_string(),
        dependency: "Step 2".to_string(),
      }
    );
    let message = err.to_string();
    assert!(message.contains("Step 1") && message.contains("Step 2"));
  }
}
