//! Default sequential transition derivation.

use trellis_template::{Step, Transition, TransitionKind};

/// Append a `sequential` edge for each adjacent pair of steps, unless an
/// edge with that exact `(from, to)` already exists. Idempotent: repeated
/// calls never produce duplicate edges.
pub fn generate_sequential(steps: &[Step], existing: &[Transition]) -> Vec<Transition> {
  let mut transitions = existing.to_vec();

  for pair in steps.windows(2) {
    let (from, to) = (pair[0].identifier, pair[1].identifier);
    let already = transitions.iter().any(|t| t.from == from && t.to == to);
    if !already {
      transitions.push(Transition {
        from,
        to,
        condition: None,
        kind: TransitionKind::Sequential,
      });
    }
  }

  transitions
}
