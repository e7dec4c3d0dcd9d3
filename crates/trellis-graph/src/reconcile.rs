//! Save-time identifier reconciliation.
//!
//! Steps created in the builder carry local (negative) identifiers. When a
//! template is saved, the backing service assigns persisted identifiers.
//! The persisted template that comes back must become canonical without
//! breaking the builder's `depends_on` references, so local identifiers
//! are remapped by matching on `key`, which is immutable once persisted.

use std::collections::HashMap;

use trellis_template::{StepId, Template};

use crate::graph::StepGraph;

/// Mapping from builder-local identifiers to server-assigned ones.
pub type IdMap = HashMap<StepId, StepId>;

/// Compute the identifier remap for `local` from the saved template
/// returned by the store, and apply it.
///
/// Only local identifiers are remapped; steps that were already persisted
/// keep their identifiers. Local steps whose key does not appear in the
/// saved template are left untouched (the caller decides whether that is
/// an error worth surfacing).
pub fn reconcile_saved(local: &StepGraph, saved: &Template) -> (StepGraph, IdMap) {
  let persisted_by_key: HashMap<&str, StepId> = saved
    .steps
    .iter()
    .map(|s| (s.key.as_str(), s.identifier))
    .collect();

  let map: IdMap = local
    .steps()
    .iter()
    .filter(|s| s.identifier.is_local())
    .filter_map(|s| {
      persisted_by_key
        .get(s.key.as_str())
        .map(|persisted| (s.identifier, *persisted))
    })
    .collect();

  (local.remap_ids(&map), map)
}
