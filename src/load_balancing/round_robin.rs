use super::{Context, LoadBalancingStrategy};
use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
};

/// Next index to hand out, per lookup key.
#[derive(Debug, Default)]
pub struct RotationState {
  indices: Mutex<HashMap<String, usize>>,
}

impl RotationState {
  pub fn new() -> RotationState {
    RotationState::default()
  }

  /// Returns the current index for `key` and advances it modulo `len`.
  pub fn advance(&self, key: &str, len: usize) -> usize {
    // the map only holds counters, a panic elsewhere can't leave it half-written
    let mut indices = self.indices.lock().unwrap_or_else(PoisonError::into_inner);
    let index = indices.entry(key.to_string()).or_insert(0);
    // the list may have shrunk since the last reload
    let current = *index % len;
    *index = (current + 1) % len;
    current
  }

  #[cfg(test)]
  pub(crate) fn tracked_keys(&self) -> usize {
    self.indices.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}

#[derive(Debug, Default)]
pub struct RoundRobin {
  rotation: RotationState,
}

impl RoundRobin {
  pub fn new() -> RoundRobin {
    RoundRobin {
      rotation: RotationState::new(),
    }
  }

  #[cfg(test)]
  pub(crate) fn tracked_keys(&self) -> usize {
    self.rotation.tracked_keys()
  }
}

impl LoadBalancingStrategy for RoundRobin {
  fn select_index(&self, context: &Context) -> usize {
    self.rotation.advance(context.lookup_key, context.targets.len())
  }
}
