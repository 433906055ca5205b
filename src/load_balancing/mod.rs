use crate::routing::{BackendAddress, Policy, RoutingEntry, RoutingTable};
use log::{debug, warn};

pub mod random;
pub mod round_robin;

use random::Random;
use round_robin::RoundRobin;

pub struct Context<'a> {
  pub lookup_key: &'a str,
  pub targets: &'a [BackendAddress],
}

pub trait LoadBalancingStrategy: Send + Sync + std::fmt::Debug {
  /// Picks an index into `context.targets`, which is never empty.
  fn select_index(&self, context: &Context) -> usize;
}

#[derive(Debug, Default)]
pub struct PolicyResolver {
  round_robin: RoundRobin,
  random: Random,
}

impl PolicyResolver {
  pub fn new() -> PolicyResolver {
    PolicyResolver {
      round_robin: RoundRobin::new(),
      random: Random::new(),
    }
  }

  pub fn resolve(&self, lookup_key: &str, table: &RoutingTable) -> BackendAddress {
    let entry = match table.get(lookup_key) {
      Some(entry) => entry,
      None => {
        debug!("No route for {}, using the unmapped entry", lookup_key);
        table.unmapped()
      }
    };

    match entry {
      RoutingEntry::Single(address) => address.clone(),
      RoutingEntry::Pool { targets, policy } => self.resolve_pool(lookup_key, targets, policy),
    }
  }

  fn resolve_pool(&self, lookup_key: &str, targets: &[BackendAddress], policy: &Policy) -> BackendAddress {
    match targets {
      [] => {
        warn!("Empty target list for {}, using the fallback address", lookup_key);
        BackendAddress::fallback()
      }
      [only] => only.clone(),
      _ => {
        let strategy: &dyn LoadBalancingStrategy = match policy {
          Policy::RoundRobin => &self.round_robin,
          Policy::Random => &self.random,
          Policy::Unspecified | Policy::Unknown(_) => {
            warn!("Unknown policy {} for {}, using the fallback address", policy, lookup_key);
            return BackendAddress::fallback();
          }
        };
        let index = strategy.select_index(&Context { lookup_key, targets });
        debug!("Policy {} picked {} for {}", policy, targets[index], lookup_key);
        targets[index].clone()
      }
    }
  }

  #[cfg(test)]
  pub(crate) fn rotation_len(&self) -> usize {
    self.round_robin.tracked_keys()
  }
}
