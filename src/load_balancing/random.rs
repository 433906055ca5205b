use super::{Context, LoadBalancingStrategy};
use rand::{thread_rng, Rng};

#[derive(Debug, Default)]
pub struct Random {}

impl Random {
  pub fn new() -> Random {
    Random {}
  }
}

impl LoadBalancingStrategy for Random {
  fn select_index(&self, context: &Context) -> usize {
    let mut rng = thread_rng();
    rng.gen_range(0..context.targets.len())
  }
}
