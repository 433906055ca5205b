use std::{collections::HashMap, fmt, num::ParseIntError, str::FromStr};
use thiserror::Error;

/// Dummy backend used whenever no usable route exists. Nothing is expected to listen here,
/// so forwarding to it ends in the regular backend-unreachable 404.
pub const FALLBACK_HOST: &str = "127.0.0.1";
pub const FALLBACK_PORT: &str = "9000";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed backend address `{0}`, expected `host:port`")]
pub struct MalformedAddress(pub String);

/// The port is kept as text, a bad one only surfaces at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddress {
  pub host: String,
  pub port: String,
}

impl BackendAddress {
  pub fn new<H: Into<String>, P: Into<String>>(host: H, port: P) -> BackendAddress {
    BackendAddress {
      host: host.into(),
      port: port.into(),
    }
  }

  pub fn fallback() -> BackendAddress {
    BackendAddress::new(FALLBACK_HOST, FALLBACK_PORT)
  }

  pub fn port_number(&self) -> Result<u16, ParseIntError> {
    self.port.trim().parse::<u16>()
  }
}

impl FromStr for BackendAddress {
  type Err = MalformedAddress;

  /// Splits on the first colon only, `"a:b:c"` yields host `a` and port `b:c`.
  fn from_str(literal: &str) -> Result<Self, Self::Err> {
    literal
      .split_once(':')
      .map(|(host, port)| BackendAddress::new(host, port))
      .ok_or_else(|| MalformedAddress(literal.to_string()))
  }
}

impl fmt::Display for BackendAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
  RoundRobin,
  Random,
  Unspecified,
  Unknown(String),
}

impl Policy {
  pub fn from_name(name: Option<&str>) -> Policy {
    match name {
      Some("round-robin") => Policy::RoundRobin,
      Some("random") => Policy::Random,
      Some(other) => Policy::Unknown(other.to_string()),
      None => Policy::Unspecified,
    }
  }
}

impl fmt::Display for Policy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Policy::RoundRobin => write!(f, "round-robin"),
      Policy::Random => write!(f, "random"),
      Policy::Unspecified => write!(f, "unspecified"),
      Policy::Unknown(name) => write!(f, "{}", name),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingEntry {
  Single(BackendAddress),
  /// The policy only matters once the pool holds two or more targets.
  Pool { targets: Vec<BackendAddress>, policy: Policy },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
  entries: HashMap<String, RoutingEntry>,
  unmapped: RoutingEntry,
}

impl RoutingTable {
  pub fn new(unmapped: BackendAddress) -> RoutingTable {
    RoutingTable {
      entries: HashMap::new(),
      unmapped: RoutingEntry::Single(unmapped),
    }
  }

  pub fn insert<K: Into<String>>(&mut self, hostname_key: K, entry: RoutingEntry) {
    self.entries.insert(hostname_key.into(), entry);
  }

  pub fn with_route<K: Into<String>>(mut self, hostname_key: K, entry: RoutingEntry) -> RoutingTable {
    self.insert(hostname_key, entry);
    self
  }

  pub fn contains_key(&self, hostname_key: &str) -> bool {
    self.entries.contains_key(hostname_key)
  }

  pub fn get(&self, hostname_key: &str) -> Option<&RoutingEntry> {
    self.entries.get(hostname_key)
  }

  pub fn unmapped(&self) -> &RoutingEntry {
    &self.unmapped
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl Default for RoutingTable {
  fn default() -> Self {
    RoutingTable::new(BackendAddress::fallback())
  }
}
