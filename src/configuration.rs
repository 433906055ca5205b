use crate::routing::{BackendAddress, MalformedAddress, Policy, RoutingEntry, RoutingTable};
use arc_swap::ArcSwap;
use log::{error, info, warn};
use notify::{watcher, DebouncedEvent, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
  collections::HashMap,
  fs, io,
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::{mpsc::channel, Arc},
  time::Duration,
};
use thiserror::Error;

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_BACKLOG: u32 = 50;
const RELOAD_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("could not read configuration file {path}: {source}")]
  Read { path: PathBuf, source: io::Error },
  #[error("could not parse configuration: {0}")]
  Parse(#[from] toml::de::Error),
  #[error(transparent)]
  MalformedAddress(#[from] MalformedAddress),
  #[error("invalid listen address `{0}`")]
  InvalidListenAddress(String),
  #[error("could not watch configuration file: {0}")]
  Watch(#[from] notify::Error),
}

/// Everything the proxy process reads from its configuration file.
#[derive(Debug)]
pub struct ProxyConfig {
  pub listen: SocketAddr,
  pub backlog: u32,
  pub routing_table: RoutingTable,
}

impl ProxyConfig {
  pub fn load(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let toml_str = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = ProxyConfig::from_toml(&toml_str)?;
    info!(
      "Loaded {} route(s) from configuration file {}",
      config.routing_table.len(),
      path.display()
    );
    Ok(config)
  }

  pub fn from_toml(toml_str: &str) -> Result<ProxyConfig, ConfigError> {
    let config: Config = toml::from_str(toml_str)?;
    config.print_warnings();
    ProxyConfig::try_from(config)
  }
}

#[derive(Debug, Deserialize)]
struct Config {
  #[serde(default = "default_listen")]
  listen: String,
  #[serde(default = "default_backlog")]
  backlog: u32,
  unmapped: Option<String>,
  #[serde(default)]
  routes: HashMap<String, RouteConfig>,
}

fn default_listen() -> String {
  DEFAULT_LISTEN.to_string()
}

fn default_backlog() -> u32 {
  DEFAULT_BACKLOG
}

/// A route is written either as a plain `"host:port"` or as a table with a target list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteConfig {
  Single(String),
  Pool {
    targets: Vec<String>,
    policy: Option<String>,
  },
}

impl Config {
  fn print_warnings(&self) {
    for (hostname_key, route) in &self.routes {
      let literals = match route {
        RouteConfig::Single(target) => std::slice::from_ref(target),
        RouteConfig::Pool { targets, policy } => {
          if targets.is_empty() {
            warn!(
              "route {} does not contain any targets. It will always be forwarded to the fallback address.",
              hostname_key
            );
          }
          if targets.len() >= 2 {
            match Policy::from_name(policy.as_deref()) {
              Policy::RoundRobin | Policy::Random => {}
              other => warn!(
                "route {} has policy `{}`, only `round-robin` and `random` are served. It will always be forwarded to the fallback address.",
                hostname_key, other
              ),
            }
          }
          targets.as_slice()
        }
      };

      for literal in literals {
        if let Ok(address) = literal.parse::<BackendAddress>() {
          if address.port_number().is_err() {
            warn!(
              "route {} has target {} with an invalid port. Connections to it will fail.",
              hostname_key, literal
            );
          }
        }
      }
    }
  }
}

impl TryFrom<Config> for ProxyConfig {
  type Error = ConfigError;

  fn try_from(other: Config) -> Result<Self, Self::Error> {
    let listen = other
      .listen
      .parse::<SocketAddr>()
      .map_err(|_| ConfigError::InvalidListenAddress(other.listen.clone()))?;
    let unmapped = match other.unmapped {
      Some(literal) => literal.parse::<BackendAddress>()?,
      None => BackendAddress::fallback(),
    };

    let mut routing_table = RoutingTable::new(unmapped);
    for (hostname_key, route) in other.routes {
      routing_table.insert(hostname_key, RoutingEntry::try_from(route)?);
    }

    Ok(ProxyConfig {
      listen,
      backlog: other.backlog,
      routing_table,
    })
  }
}

impl TryFrom<RouteConfig> for RoutingEntry {
  type Error = MalformedAddress;

  fn try_from(other: RouteConfig) -> Result<Self, Self::Error> {
    match other {
      RouteConfig::Single(target) => Ok(RoutingEntry::Single(target.parse()?)),
      RouteConfig::Pool { targets, policy } => Ok(RoutingEntry::Pool {
        targets: targets
          .iter()
          .map(|target| target.parse::<BackendAddress>())
          .collect::<Result<Vec<_>, _>>()?,
        policy: Policy::from_name(policy.as_deref()),
      }),
    }
  }
}

/// Re-reads the routes in `path` and swaps them in. On error the current table stays untouched.
pub fn reload(path: &Path, routing_table: &ArcSwap<RoutingTable>) -> Result<(), ConfigError> {
  let config = ProxyConfig::load(path)?;
  routing_table.store(Arc::new(config.routing_table));
  Ok(())
}

/// Watches the configuration file and reloads the routing table whenever it is written.
/// Dropping the returned watcher stops watching.
pub fn watch(path: PathBuf, routing_table: Arc<ArcSwap<RoutingTable>>) -> Result<RecommendedWatcher, ConfigError> {
  let (tx, rx) = channel();
  let mut watcher = watcher(tx, RELOAD_DEBOUNCE)?;
  watcher.watch(&path, RecursiveMode::NonRecursive)?;

  std::thread::spawn(move || {
    for event in rx {
      match event {
        DebouncedEvent::NoticeWrite(_) | DebouncedEvent::Write(_) | DebouncedEvent::Create(_) => {
          if let Err(e) = reload(&path, &routing_table) {
            error!("Keeping previous routes, reloading {} failed: {}", path.display(), e);
          }
        }
        DebouncedEvent::Error(e, _) => error!("Error while watching {}: {}", path.display(), e),
        _ => {}
      }
    }
  });
  Ok(watcher)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const SAMPLE: &str = r#"
    listen = "127.0.0.1:8080"
    backlog = 16
    unmapped = "127.0.0.1:9999"

    [routes]
    "app1.local" = "10.0.19.29:9001"
    "10.0.255.132:8080" = "10.0.255.132:9000"
    "svc" = { targets = ["10.0.0.1:9000", "10.0.0.2:9000"], policy = "round-robin" }
    "lottery" = { targets = ["10.0.0.1:9000", "10.0.0.2:9000"], policy = "random" }
    "typo" = { targets = ["10.0.0.1:9000", "10.0.0.2:9000"], policy = "round_robin" }
    "empty" = { targets = [] }
  "#;

  #[test]
  fn parse_sample_configuration() {
    let config = ProxyConfig::from_toml(SAMPLE).unwrap();
    let table = &config.routing_table;

    assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
    assert_eq!(config.backlog, 16);
    assert_eq!(table.len(), 6);
    assert_eq!(
      table.unmapped(),
      &RoutingEntry::Single(BackendAddress::new("127.0.0.1", "9999"))
    );
    assert_eq!(
      table.get("app1.local"),
      Some(&RoutingEntry::Single(BackendAddress::new("10.0.19.29", "9001")))
    );
    assert_eq!(
      table.get("svc"),
      Some(&RoutingEntry::Pool {
        targets: vec![
          BackendAddress::new("10.0.0.1", "9000"),
          BackendAddress::new("10.0.0.2", "9000")
        ],
        policy: Policy::RoundRobin,
      })
    );
    assert!(matches!(
      table.get("lottery"),
      Some(RoutingEntry::Pool {
        policy: Policy::Random,
        ..
      })
    ));
    assert!(matches!(
      table.get("typo"),
      Some(RoutingEntry::Pool {
        policy: Policy::Unknown(_),
        ..
      })
    ));
    assert_eq!(
      table.get("empty"),
      Some(&RoutingEntry::Pool {
        targets: vec![],
        policy: Policy::Unspecified,
      })
    );
  }

  #[test]
  fn defaults_for_empty_configuration() {
    let config = ProxyConfig::from_toml("").unwrap();

    assert_eq!(config.listen, DEFAULT_LISTEN.parse().unwrap());
    assert_eq!(config.backlog, DEFAULT_BACKLOG);
    assert!(config.routing_table.is_empty());
    assert_eq!(
      config.routing_table.unmapped(),
      &RoutingEntry::Single(BackendAddress::fallback())
    );
  }

  #[test]
  fn non_integer_port_is_accepted() {
    let config = ProxyConfig::from_toml("[routes]\n\"app\" = \"10.0.0.1:http\"").unwrap();

    assert_eq!(
      config.routing_table.get("app"),
      Some(&RoutingEntry::Single(BackendAddress::new("10.0.0.1", "http")))
    );
  }

  #[test]
  fn target_without_colon_is_rejected() {
    let result = ProxyConfig::from_toml("[routes]\n\"app\" = { targets = [\"10.0.0.1:80\", \"10.0.0.2\"] }");

    assert!(matches!(
      result,
      Err(ConfigError::MalformedAddress(MalformedAddress(literal))) if literal == "10.0.0.2"
    ));
  }

  #[test]
  fn invalid_listen_address_is_rejected() {
    let result = ProxyConfig::from_toml("listen = \"localhost\"");

    assert!(matches!(result, Err(ConfigError::InvalidListenAddress(_))));
  }

  #[test]
  fn load_missing_file() {
    let result = ProxyConfig::load(Path::new("/definitely/not/here.toml"));

    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }

  #[test]
  fn reload_swaps_routes_and_keeps_them_on_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[routes]\n\"app\" = \"10.0.0.1:80\"\n").unwrap();
    let table = ArcSwap::from_pointee(RoutingTable::default());

    reload(file.path(), &table).unwrap();
    assert!(table.load().contains_key("app"));

    fs::write(file.path(), "[routes]\n\"app\" = 42\n").unwrap();
    assert!(reload(file.path(), &table).is_err());
    assert!(table.load().contains_key("app"));
  }
}
