use crate::error_response;
use hyper::{
  body::{self, Bytes},
  header::{HeaderValue, CONTENT_TYPE},
  server::conn::AddrStream,
  service::{make_service_fn, service_fn},
  Body, Method, Request, Response, Server,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
  collections::BTreeMap,
  convert::Infallible,
  net::SocketAddr,
  sync::{Arc, PoisonError, RwLock},
};

/// Where a peer accepts chat messages. Serialized as `[ip, port]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerAddress(pub String, pub u16);

/// In-memory registry of chat peers, shared by every tracker connection.
#[derive(Debug, Default)]
pub struct PeerRegistry {
  peers: RwLock<BTreeMap<String, PeerAddress>>,
}

impl PeerRegistry {
  pub fn new() -> PeerRegistry {
    PeerRegistry::default()
  }

  /// Adds or replaces a peer, returning how many peers are registered afterwards.
  pub fn register(&self, name: String, address: PeerAddress) -> usize {
    let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
    peers.insert(name, address);
    peers.len()
  }

  pub fn unregister(&self, name: &str) -> bool {
    let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
    peers.remove(name).is_some()
  }

  pub fn peers(&self) -> BTreeMap<String, PeerAddress> {
    self.peers.read().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
  name: Option<String>,
  ip: Option<String>,
  port: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UnregisterRequest {
  name: Option<String>,
}

pub async fn handle(registry: Arc<PeerRegistry>, request: Request<Body>) -> Result<Response<Body>, hyper::Error> {
  debug!("{:?} {} {}", request.version(), request.method(), request.uri());

  match (request.method(), request.uri().path()) {
    (&Method::POST, "/login") => {
      let body = body::to_bytes(request.into_body()).await?;
      Ok(json_response(login(&registry, &body)))
    }
    (&Method::GET, "/get-list") => Ok(json_response(json!({ "peers": registry.peers() }))),
    (&Method::POST, "/unregister") => {
      let body = body::to_bytes(request.into_body()).await?;
      Ok(json_response(unregister(&registry, &body)))
    }
    _ => Ok(error_response::not_found_response()),
  }
}

fn login(registry: &PeerRegistry, body: &Bytes) -> Value {
  let login: LoginRequest = match serde_json::from_slice(body) {
    Ok(login) => login,
    Err(e) => return json!({ "status": "error", "msg": e.to_string() }),
  };

  let name = login.name.filter(|name| !name.is_empty());
  let ip = login.ip.filter(|ip| !ip.is_empty());
  let port = login.port.as_ref().and_then(port_number);
  match (name, ip, port) {
    (Some(name), Some(ip), Some(port)) => {
      info!("Registered peer {} at {}:{}", name, ip, port);
      let total_peers = registry.register(name, PeerAddress(ip, port));
      json!({ "status": "ok", "total_peers": total_peers })
    }
    _ => json!({ "status": "error", "msg": "Missing name/ip/port" }),
  }
}

fn unregister(registry: &PeerRegistry, body: &Bytes) -> Value {
  let request: UnregisterRequest = match serde_json::from_slice(body) {
    Ok(request) => request,
    Err(e) => return json!({ "status": "error", "msg": e.to_string() }),
  };

  match request.name {
    Some(name) if registry.unregister(&name) => {
      info!("Unregistered peer {}", name);
      json!({ "status": "ok" })
    }
    _ => json!({ "status": "not_found" }),
  }
}

/// Ports arrive either as JSON numbers or as numeric strings.
fn port_number(value: &Value) -> Option<u16> {
  match value {
    Value::Number(number) => number.as_u64().and_then(|port| u16::try_from(port).ok()),
    Value::String(text) => text.trim().parse().ok(),
    _ => None,
  }
}

fn json_response(value: Value) -> Response<Body> {
  let mut response = Response::new(Body::from(value.to_string()));
  response
    .headers_mut()
    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
  response
}

pub async fn run(address: SocketAddr, registry: Arc<PeerRegistry>) -> Result<(), hyper::Error> {
  let service = make_service_fn(move |_stream: &AddrStream| {
    let registry = registry.clone();
    async move { Ok::<_, Infallible>(service_fn(move |request| handle(registry.clone(), request))) }
  });

  let server = Server::try_bind(&address)?.serve(service);
  info!("Tracker listening on {}", address);
  server.await
}
