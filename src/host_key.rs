use crate::{request::ParsedRequest, routing::RoutingTable};

/// Derives the routing table key for a request from its Host header.
///
/// In order of preference:
/// 1. the Host header as sent, e.g. `app1.local:8080`, if it is a key
/// 2. the host without port followed by the proxy's own listening port, if it is a key
/// 3. the host without port, whether or not it is a key
///
/// Returns `None` when there is no usable Host header.
pub fn resolve(request: &ParsedRequest, listen_port: u16, table: &RoutingTable) -> Option<String> {
  let host = request.host()?.trim();
  if host.is_empty() {
    return None;
  }
  if table.contains_key(host) {
    return Some(host.to_string());
  }

  let host_without_port = host.split(':').next().unwrap_or(host).trim();
  if host_without_port.is_empty() {
    return None;
  }

  let host_with_listen_port = format!("{}:{}", host_without_port, listen_port);
  if table.contains_key(&host_with_listen_port) {
    Some(host_with_listen_port)
  } else {
    Some(host_without_port.to_string())
  }
}
