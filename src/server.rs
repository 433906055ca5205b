use crate::{
  error_response,
  forwarder::Forwarder,
  host_key,
  load_balancing::PolicyResolver,
  request::{ParseError, ParsedRequest},
  routing::{BackendAddress, RoutingTable},
};
use arc_swap::ArcSwap;
use log::{debug, error, info, warn};
use std::{io, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{
  io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
  net::{TcpListener, TcpSocket},
};

/// Requests are read with a single receive of at most this many bytes.
pub const REQUEST_BUFFER_SIZE: usize = 1024;

/// Used when a configured port is not a number. Connecting to it always fails.
const INVALID_PORT: u16 = 0;

#[derive(Debug, Error)]
pub enum RouteError {
  #[error(transparent)]
  MalformedRequest(#[from] ParseError),
  #[error("request has no Host header")]
  MissingHostHeader,
  #[error("route {0} resolved to a backend without host")]
  EmptyBackendHost(String),
}

/// State shared by every connection of one listener.
pub struct SharedData {
  pub routing_table: Arc<ArcSwap<RoutingTable>>,
  pub resolver: PolicyResolver,
  pub forwarder: Arc<dyn Forwarder>,
}

impl SharedData {
  pub fn new(routing_table: Arc<ArcSwap<RoutingTable>>, forwarder: Arc<dyn Forwarder>) -> SharedData {
    SharedData {
      routing_table,
      resolver: PolicyResolver::new(),
      forwarder,
    }
  }

  /// Finds the backend for a raw request, returning the lookup key used along with it.
  pub fn route(&self, raw_request: &str, listen_port: u16) -> Result<(String, BackendAddress), RouteError> {
    let request = ParsedRequest::parse(raw_request)?;
    debug!("{} {} {}", request.method, request.path, request.version);

    let routing_table = self.routing_table.load();
    let lookup_key = host_key::resolve(&request, listen_port, &routing_table).ok_or(RouteError::MissingHostHeader)?;
    let backend = self.resolver.resolve(&lookup_key, &routing_table);

    if backend.host.trim().is_empty() {
      return Err(RouteError::EmptyBackendHost(lookup_key));
    }
    Ok((lookup_key, backend))
  }
}

/// Serves exactly one request on `stream`: read, route, forward, answer, close.
///
/// Every outcome writes a complete HTTP response, unroutable requests get the synthesized 404.
/// The stream is owned here and released on every return path, including unwinding.
pub async fn handle_connection<S>(
  mut stream: S,
  client_address: SocketAddr,
  listen_address: SocketAddr,
  shared: &SharedData,
) where
  S: AsyncRead + AsyncWrite + Unpin,
{
  let mut buffer = [0u8; REQUEST_BUFFER_SIZE];
  let read = match stream.read(&mut buffer).await {
    Ok(read) => read,
    Err(e) => {
      error!("Failed to read request from {}: {}", client_address, e);
      respond(&mut stream, client_address, &error_response::not_found()).await;
      return;
    }
  };
  let raw_request = &buffer[..read];

  let response = match shared.route(&String::from_utf8_lossy(raw_request), listen_address.port()) {
    Ok((lookup_key, backend)) => {
      let port = backend.port_number().unwrap_or_else(|e| {
        error!("Route {} has invalid port `{}`: {}", lookup_key, backend.port, e);
        INVALID_PORT
      });
      debug!("{} at Host {} is forwarded to {}:{}", client_address, lookup_key, backend.host, port);
      shared.forwarder.forward(&backend.host, port, raw_request).await
    }
    Err(e) => {
      warn!("Unroutable request from {}: {}", client_address, e);
      error_response::not_found()
    }
  };

  respond(&mut stream, client_address, &response).await;
}

async fn respond<S>(stream: &mut S, client_address: SocketAddr, response: &[u8])
where
  S: AsyncWrite + Unpin,
{
  if let Err(e) = stream.write_all(response).await {
    error!("Failed to send response to {}: {}", client_address, e);
    return;
  }
  if let Err(e) = stream.shutdown().await {
    debug!("Failed to close connection to {}: {}", client_address, e);
  }
}

/// Binds the proxy socket. Failing here is fatal for the proxy, there are no retries.
pub fn bind(address: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
  let socket = if address.is_ipv4() {
    TcpSocket::new_v4()?
  } else {
    TcpSocket::new_v6()?
  };
  socket.set_reuseaddr(true)?;
  socket.bind(address)?;
  socket.listen(backlog)
}

/// Accepts connections forever, each one handled on its own task.
pub async fn serve(listener: TcpListener, shared: Arc<SharedData>) -> io::Result<()> {
  let listen_address = listener.local_addr()?;
  info!("Proxy listening on {}", listen_address);

  loop {
    match listener.accept().await {
      Ok((stream, client_address)) => {
        debug!("Accepted connection from {}", client_address);
        let shared = shared.clone();
        tokio::spawn(async move {
          handle_connection(stream, client_address, listen_address, &shared).await;
        });
      }
      Err(e) => error!("Failed to accept connection: {}", e),
    }
  }
}

pub async fn create(address: SocketAddr, backlog: u32, shared: Arc<SharedData>) -> io::Result<()> {
  let listener = bind(address, backlog).map_err(|e| {
    let msg = format!("Failed to listen on {}: {}", address, e);
    io::Error::new(e.kind(), msg)
  })?;
  serve(listener, shared).await
}
