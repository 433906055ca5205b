use crate::error_response;
use async_trait::async_trait;
use log::error;
use std::io;
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpStream,
};

const CHUNK_SIZE: usize = 4096;

#[async_trait]
pub trait Forwarder: Send + Sync {
  async fn forward(&self, host: &str, port: u16, request: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpForwarder;

impl TcpForwarder {
  pub fn new() -> TcpForwarder {
    TcpForwarder
  }

  async fn exchange(host: &str, port: u16, request: &[u8]) -> io::Result<Vec<u8>> {
    let mut backend = TcpStream::connect((host, port)).await?;
    backend.write_all(request).await?;

    let mut response = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
      let read = backend.read(&mut chunk).await?;
      if read == 0 {
        break;
      }
      response.extend_from_slice(&chunk[..read]);
    }
    Ok(response)
  }
}

#[async_trait]
impl Forwarder for TcpForwarder {
  async fn forward(&self, host: &str, port: u16, request: &[u8]) -> Vec<u8> {
    match TcpForwarder::exchange(host, port, request).await {
      Ok(response) => response,
      Err(e) => {
        error!("Backend {}:{} unreachable: {}", host, port, e);
        error_response::not_found()
      }
    }
  }
}
