use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::{io, net::SocketAddr};
use tokio::{
  io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
  net::{TcpListener, TcpStream},
};

const MESSAGE_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub from: String,
  pub text: String,
}

/// Accepts chat messages from other peers, one message per connection.
async fn serve(listener: TcpListener) -> io::Result<()> {
  loop {
    match listener.accept().await {
      Ok((stream, peer_address)) => {
        tokio::spawn(async move {
          match receive(stream).await {
            Ok(message) => info!("Message from {}@{}: {}", message.from, peer_address, message.text),
            Err(e) => warn!("Error receiving message from {}: {}", peer_address, e),
          }
        });
      }
      Err(e) => error!("Failed to accept peer connection: {}", e),
    }
  }
}

async fn receive(mut stream: TcpStream) -> io::Result<ChatMessage> {
  let mut buffer = [0u8; MESSAGE_BUFFER_SIZE];
  let read = stream.read(&mut buffer).await?;
  serde_json::from_slice(&buffer[..read]).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub async fn send(target: SocketAddr, from: &str, text: &str) -> io::Result<()> {
  let message = ChatMessage {
    from: from.to_string(),
    text: text.to_string(),
  };
  let payload = serde_json::to_vec(&message).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

  let mut stream = TcpStream::connect(target).await?;
  stream.write_all(&payload).await?;
  stream.shutdown().await
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
  Send { target: SocketAddr, text: String },
  Exit,
}

/// `send <ip> <port> <message...>` or `exit`. Anything else is ignored.
fn parse_command(line: &str) -> Option<Command> {
  let line = line.trim();
  if line.eq_ignore_ascii_case("exit") {
    return Some(Command::Exit);
  }

  let mut parts = line.splitn(4, ' ');
  if !parts.next()?.eq_ignore_ascii_case("send") {
    return None;
  }
  let ip = parts.next()?;
  let port = parts.next()?;
  let text = parts.next()?;
  let target = format!("{}:{}", ip, port).parse().ok()?;
  Some(Command::Send {
    target,
    text: text.to_string(),
  })
}

/// Runs the peer listener in the background and reads chat commands from stdin until `exit`.
pub async fn run(name: String, address: SocketAddr) -> io::Result<()> {
  let listener = TcpListener::bind(address).await?;
  info!("Peer {} listening on {}", name, listener.local_addr()?);
  tokio::spawn(async move {
    if let Err(e) = serve(listener).await {
      error!("Peer listener stopped: {}", e);
    }
  });

  info!("[{}] Ready to chat. Use `send <ip> <port> <message>` or `exit`", name);
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    match parse_command(&line) {
      Some(Command::Send { target, text }) => match send(target, &name, &text).await {
        Ok(()) => info!("Sent to {}", target),
        Err(e) => error!("Sending to {} failed: {}", target, e),
      },
      Some(Command::Exit) => break,
      None => warn!("Unknown command: {}", line),
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_send_command() {
    assert_eq!(
      parse_command("send 127.0.0.1 9001 hello world"),
      Some(Command::Send {
        target: "127.0.0.1:9001".parse().unwrap(),
        text: "hello world".into(),
      })
    );
  }

  #[test]
  fn parse_other_commands() {
    assert_eq!(parse_command("EXIT"), Some(Command::Exit));
    assert_eq!(parse_command("send 127.0.0.1 9001"), None);
    assert_eq!(parse_command("send localhost nine hi"), None);
    assert_eq!(parse_command("shout hi"), None);
  }

  #[tokio::test]
  async fn send_delivers_json_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let received = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.unwrap();
      receive(stream).await.unwrap()
    });

    send(address, "peer1", "hello").await.unwrap();

    assert_eq!(
      received.await.unwrap(),
      ChatMessage {
        from: "peer1".into(),
        text: "hello".into(),
      }
    );
  }

  #[tokio::test]
  async fn receive_rejects_garbage() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let received = tokio::spawn(async move {
      let (stream, _) = listener.accept().await.unwrap();
      receive(stream).await
    });

    let mut client = TcpStream::connect(address).await.unwrap();
    client.write_all(b"not json").await.unwrap();
    client.shutdown().await.unwrap();

    assert_eq!(received.await.unwrap().unwrap_err().kind(), io::ErrorKind::InvalidData);
  }
}
