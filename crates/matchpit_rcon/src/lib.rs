//! Deadline-bounded Source RCON client
//!
//! Speaks the Valve Source remote console protocol over TCP: little-endian
//! length-prefixed packets with a request id, a packet type, and a
//! null-terminated body. The client authenticates once per connection and
//! then runs commands as execute/response round trips.
//!
//! Every public entry point takes an explicit deadline that covers the whole
//! call (connect, auth handshake, command round trips). A call that exceeds
//! its deadline fails with [`RconError::Timeout`]; it never hangs.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

pub mod packet;

pub use packet::{Packet, PacketType};

/// Largest packet body the client will read, matching the Source engine cap.
pub const MAX_PACKET_BODY: usize = 4096;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("server rejected the rcon password")]
    AuthFailed,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

pub type RconResult<T> = Result<T, RconError>;

/// An authenticated RCON connection to one game server.
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
}

impl RconClient {
    /// Connect and authenticate within `deadline`.
    pub async fn connect(addr: &str, password: &str, deadline: Duration) -> RconResult<Self> {
        tokio::time::timeout(deadline, Self::connect_inner(addr, password))
            .await
            .map_err(|_| RconError::Timeout(deadline))?
    }

    async fn connect_inner(addr: &str, password: &str) -> RconResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let mut client = Self { stream, next_id: 1 };
        client.authenticate(password).await?;
        debug!(addr, "rcon connection authenticated");
        Ok(client)
    }

    async fn authenticate(&mut self, password: &str) -> RconResult<()> {
        let id = self.send(PacketType::Auth, password).await?;
        // The server may echo an empty ResponseValue before the AuthResponse.
        loop {
            let packet = self.read_packet().await?;
            match packet.ptype {
                PacketType::ResponseValue => continue,
                PacketType::AuthResponse => {
                    // A failed auth answers with id -1.
                    if packet.id == -1 {
                        return Err(RconError::AuthFailed);
                    }
                    if packet.id != id {
                        return Err(RconError::Protocol(format!(
                            "auth response id {} does not match request id {id}",
                            packet.id
                        )));
                    }
                    return Ok(());
                }
                other => {
                    return Err(RconError::Protocol(format!(
                        "unexpected packet type {other:?} during auth"
                    )))
                }
            }
        }
    }

    /// Run one command within `deadline` and return the server's text reply.
    pub async fn exec(&mut self, command: &str, deadline: Duration) -> RconResult<String> {
        tokio::time::timeout(deadline, self.exec_inner(command))
            .await
            .map_err(|_| RconError::Timeout(deadline))?
    }

    async fn exec_inner(&mut self, command: &str) -> RconResult<String> {
        let id = self.send(PacketType::ExecCommand, command).await?;
        let packet = self.read_packet().await?;
        if packet.ptype != PacketType::ResponseValue {
            return Err(RconError::Protocol(format!(
                "expected a response value, got {:?}",
                packet.ptype
            )));
        }
        if packet.id != id {
            return Err(RconError::Protocol(format!(
                "response id {} does not match request id {id}",
                packet.id
            )));
        }
        trace!(command, reply_len = packet.body.len(), "rcon command completed");
        Ok(packet.body)
    }

    async fn send(&mut self, ptype: PacketType, body: &str) -> RconResult<i32> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let packet = Packet::new(id, ptype, body)?;
        self.stream.write_all(&packet.encode()).await?;
        Ok(id)
    }

    async fn read_packet(&mut self) -> RconResult<Packet> {
        let size = self.stream.read_i32_le().await?;
        if size < packet::MIN_PACKET_SIZE as i32 || size as usize > MAX_PACKET_BODY + 10 {
            return Err(RconError::Protocol(format!("invalid packet size {size}")));
        }
        let mut buf = vec![0u8; size as usize];
        self.stream.read_exact(&mut buf).await?;
        Packet::decode_body(&buf, true)
    }
}
