//! Source RCON packet framing.
//!
//! Wire layout, all integers little-endian:
//!
//! ```text
//! size: i32   (bytes after this field)
//! id:   i32   (request id, echoed by the server; -1 signals auth failure)
//! type: i32   (3 auth, 2 exec-command / auth-response, 0 response-value)
//! body: bytes (null-terminated ASCII/UTF-8)
//! pad:  0x00  (one trailing null after the body terminator)
//! ```

use crate::{RconError, RconResult, MAX_PACKET_BODY};

/// Bytes in a packet after the size field, for an empty body.
pub const MIN_PACKET_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Client login request carrying the rcon password (3).
    Auth,
    /// Server reply to an auth request (2 on the server side).
    AuthResponse,
    /// Client command execution request (2 on the client side).
    ExecCommand,
    /// Server command output (0).
    ResponseValue,
}

impl PacketType {
    fn to_wire(self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::AuthResponse | PacketType::ExecCommand => 2,
            PacketType::ResponseValue => 0,
        }
    }

    /// Decode a packet type received from the peer. The value 2 is ambiguous
    /// on the wire; `from_server` resolves it by direction.
    fn from_wire(value: i32, from_server: bool) -> RconResult<Self> {
        match (value, from_server) {
            (3, _) => Ok(PacketType::Auth),
            (2, true) => Ok(PacketType::AuthResponse),
            (2, false) => Ok(PacketType::ExecCommand),
            (0, _) => Ok(PacketType::ResponseValue),
            (other, _) => Err(RconError::Protocol(format!("unknown packet type {other}"))),
        }
    }
}

/// One framed RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub ptype: PacketType,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, ptype: PacketType, body: &str) -> RconResult<Self> {
        if body.len() > MAX_PACKET_BODY {
            return Err(RconError::Protocol(format!(
                "command body of {} bytes exceeds the {MAX_PACKET_BODY} byte cap",
                body.len()
            )));
        }
        Ok(Self {
            id,
            ptype,
            body: body.to_string(),
        })
    }

    /// Encode including the leading size field.
    pub fn encode(&self) -> Vec<u8> {
        let size = (MIN_PACKET_SIZE + self.body.len()) as i32;
        let mut out = Vec::with_capacity(4 + size as usize);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&self.ptype.to_wire().to_le_bytes());
        out.extend_from_slice(self.body.as_bytes());
        out.push(0);
        out.push(0);
        out
    }

    /// Decode from the bytes following the size field. The wire type value 2
    /// is ambiguous; `from_server` says which direction this packet traveled.
    pub fn decode_body(buf: &[u8], from_server: bool) -> RconResult<Packet> {
        if buf.len() < MIN_PACKET_SIZE {
            return Err(RconError::Protocol(format!(
                "packet of {} bytes is shorter than the {MIN_PACKET_SIZE} byte minimum",
                buf.len()
            )));
        }
        let id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let raw_type = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ptype = PacketType::from_wire(raw_type, from_server)?;
        let body_bytes = &buf[8..buf.len() - 2];
        let body = std::str::from_utf8(body_bytes)
            .map_err(|e| RconError::Protocol(format!("body is not utf-8: {e}")))?
            .to_string();
        Ok(Packet { id, ptype, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout_matches_the_wire_format() {
        let packet = Packet::new(7, PacketType::ExecCommand, "status").unwrap();
        let bytes = packet.encode();
        // size = 10 + body
        assert_eq!(&bytes[0..4], &16i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..18], b"status");
        assert_eq!(&bytes[18..], &[0, 0]);
    }

    #[test]
    fn decode_inverts_encode() {
        let packet = Packet::new(42, PacketType::ResponseValue, "map loaded").unwrap();
        let bytes = packet.encode();
        let decoded = Packet::decode_body(&bytes[4..], true).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn oversized_body_is_rejected() {
        let body = "x".repeat(MAX_PACKET_BODY + 1);
        assert!(Packet::new(1, PacketType::ExecCommand, &body).is_err());
    }

    #[test]
    fn truncated_packet_is_rejected() {
        assert!(Packet::decode_body(&[0, 0, 0], true).is_err());
    }
}
