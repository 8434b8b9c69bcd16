//! Command and Status messages
//!
//! Command is 3 bytes:
//! - Byte 0: Message type (0x01)
//! - Byte 1: Relay index (0-3)
//! - Byte 2: Desired state (0 = off, 1 = on)
//!
//! Status is 6 bytes:
//! - Byte 0: Message type (0x02)
//! - Bytes 1-4: Relay states, one byte per channel (0/1)
//! - Byte 5: Reserved (0)

use bytes::{BufMut, Bytes, BytesMut};
use relayhub_core::{HubError, HubResult, RelayIndex, RelayStates, RELAY_CHANNELS};

/// Command message size in bytes
pub const COMMAND_SIZE: usize = 3;

/// Status message size in bytes
pub const STATUS_SIZE: usize = 6;

/// Message type identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Command = 0x01,
    Status = 0x02,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(MessageType::Command),
            0x02 => Some(MessageType::Status),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Exact encoded size of this message type
    #[inline]
    pub fn wire_size(self) -> usize {
        match self {
            MessageType::Command => COMMAND_SIZE,
            MessageType::Status => STATUS_SIZE,
        }
    }
}

/// A decoded link message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// Set one relay on the receiving unit
    Command { relay: RelayIndex, on: bool },
    /// Authoritative relay vector of the sending unit
    Status { relays: RelayStates },
}

impl Message {
    pub fn command(relay: RelayIndex, on: bool) -> Self {
        Message::Command { relay, on }
    }

    pub fn status(relays: RelayStates) -> Self {
        Message::Status { relays }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Command { .. } => MessageType::Command,
            Message::Status { .. } => MessageType::Status,
        }
    }

    /// Encode to the fixed-size wire form
    pub fn encode(&self) -> Bytes {
        let message_type = self.message_type();
        let mut buf = BytesMut::with_capacity(message_type.wire_size());
        buf.put_u8(message_type.to_byte());

        match self {
            Message::Command { relay, on } => {
                buf.put_u8(relay.get());
                buf.put_u8(*on as u8);
            }
            Message::Status { relays } => {
                for on in relays.0 {
                    buf.put_u8(on as u8);
                }
                buf.put_u8(0);
            }
        }

        buf.freeze()
    }

    /// Decode from the wire form
    ///
    /// The length must match the message type exactly; truncated or padded
    /// payloads are rejected rather than guessed at.
    pub fn decode(buf: &[u8]) -> HubResult<Self> {
        let Some(&type_byte) = buf.first() else {
            return Err(HubError::BufferTooShort {
                expected: 1,
                actual: 0,
            });
        };

        let message_type =
            MessageType::from_byte(type_byte).ok_or(HubError::UnknownMessageType(type_byte))?;

        let expected = message_type.wire_size();
        if buf.len() < expected {
            return Err(HubError::BufferTooShort {
                expected,
                actual: buf.len(),
            });
        }
        if buf.len() > expected {
            return Err(HubError::InvalidWireFormat(format!(
                "{:?} message is {} bytes, expected {}",
                message_type,
                buf.len(),
                expected
            )));
        }

        match message_type {
            MessageType::Command => {
                let relay = RelayIndex::new(buf[1])?;
                let on = decode_bool(buf[2])?;
                Ok(Message::Command { relay, on })
            }
            MessageType::Status => {
                let mut relays = [false; RELAY_CHANNELS];
                for (slot, &b) in relays.iter_mut().zip(&buf[1..1 + RELAY_CHANNELS]) {
                    *slot = decode_bool(b)?;
                }
                Ok(Message::Status {
                    relays: RelayStates::new(relays),
                })
            }
        }
    }
}

fn decode_bool(b: u8) -> HubResult<bool> {
    match b {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(HubError::InvalidWireFormat(format!(
            "state byte must be 0 or 1, got {}",
            other
        ))),
    }
}
