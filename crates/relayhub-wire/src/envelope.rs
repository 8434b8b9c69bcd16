//! Datagram envelope: sender hardware address + message payload
//!
//! Layout:
//! - Bytes 0-5: Sender hardware address
//! - Bytes 6..: Message payload (see `message`)

use bytes::{BufMut, Bytes, BytesMut};
use relayhub_core::{HubError, HubResult, MacAddress};

/// Envelope header size in bytes
pub const ENVELOPE_HEADER_SIZE: usize = MacAddress::LEN;

/// Largest payload carried by one envelope (ESP-NOW frame limit)
pub const MAX_PAYLOAD_SIZE: usize = 250;

/// Maximum envelope size
pub const MAX_ENVELOPE_SIZE: usize = ENVELOPE_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Sender-tagged payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub sender: MacAddress,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(sender: MacAddress, payload: impl Into<Bytes>) -> Self {
        Envelope {
            sender,
            payload: payload.into(),
        }
    }

    pub fn serialize(&self) -> HubResult<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(HubError::InvalidWireFormat(format!(
                "payload of {} bytes exceeds {}",
                self.payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.sender.to_bytes());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    pub fn parse(buf: &[u8]) -> HubResult<Self> {
        if buf.len() < ENVELOPE_HEADER_SIZE {
            return Err(HubError::BufferTooShort {
                expected: ENVELOPE_HEADER_SIZE,
                actual: buf.len(),
            });
        }
        if buf.len() > MAX_ENVELOPE_SIZE {
            return Err(HubError::InvalidWireFormat("Envelope exceeds maximum size".into()));
        }

        let sender = MacAddress::from_slice(&buf[..ENVELOPE_HEADER_SIZE])?;
        let payload = Bytes::copy_from_slice(&buf[ENVELOPE_HEADER_SIZE..]);
        Ok(Envelope { sender, payload })
    }
}
