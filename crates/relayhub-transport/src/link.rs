//! Transport boundary

use bytes::Bytes;
use relayhub_core::{HubResult, MacAddress};
use tokio::sync::mpsc;

/// Link-layer result of one send
///
/// Success only means the frame left; it says nothing about whether the
/// unit acted on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    Failure,
}

impl SendOutcome {
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Send side of the wireless link
pub trait Transport: Send + Sync {
    /// Make `address` a deliverable peer
    fn add_peer(&self, address: MacAddress) -> HubResult<()>;

    /// Fire-and-forget send of one payload
    fn send(&self, address: MacAddress, payload: &[u8]) -> SendOutcome;
}

/// One message received from a remote unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub from: MacAddress,
    pub payload: Bytes,
}

impl Inbound {
    pub fn new(from: MacAddress, payload: impl Into<Bytes>) -> Self {
        Inbound {
            from,
            payload: payload.into(),
        }
    }
}

/// Inbound message channel, consumed by the control loop
pub type InboundReceiver = mpsc::Receiver<Inbound>;

/// Inbound message sender, held by the receive context
pub type InboundSender = mpsc::Sender<Inbound>;

/// Create a bounded inbound channel
pub fn inbound_channel(buffer_size: usize) -> (InboundSender, InboundReceiver) {
    mpsc::channel(buffer_size)
}
