//! In-memory representation of one bus message.

use super::types::MessageType;
use super::{MAX_ADDRESS_LEN, MAX_PAYLOAD_LEN};

/// A single protocol transmission unit.
///
/// Storage is fixed-capacity: the address path holds at most four bytes
/// (zero-terminated, terminator included in the path length) and the payload
/// at most [`MAX_PAYLOAD_LEN`] bytes. The `content_length` byte always equals
/// `address_len + 2 + payload_len`, matching what goes on the wire.
///
/// The message type is kept as a raw byte so unknown types survive decoding
/// and dispatch untouched; [`Message::message_type`] interprets it lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    content_length: u8,
    address: [u8; MAX_ADDRESS_LEN],
    msg_num: u8,
    msg_type: u8,
    payload: [u8; MAX_PAYLOAD_LEN],
    payload_len: u8,
}

impl Message {
    /// Create a broadcast message (address path `[0]`).
    #[must_use]
    pub fn broadcast(msg_type: u8, msg_num: u8, payload: &[u8]) -> Self {
        Self::with_address([0, 0, 0, 0], msg_type, msg_num, payload)
    }

    /// Create a message addressed to one bus node.
    ///
    /// Node 0 is the host itself, so the path collapses to the broadcast
    /// form; any other node gets the two-byte path `[node, 0]`.
    #[must_use]
    pub fn addressed(node: u8, msg_type: u8, msg_num: u8, payload: &[u8]) -> Self {
        Self::with_address([node, 0, 0, 0], msg_type, msg_num, payload)
    }

    /// Create a message with an explicit address path.
    #[must_use]
    pub fn with_address(
        address: [u8; MAX_ADDRESS_LEN],
        msg_type: u8,
        msg_num: u8,
        payload: &[u8],
    ) -> Self {
        let take = payload.len().min(MAX_PAYLOAD_LEN);
        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        buf[..take].copy_from_slice(&payload[..take]);

        let addr_len = address_path_len(&address);
        let mut msg = Self {
            content_length: 0,
            address,
            msg_num,
            msg_type,
            payload: buf,
            payload_len: take as u8,
        };
        msg.content_length = (addr_len + 2 + take) as u8;
        msg
    }

    /// Reassemble a message from decoded wire fields.
    ///
    /// Used by the codec, which has already validated the length identity.
    #[must_use]
    pub(crate) fn from_wire(
        content_length: u8,
        address: [u8; MAX_ADDRESS_LEN],
        msg_num: u8,
        msg_type: u8,
        payload: [u8; MAX_PAYLOAD_LEN],
        payload_len: u8,
    ) -> Self {
        Self {
            content_length,
            address,
            msg_num,
            msg_type,
            payload,
            payload_len,
        }
    }

    /// Total content byte count (address path + msg_num + type + payload).
    #[must_use]
    pub const fn content_length(&self) -> u8 {
        self.content_length
    }

    /// Raw address path storage.
    #[must_use]
    pub const fn address(&self) -> &[u8; MAX_ADDRESS_LEN] {
        &self.address
    }

    /// Number of address bytes on the wire, terminator included.
    #[must_use]
    pub fn address_len(&self) -> usize {
        address_path_len(&self.address)
    }

    /// First byte of the address path (0 = host/broadcast).
    #[must_use]
    pub const fn first_address(&self) -> u8 {
        self.address[0]
    }

    /// Caller-assigned sequence number, echoed by responses.
    #[must_use]
    pub const fn msg_num(&self) -> u8 {
        self.msg_num
    }

    /// Raw message type byte.
    #[must_use]
    pub const fn type_byte(&self) -> u8 {
        self.msg_type
    }

    /// Interpreted message type, `None` for unknown bytes.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.msg_type)
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len as usize]
    }
}

/// Path length rule: scan up to four bytes, stop after the first zero.
fn address_path_len(address: &[u8; MAX_ADDRESS_LEN]) -> usize {
    let mut len = 0;
    for &byte in address {
        len += 1;
        if byte == 0 {
            break;
        }
    }
    len
}
