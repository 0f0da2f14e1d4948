//! Bus protocol core: wire constants, message model, CRC, and frame codec.

pub mod codec;
pub mod crc;
mod error;
mod message;
mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use message::Message;
pub use types::{MessageType, booster, cs, feature, fw, pom};

/// Frame delimiter byte. Starts and ends every frame on the wire.
pub const MAGIC: u8 = 0xFE;

/// Escape introducer for byte-stuffing.
pub const ESCAPE: u8 = 0xFD;

/// XOR applied to a stuffed byte following [`ESCAPE`].
pub const ESCAPE_XOR: u8 = 0x20;

/// Fixed answer to a system magic query.
pub const SYS_MAGIC: u8 = 0xAF;

/// Maximum number of address bytes in a message path.
pub const MAX_ADDRESS_LEN: usize = 4;

/// Maximum number of payload bytes in a message.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Length of a node unique identifier in bytes.
pub const UNIQUE_ID_LEN: usize = 7;
