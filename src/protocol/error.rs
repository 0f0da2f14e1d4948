//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding a frame from the bus.
///
/// All of these are recoverable by policy: the polling loop drops the frame,
/// logs it, and resynchronizes on the next start magic. None of them should
/// ever abort the engine - single-byte corruption is routine on a shared bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The first byte read was not the start magic.
    #[error("frame does not start with magic 0xFE, got {found:#04x}")]
    MissingStartMagic {
        /// Byte actually read.
        found: u8,
    },

    /// The byte after the checksum was not the end magic.
    #[error("frame does not end with magic 0xFE, got {found:#04x}")]
    MissingEndMagic {
        /// Byte actually read.
        found: u8,
    },

    /// The stream ran dry mid-frame.
    #[error("stream exhausted while reading {context}")]
    Truncated {
        /// Frame section being read when the stream ran out.
        context: &'static str,
    },

    /// Running CRC over the content bytes disagrees with the trailing CRC.
    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch {
        /// Locally computed running CRC.
        computed: u8,
        /// CRC byte carried by the frame.
        received: u8,
    },

    /// Declared content length implies more payload than a message can hold.
    #[error("declared payload of {declared} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Payload length derived from the length byte.
        declared: usize,
        /// Fixed payload capacity.
        max: usize,
    },

    /// Declared content length is shorter than the mandatory fields.
    #[error("content length {declared} too short for address and header bytes")]
    LengthTooShort {
        /// Length byte carried by the frame.
        declared: u8,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
