//! railbus - node-side protocol engine for a byte-framed model-railway
//! control bus.
//!
//! The crate implements the framing, checksum, and dispatch logic a small
//! sensor/actuator node needs to participate on a shared half-duplex serial
//! bus: byte-stuffed frames with a running CRC-8, a bounded feature table,
//! a logon/node registry, a secure-acknowledgement retry queue, and the
//! synchronous polling loop that ties them together.
//!
//! # Quick Start
//!
//! ```rust
//! use railbus::{Engine, LoopbackStream};
//!
//! let mut node = Engine::new(LoopbackStream::new(), [0x80, 1, 2, 3, 4, 5, 6]);
//!
//! // Drive the engine from the application main loop.
//! node.poll(0);
//! node.handle_pending();
//! ```
//!
//! # Design
//!
//! - **Bounded memory** - feature table, node table, payload buffer, and
//!   retry pool are fixed-capacity arrays; capacity overflow is a silent
//!   drop, never an allocation.
//! - **Noise tolerance** - framing errors and checksum mismatches discard
//!   the frame and resynchronize on the next poll; nothing panics on
//!   malformed input.
//! - **Single-threaded** - one engine instance per bus connection, driven
//!   by one polling context. No internal locking.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod engine;
pub mod protocol;
pub mod transport;

pub use engine::{Config, Engine};
pub use protocol::{
    ESCAPE, Error, MAGIC, MAX_ADDRESS_LEN, MAX_PAYLOAD_LEN, Message, MessageType, Result,
};
pub use transport::{ByteStream, LoopbackStream};

/// Bus protocol version implemented by this crate (major, minor).
pub const PROTOCOL_VERSION: (u8, u8) = (0, 1);
