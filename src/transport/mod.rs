//! Byte-stream transport abstraction.
//!
//! The engine treats the bus as a single shared duplex byte channel. The
//! physical transport (UART, RS485 driver, TCP bridge) lives outside this
//! crate; anything implementing [`ByteStream`] can be attached. The
//! [`LoopbackStream`] implementation backs the test suite and doubles as an
//! in-memory frame collector for send interception.

use bytes::{Buf, BufMut, BytesMut};

/// Non-blocking duplex byte channel.
///
/// All three operations must return immediately; blocking belongs to the
/// transport implementation, never to the protocol engine.
pub trait ByteStream {
    /// Number of bytes ready to be read.
    fn available(&self) -> usize;

    /// Read one byte, `None` when the stream is dry.
    fn read(&mut self) -> Option<u8>;

    /// Write one byte to the bus.
    fn write(&mut self, byte: u8);
}

/// In-memory FIFO stream: everything written can be read back.
///
/// Wiring two engine halves to the same loopback gives a zero-wire bus;
/// tests also use it to capture and inspect outbound frames.
#[derive(Debug, Default)]
pub struct LoopbackStream {
    buf: BytesMut,
}

impl LoopbackStream {
    /// Create an empty loopback stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if they had arrived from the bus.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Drain every buffered byte.
    pub fn drain(&mut self) -> Vec<u8> {
        self.buf.split().to_vec()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl ByteStream for LoopbackStream {
    fn available(&self) -> usize {
        self.buf.len()
    }

    fn read(&mut self) -> Option<u8> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.get_u8())
        }
    }

    fn write(&mut self, byte: u8) {
        self.buf.put_u8(byte);
    }
}
