//! Frame codec: byte-stuffed frames with a trailing running CRC.
//!
//! # Wire format
//!
//! ```text
//! [0xFE] [content bytes, CRC-updated & escaped] [CRC byte, escaped] [0xFE]
//!
//! content = length, address path (<= 4 bytes, zero-terminated inclusive),
//!           msg_num, msg_type, payload (length - addr_len - 2 bytes)
//! escape  = 0xFE / 0xFD on the wire become 0xFD, (byte XOR 0x20)
//! ```
//!
//! The CRC covers the unstuffed content bytes only; the CRC byte itself is
//! escaped on the wire but never folded into the running checksum.

use bytes::{BufMut, BytesMut};

use super::{
    ESCAPE, ESCAPE_XOR, Error, MAGIC, MAX_ADDRESS_LEN, MAX_PAYLOAD_LEN, Message, Result, crc,
};
use crate::transport::ByteStream;

/// Encode a message into a complete wire frame.
#[must_use]
pub fn encode(message: &Message) -> BytesMut {
    // Worst case every content byte plus the CRC is stuffed.
    let content_len = message.content_length() as usize + 1;
    let mut out = BytesMut::with_capacity(2 * (content_len + 1) + 2);

    out.put_u8(MAGIC);

    let mut running = 0u8;
    let mut put_content = |out: &mut BytesMut, byte: u8| {
        running = crc::update(running, byte);
        put_stuffed(out, byte);
    };

    put_content(&mut out, message.content_length());
    for &byte in &message.address()[..message.address_len()] {
        put_content(&mut out, byte);
    }
    put_content(&mut out, message.msg_num());
    put_content(&mut out, message.type_byte());
    for &byte in message.payload() {
        put_content(&mut out, byte);
    }

    put_stuffed(&mut out, running);
    out.put_u8(MAGIC);
    out
}

/// Decode one frame from the stream.
///
/// The caller treats any error as "no message this cycle": the frame is
/// dropped and the next poll resynchronizes on the next start magic. A
/// declared payload larger than [`MAX_PAYLOAD_LEN`] fails the decode rather
/// than overrunning the fixed buffer.
pub fn decode<S: ByteStream + ?Sized>(stream: &mut S) -> Result<Message> {
    let first = read_raw(stream, "start magic")?;
    if first != MAGIC {
        return Err(Error::MissingStartMagic { found: first });
    }

    let mut running = 0u8;
    let content_length = read_content(stream, &mut running, "length byte")?;

    let mut address = [0u8; MAX_ADDRESS_LEN];
    let mut addr_len = 0usize;
    for slot in &mut address {
        *slot = read_content(stream, &mut running, "address path")?;
        addr_len += 1;
        if *slot == 0 {
            break;
        }
    }

    if (content_length as usize) < addr_len + 2 {
        return Err(Error::LengthTooShort {
            declared: content_length,
        });
    }
    let payload_len = content_length as usize - addr_len - 2;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge {
            declared: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let msg_num = read_content(stream, &mut running, "msg_num")?;
    let msg_type = read_content(stream, &mut running, "msg_type")?;

    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    for slot in payload.iter_mut().take(payload_len) {
        *slot = read_content(stream, &mut running, "payload")?;
    }

    // The CRC byte is unstuffed like content but not folded into the sum.
    let mut received = read_raw(stream, "checksum")?;
    if received == ESCAPE {
        received = read_raw(stream, "checksum")? ^ ESCAPE_XOR;
    }

    let last = read_raw(stream, "end magic")?;
    if last != MAGIC {
        return Err(Error::MissingEndMagic { found: last });
    }

    if running != received {
        return Err(Error::ChecksumMismatch {
            computed: running,
            received,
        });
    }

    Ok(Message::from_wire(
        content_length,
        address,
        msg_num,
        msg_type,
        payload,
        payload_len as u8,
    ))
}

fn put_stuffed(out: &mut BytesMut, byte: u8) {
    if byte == MAGIC || byte == ESCAPE {
        out.put_u8(ESCAPE);
        out.put_u8(byte ^ ESCAPE_XOR);
    } else {
        out.put_u8(byte);
    }
}

fn read_raw<S: ByteStream + ?Sized>(stream: &mut S, context: &'static str) -> Result<u8> {
    stream.read().ok_or(Error::Truncated { context })
}

/// Read one content byte: unstuff if escaped, then update the running CRC.
fn read_content<S: ByteStream + ?Sized>(
    stream: &mut S,
    running: &mut u8,
    context: &'static str,
) -> Result<u8> {
    let mut byte = read_raw(stream, context)?;
    if byte == ESCAPE {
        byte = read_raw(stream, context)? ^ ESCAPE_XOR;
    }
    *running = crc::update(*running, byte);
    Ok(byte)
}
