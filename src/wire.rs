//! Confluent wire framing
//!
//! The fixed binary prefix prepended to every serialized payload:
//!
//! ```text
//! byte 0:     magic byte, 0x00
//! bytes 1-4:  schema ID, unsigned 32-bit, big-endian
//! bytes 5+:   (Protobuf only) varint-encoded message-index path,
//!             then the payload; Avro/JSON payloads begin immediately
//! ```
//!
//! This layout is the compatibility contract with existing producer and
//! consumer serializers and must match byte for byte.

use crate::error::{RegistryError, Result};
use crate::schema::SchemaId;

/// Leading byte of every framed payload
pub const MAGIC_BYTE: u8 = 0x00;

/// Length of the fixed prefix: magic byte plus big-endian schema ID
pub const PREFIX_LEN: usize = 5;

/// Frame a payload with the magic byte and schema ID. For Protobuf,
/// `message_indexes` selects the message within the schema file and is
/// encoded between the prefix and the payload.
pub fn encode(schema_id: SchemaId, message_indexes: Option<&[i32]>, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PREFIX_LEN + payload.len() + 4);
    out.push(MAGIC_BYTE);
    out.extend_from_slice(&schema_id.to_be_bytes());
    if let Some(indexes) = message_indexes {
        encode_message_indexes(indexes, &mut out);
    }
    out.extend_from_slice(payload);
    out
}

/// Decode the fixed prefix, returning the schema ID and the remaining
/// bytes (for Protobuf, the message-index path followed by the payload).
pub fn decode_prefix(bytes: &[u8]) -> Result<(SchemaId, &[u8])> {
    if bytes.len() < PREFIX_LEN {
        return Err(RegistryError::Wire(format!(
            "payload too short: {} bytes, need at least {}",
            bytes.len(),
            PREFIX_LEN
        )));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(RegistryError::Wire(format!(
            "bad magic byte: 0x{:02x}",
            bytes[0]
        )));
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((id, &bytes[PREFIX_LEN..]))
}

/// Encode a Protobuf message-index path: the count followed by each index,
/// all as zigzag varints. The overwhelmingly common path `[0]` (first
/// message in the file) compresses to the single byte 0x00.
pub fn encode_message_indexes(indexes: &[i32], out: &mut Vec<u8>) {
    if indexes == [0] {
        out.push(0x00);
        return;
    }
    put_zigzag_varint(indexes.len() as i32, out);
    for &index in indexes {
        put_zigzag_varint(index, out);
    }
}

/// Decode a Protobuf message-index path, returning the indexes and the
/// remaining payload bytes.
pub fn decode_message_indexes(bytes: &[u8]) -> Result<(Vec<i32>, &[u8])> {
    let (count, mut rest) = get_zigzag_varint(bytes)?;
    if count == 0 {
        // The shortcut encoding for [0].
        return Ok((vec![0], rest));
    }
    if count < 0 || count > 128 {
        return Err(RegistryError::Wire(format!(
            "unreasonable message-index count: {}",
            count
        )));
    }
    let mut indexes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (index, tail) = get_zigzag_varint(rest)?;
        indexes.push(index);
        rest = tail;
    }
    Ok((indexes, rest))
}

fn put_zigzag_varint(value: i32, out: &mut Vec<u8>) {
    let mut encoded = ((value << 1) ^ (value >> 31)) as u32;
    loop {
        let byte = (encoded & 0x7f) as u8;
        encoded >>= 7;
        if encoded == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn get_zigzag_varint(bytes: &[u8]) -> Result<(i32, &[u8])> {
    let mut value: u32 = 0;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            let decoded = ((value >> 1) as i32) ^ -((value & 1) as i32);
            return Ok((decoded, &bytes[i + 1..]));
        }
        shift += 7;
        if shift >= 32 {
            return Err(RegistryError::Wire("varint overflows 32 bits".to_string()));
        }
    }
    Err(RegistryError::Wire("truncated varint".to_string()))
}
