//! Record codec
//!
//! Encoding and decoding functions for on-disk records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::document::{validate_key, Document};
use crate::error::{Result, ZelosError};

/// Magic/version byte opening every record; bump on any format change
pub const RECORD_MAGIC: u8 = 0x5A;

/// Fixed header: Magic (1) + Kind (1) + Sequence (8) + KeyLen (2) = 12 bytes
pub const HEADER_SIZE: usize = 12;

/// Payload length prefix (u32)
pub const PAYLOAD_LEN_SIZE: usize = 4;

/// Trailing CRC32
pub const CRC_SIZE: usize = 4;

/// Maximum payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Data = 0x01,
    Tombstone = 0x02,
}

impl RecordKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(RecordKind::Data),
            0x02 => Some(RecordKind::Tombstone),
            _ => None,
        }
    }
}

/// The fixed-width prefix of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    pub sequence: u64,
    pub key_len: usize,
}

impl RecordHeader {
    /// Parse and validate the first `HEADER_SIZE` bytes of a record
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ZelosError::corrupt(
                0,
                format!(
                    "incomplete header: expected {} bytes, got {}",
                    HEADER_SIZE,
                    bytes.len()
                ),
            ));
        }

        let mut cursor = &bytes[..HEADER_SIZE];
        let magic = cursor.get_u8();
        if magic != RECORD_MAGIC {
            return Err(ZelosError::corrupt(
                0,
                format!("bad magic byte 0x{:02x}", magic),
            ));
        }

        let kind_byte = cursor.get_u8();
        let kind = RecordKind::from_byte(kind_byte).ok_or_else(|| {
            ZelosError::corrupt(1, format!("unknown record kind 0x{:02x}", kind_byte))
        })?;

        let sequence = cursor.get_u64_le();
        let key_len = cursor.get_u16_le() as usize;

        Ok(Self {
            kind,
            sequence,
            key_len,
        })
    }
}

/// A decoded record
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub sequence: u64,
    pub key: String,
    /// JSON text for data records, empty for tombstones
    pub payload: Bytes,
}

impl Record {
    pub fn data(key: impl Into<String>, sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: RecordKind::Data,
            sequence,
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn tombstone(key: impl Into<String>, sequence: u64) -> Self {
        Self {
            kind: RecordKind::Tombstone,
            sequence,
            key: key.into(),
            payload: Bytes::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.kind == RecordKind::Tombstone
    }

    /// Size of this record once framed
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + PAYLOAD_LEN_SIZE + self.payload.len() + CRC_SIZE
    }

    /// Parse the payload into a document
    pub fn into_document(self) -> Result<Document> {
        let payload_offset = (HEADER_SIZE + self.key.len() + PAYLOAD_LEN_SIZE) as u64;

        if self.is_tombstone() {
            return Err(ZelosError::corrupt(0, "tombstone record has no document"));
        }

        let value = serde_json::from_slice(&self.payload)
            .map_err(|e| ZelosError::corrupt(payload_offset, format!("invalid JSON: {}", e)))?;

        Ok(Document {
            key: self.key,
            value,
            version: self.sequence,
        })
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record to bytes
pub fn encode_record(record: &Record) -> Result<Bytes> {
    validate_key(&record.key)?;

    if record.payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(ZelosError::Serialization(format!(
            "Payload too large: {} bytes (max {})",
            record.payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }
    if record.is_tombstone() && !record.payload.is_empty() {
        return Err(ZelosError::Serialization(
            "tombstone records carry no payload".to_string(),
        ));
    }

    let mut buf = BytesMut::with_capacity(record.encoded_len());
    buf.put_u8(RECORD_MAGIC);
    buf.put_u8(record.kind as u8);
    buf.put_u64_le(record.sequence);
    buf.put_u16_le(record.key.len() as u16);
    buf.put_slice(record.key.as_bytes());
    buf.put_u32_le(record.payload.len() as u32);
    buf.put_slice(&record.payload);

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);

    Ok(buf.freeze())
}

/// Encode a document as a data record stamped with `sequence`
pub fn encode_document(document: &Document, sequence: u64) -> Result<Bytes> {
    let payload = serde_json::to_vec(&document.value)?;
    encode_record(&Record::data(document.key.clone(), sequence, payload))
}

/// Encode a tombstone for `key`
pub fn encode_tombstone(key: &str, sequence: u64) -> Result<Bytes> {
    encode_record(&Record::tombstone(key, sequence))
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode exactly one record from `buf`
///
/// Fails with `CorruptRecord` (offsets relative to `buf`) when the header is
/// invalid, a declared length runs past the buffer, bytes trail the record,
/// or the checksum does not match.
pub fn decode_record(buf: &[u8]) -> Result<Record> {
    let header = RecordHeader::parse(buf)?;

    let mut cursor = &buf[HEADER_SIZE..];
    if cursor.len() < header.key_len + PAYLOAD_LEN_SIZE {
        return Err(ZelosError::corrupt(
            HEADER_SIZE as u64,
            format!("key length {} runs past the buffer", header.key_len),
        ));
    }

    let (key_bytes, rest) = cursor.split_at(header.key_len);
    cursor = rest;

    let payload_len = cursor.get_u32_le();
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ZelosError::corrupt(
            (HEADER_SIZE + header.key_len) as u64,
            format!("payload length {} exceeds maximum", payload_len),
        ));
    }

    let payload_len = payload_len as usize;
    if cursor.len() < payload_len + CRC_SIZE {
        return Err(ZelosError::corrupt(
            (HEADER_SIZE + header.key_len) as u64,
            format!("payload length {} runs past the buffer", payload_len),
        ));
    }

    let (payload, rest) = cursor.split_at(payload_len);
    cursor = rest;

    let body_len = buf.len() - cursor.len();
    let stored_crc = cursor.get_u32_le();
    if cursor.has_remaining() {
        return Err(ZelosError::corrupt(
            (body_len + CRC_SIZE) as u64,
            format!("{} trailing bytes after record", cursor.remaining()),
        ));
    }

    let computed_crc = crc32fast::hash(&buf[..body_len]);
    if stored_crc != computed_crc {
        return Err(ZelosError::corrupt(
            body_len as u64,
            format!(
                "checksum mismatch: stored 0x{:08x}, computed 0x{:08x}",
                stored_crc, computed_crc
            ),
        ));
    }

    let key = std::str::from_utf8(key_bytes)
        .map_err(|e| ZelosError::corrupt(HEADER_SIZE as u64, format!("key is not UTF-8: {}", e)))?
        .to_string();

    if header.kind == RecordKind::Tombstone && !payload.is_empty() {
        return Err(ZelosError::corrupt(0, "tombstone record carries a payload"));
    }

    Ok(Record {
        kind: header.kind,
        sequence: header.sequence,
        key,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Decode a data record straight into a document
pub fn decode_document(buf: &[u8]) -> Result<Document> {
    decode_record(buf)?.into_document()
}
