//! Document Codec Module
//!
//! Converts documents to and from the on-disk record format.
//!
//! ## Responsibilities
//! - Frame every write as a self-describing, checksummed record
//! - Detect torn or damaged records on read (CRC32 + length checks)
//! - Keep JSON payloads as a tagged value tree (`serde_json::Value`)
//!
//! ## Record Format (V1, little-endian)
//! ```text
//! ┌───────────┬──────────┬──────────────┬─────────────┬───────┐
//! │ Magic (1) │ Kind (1) │ Sequence (8) │ KeyLen (2)  │  Key  │
//! ├───────────┴──────────┴──────────────┴─────────────┴───────┤
//! │ PayloadLen (4) │        Payload (JSON)       │  CRC32 (4) │
//! └────────────────┴─────────────────────────────┴────────────┘
//! ```
//! - Kind: 0x01 data, 0x02 tombstone (empty payload)
//! - CRC32 covers every byte before it

mod document;
mod record;

pub use document::{validate_key, Document, ID_FIELD, MAX_KEY_LEN};
pub use record::{
    decode_document, decode_record, encode_document, encode_record, encode_tombstone, Record,
    RecordHeader, RecordKind, CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE, PAYLOAD_LEN_SIZE,
    RECORD_MAGIC,
};
