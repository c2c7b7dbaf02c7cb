//! Tests for the Document Codec
//!
//! These tests verify:
//! - Documents survive encode/decode, including nested and empty structures
//! - Floating point values come back bit for bit
//! - Tombstones carry a key and no payload
//! - Every damaged or truncated record is rejected as CorruptRecord
//! - Key and payload limits are enforced on encode
//! - Implicit document keys

use serde_json::json;
use zelos::codec::{
    decode_document, decode_record, encode_document, encode_record, encode_tombstone, Document,
    Record, RecordHeader, RecordKind, HEADER_SIZE, MAX_KEY_LEN, RECORD_MAGIC,
};
use zelos::ZelosError;

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_document() -> Document {
    Document::new(
        "user:1",
        json!({
            "name": "Ada",
            "age": 36,
            "active": true,
            "score": 99.5,
            "nick": null,
            "tags": ["math", "engines"],
            "address": { "city": "London", "lines": [] }
        }),
    )
}

fn assert_corrupt(result: zelos::Result<impl std::fmt::Debug>) {
    match result {
        Err(ZelosError::CorruptRecord { .. }) => {}
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_document_round_trip() {
    let doc = sample_document();
    let bytes = encode_document(&doc, 7).unwrap();

    let decoded = decode_document(&bytes).unwrap();

    assert_eq!(decoded.key, doc.key);
    assert_eq!(decoded.value, doc.value);
    assert_eq!(decoded.version, 7);
}

#[test]
fn test_empty_structures_round_trip() {
    for value in [json!({}), json!([]), json!(""), json!(0), json!(null), json!([[], {}])] {
        let doc = Document::new("k", value.clone());
        let decoded = decode_document(&encode_document(&doc, 1).unwrap()).unwrap();
        assert_eq!(decoded.value, value);
    }
}

/// Awkward doubles: shortest-repr edge cases, extremes and subnormals
fn awkward_floats() -> Vec<f64> {
    let mut floats = vec![
        0.1,
        1.0 / 3.0,
        -0.0,
        1.0715660391465826e-75,
        f64::MAX,
        f64::MIN,
        f64::MIN_POSITIVE,
        f64::EPSILON,
        5e-324,
        2.2250738585072009e-308,
        9007199254740993.0,
        123456.789e10,
    ];

    // Deterministic sweep over raw bit patterns
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    while floats.len() < 5_000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let f = f64::from_bits(state);
        if f.is_finite() {
            floats.push(f);
        }
    }
    floats
}

#[test]
fn test_floats_round_trip_exactly() {
    for f in awkward_floats() {
        let doc = Document::new("f", json!({ "f": f, "list": [f] }));
        let decoded = decode_document(&encode_document(&doc, 1).unwrap()).unwrap();

        let back = decoded.value["f"].as_f64().unwrap();
        assert_eq!(back.to_bits(), f.to_bits(), "{:e} came back as {:e}", f, back);
        assert_eq!(decoded.value["list"][0].as_f64().unwrap().to_bits(), f.to_bits());
    }
}

#[test]
fn test_deeply_nested_round_trip() {
    let mut value = json!("leaf");
    for depth in 0..64 {
        value = json!({ "depth": depth, "child": value, "list": [depth] });
    }

    let doc = Document::new("deep", value.clone());
    let decoded = decode_document(&encode_document(&doc, 1).unwrap()).unwrap();

    assert_eq!(decoded.value, value);
}

#[test]
fn test_unicode_key_and_value() {
    let doc = Document::new("ключ-🔑", json!({ "text": "héllo wörld ✓" }));
    let decoded = decode_document(&encode_document(&doc, 3).unwrap()).unwrap();

    assert_eq!(decoded.key, "ключ-🔑");
    assert_eq!(decoded.value["text"], "héllo wörld ✓");
}

#[test]
fn test_tombstone_encoding() {
    let bytes = encode_tombstone("gone", 42).unwrap();
    let record = decode_record(&bytes).unwrap();

    assert_eq!(record.kind, RecordKind::Tombstone);
    assert!(record.is_tombstone());
    assert_eq!(record.key, "gone");
    assert_eq!(record.sequence, 42);
    assert!(record.payload.is_empty());
    assert_eq!(bytes.len(), record.encoded_len());
}

#[test]
fn test_tombstone_is_not_a_document() {
    let bytes = encode_tombstone("gone", 1).unwrap();
    assert_corrupt(decode_document(&bytes));
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_layout() {
    let bytes = encode_document(&Document::new("abc", json!(1)), 0x0102).unwrap();

    assert_eq!(bytes[0], RECORD_MAGIC);
    assert_eq!(bytes[1], RecordKind::Data as u8);

    let header = RecordHeader::parse(&bytes[..HEADER_SIZE]).unwrap();
    assert_eq!(header.kind, RecordKind::Data);
    assert_eq!(header.sequence, 0x0102);
    assert_eq!(header.key_len, 3);
}

#[test]
fn test_header_too_short() {
    let bytes = encode_document(&sample_document(), 1).unwrap();
    assert_corrupt(RecordHeader::parse(&bytes[..HEADER_SIZE - 1]));
}

// =============================================================================
// Corruption Detection Tests
// =============================================================================

#[test]
fn test_every_truncation_is_rejected() {
    let bytes = encode_document(&sample_document(), 1).unwrap();

    for len in 0..bytes.len() {
        assert_corrupt(decode_record(&bytes[..len]));
    }
}

#[test]
fn test_every_single_bit_flip_is_rejected() {
    let bytes = encode_document(&Document::new("k", json!({ "a": [1, 2, 3] })), 9).unwrap();

    for i in 0..bytes.len() {
        for bit in 0..8 {
            let mut damaged = bytes.to_vec();
            damaged[i] ^= 1 << bit;
            assert!(
                decode_record(&damaged).is_err(),
                "flip of bit {} in byte {} went unnoticed",
                bit,
                i
            );
        }
    }
}

#[test]
fn test_bad_magic() {
    let mut bytes = encode_document(&sample_document(), 1).unwrap().to_vec();
    bytes[0] = 0x00;

    match decode_record(&bytes) {
        Err(ZelosError::CorruptRecord { offset, reason }) => {
            assert_eq!(offset, 0);
            assert!(reason.contains("magic"));
        }
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}

#[test]
fn test_unknown_kind() {
    let mut bytes = encode_document(&sample_document(), 1).unwrap().to_vec();
    bytes[1] = 0x7F;
    assert_corrupt(decode_record(&bytes));
}

#[test]
fn test_trailing_bytes_rejected() {
    let mut bytes = encode_document(&sample_document(), 1).unwrap().to_vec();
    bytes.push(0);
    assert_corrupt(decode_record(&bytes));
}

#[test]
fn test_checksum_mismatch() {
    let mut bytes = encode_document(&sample_document(), 1).unwrap().to_vec();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    match decode_record(&bytes) {
        Err(ZelosError::CorruptRecord { reason, .. }) => assert!(reason.contains("checksum")),
        other => panic!("expected CorruptRecord, got {:?}", other),
    }
}

#[test]
fn test_non_json_payload_is_corrupt() {
    let bytes = encode_record(&Record::data("k", 1, b"not json".to_vec())).unwrap();

    // Framing is fine, the document is not
    assert!(decode_record(&bytes).is_ok());
    assert_corrupt(decode_document(&bytes));
}

// =============================================================================
// Encode Validation Tests
// =============================================================================

#[test]
fn test_empty_key_rejected() {
    let result = encode_document(&Document::new("", json!({})), 1);
    assert!(matches!(result, Err(ZelosError::InvalidKey(_))));
}

#[test]
fn test_key_length_limit() {
    let max = "k".repeat(MAX_KEY_LEN);
    assert!(encode_document(&Document::new(max, json!(1)), 1).is_ok());

    let over = "k".repeat(MAX_KEY_LEN + 1);
    let result = encode_document(&Document::new(over, json!(1)), 1);
    assert!(matches!(result, Err(ZelosError::InvalidKey(_))));
}

#[test]
fn test_tombstone_with_payload_rejected() {
    let mut record = Record::tombstone("k", 1);
    record.payload = bytes::Bytes::from_static(b"{}");

    assert!(matches!(
        encode_record(&record),
        Err(ZelosError::Serialization(_))
    ));
}

// =============================================================================
// Document Key Tests
// =============================================================================

#[test]
fn test_from_value_uses_id_field() {
    let doc = Document::from_value(json!({ "_id": "order-17", "total": 12 }));
    assert_eq!(doc.key, "order-17");
    assert_eq!(doc.version, 0);
}

#[test]
fn test_from_value_generates_key() {
    let a = Document::from_value(json!({ "total": 12 }));
    let b = Document::from_value(json!({ "total": 12 }));

    assert!(!a.key.is_empty());
    assert_ne!(a.key, b.key);
    assert!(uuid::Uuid::parse_str(&a.key).is_ok());
}

#[test]
fn test_from_value_ignores_non_string_id() {
    let doc = Document::from_value(json!({ "_id": 5 }));
    assert_ne!(doc.key, "5");
    assert!(uuid::Uuid::parse_str(&doc.key).is_ok());
}
