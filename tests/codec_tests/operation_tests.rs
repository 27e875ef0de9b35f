//! Tests for operation records
//!
//! These tests verify:
//! - The exact byte layout of records
//! - Decoding borrows from the record
//! - Malformed records are rejected

use emberkv::codec::{OpKind, Operation, RecordEncoder};
use emberkv::error::EmberError;

// =============================================================================
// Helper Functions
// =============================================================================

fn encode(op: &Operation<'_>) -> Vec<u8> {
    let mut enc = RecordEncoder::new();
    op.encode(&mut enc);
    enc.as_bytes().to_vec()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_set_tx_layout() {
    let bytes = encode(&Operation::SetTx {
        key: "k",
        value: b"vv",
        expire_at: 5,
    });

    // tag, len(k), 'k', len(vv), 'v', 'v', zigzag(5)
    assert_eq!(bytes, vec![0x01, 1, b'k', 2, b'v', b'v', 10]);
}

#[test]
fn test_remove_layout() {
    let bytes = encode(&Operation::Remove {
        keys: vec!["a", "bc"],
    });

    assert_eq!(bytes, vec![0x02, 2, 1, b'a', 2, b'b', b'c']);
}

#[test]
fn test_negative_delta_is_zigzagged() {
    let bytes = encode(&Operation::Incr {
        key: "n",
        delta: -1,
    });

    assert_eq!(bytes, vec![0x04, 1, b'n', 1]);
}

#[test]
fn test_rename_layout() {
    let bytes = encode(&Operation::Rename {
        from: "a",
        to: "b",
        overwrite: true,
    });

    assert_eq!(bytes, vec![0x05, 1, b'a', 1, b'b', 1]);
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_every_kind() {
    let ops = vec![
        Operation::SetTx {
            key: "user:1",
            value: &[0, 159, 146, 150],
            expire_at: 1_700_000_000_000_000_000,
        },
        Operation::Remove {
            keys: vec!["a", "b", "c"],
        },
        Operation::SetTtl {
            key: "user:1",
            expire_at: 0,
        },
        Operation::Incr {
            key: "counter",
            delta: i64::MIN,
        },
        Operation::Rename {
            from: "old",
            to: "new",
            overwrite: false,
        },
    ];

    for op in &ops {
        let bytes = encode(op);
        assert_eq!(OpKind::try_from(bytes[0]).unwrap(), op.kind());
        assert_eq!(&Operation::decode(&bytes).unwrap(), op);
    }
}

#[test]
fn test_decoded_fields_borrow_the_record() {
    let bytes = encode(&Operation::SetTx {
        key: "key",
        value: b"value",
        expire_at: 0,
    });

    match Operation::decode(&bytes).unwrap() {
        Operation::SetTx { key, value, .. } => {
            let range = bytes.as_ptr_range();
            assert!(range.contains(&key.as_ptr()));
            assert!(range.contains(&value.as_ptr()));
        }
        other => panic!("unexpected operation {:?}", other),
    }
}

#[test]
fn test_empty_key_and_value() {
    let op = Operation::SetTx {
        key: "",
        value: b"",
        expire_at: 0,
    };
    assert_eq!(Operation::decode(&encode(&op)).unwrap(), op);
}

// =============================================================================
// Malformed Records
// =============================================================================

#[test]
fn test_unknown_tag() {
    assert!(matches!(
        Operation::decode(&[0x7f, 0]),
        Err(EmberError::UnsupportedValueType(0x7f))
    ));
}

#[test]
fn test_empty_record() {
    assert!(matches!(
        Operation::decode(&[]),
        Err(EmberError::CorruptLogRecord(_))
    ));
}

#[test]
fn test_truncated_field() {
    let bytes = encode(&Operation::SetTx {
        key: "key",
        value: b"value",
        expire_at: 0,
    });

    for cut in 1..bytes.len() {
        assert!(
            matches!(
                Operation::decode(&bytes[..cut]),
                Err(EmberError::CorruptLogRecord(_))
            ),
            "prefix of {} bytes decoded",
            cut
        );
    }
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = encode(&Operation::SetTtl {
        key: "k",
        expire_at: 1,
    });
    bytes.push(0);

    assert!(matches!(
        Operation::decode(&bytes),
        Err(EmberError::CorruptLogRecord(_))
    ));
}

#[test]
fn test_invalid_bool_and_utf8() {
    assert!(matches!(
        Operation::decode(&[0x05, 1, b'a', 1, b'b', 2]),
        Err(EmberError::CorruptLogRecord(_))
    ));
    assert!(matches!(
        Operation::decode(&[0x03, 1, 0xff, 0]),
        Err(EmberError::CorruptLogRecord(_))
    ));
}

#[test]
fn test_remove_count_larger_than_record() {
    assert!(matches!(
        Operation::decode(&[0x02, 200, 1, b'a']),
        Err(EmberError::CorruptLogRecord(_))
    ));
}
