use crate::tag::Tag;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::{Read, Write};

/// A codec-produced payload: base64 text over zstd-compressed CBOR.
///
/// Text-safe so it can live in storage mediums that are not
/// binary-transparent.
pub type Payload = String;

/// Errors from payload encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload root is not a compound")]
    NotCompound,
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

/// Serialize a state tree into its durable text form.
///
/// The root must be a compound; the pipeline is CBOR, zstd level 3, then
/// base64. Deterministic: equal trees produce byte-identical payloads.
pub fn encode(tree: &Tag) -> Result<Payload, CodecError> {
    if !tree.is_compound() {
        return Err(CodecError::NotCompound);
    }
    let mut cbor = Vec::new();
    ciborium::into_writer(tree, &mut cbor).map_err(|e| CodecError::Encode(e.to_string()))?;
    let compressed = zstd_compress(&cbor).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(STANDARD.encode(compressed))
}

/// Decode a payload back into the exact tree it was built from.
///
/// Fails with [`CodecError::CorruptPayload`] if any pipeline stage fails or
/// the decoded root is not a compound; never returns partial data.
pub fn decode(payload: &str) -> Result<Tag, CodecError> {
    let compressed = STANDARD
        .decode(payload)
        .map_err(|e| CodecError::CorruptPayload(format!("base64: {e}")))?;
    let cbor = zstd_decompress(&compressed)
        .map_err(|e| CodecError::CorruptPayload(format!("decompress: {e}")))?;
    let tree: Tag = ciborium::from_reader(cbor.as_slice())
        .map_err(|e| CodecError::CorruptPayload(format!("cbor: {e}")))?;
    if !tree.is_compound() {
        return Err(CodecError::CorruptPayload("root is not a compound".into()));
    }
    Ok(tree)
}

fn zstd_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn zstd_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Tag {
        Tag::compound([
            ("id", Tag::Int(54)),
            ("variant", Tag::Byte(2)),
            (
                "inventory",
                Tag::List(vec![
                    Tag::compound([("index", Tag::Int(0)), ("item", Tag::Str("sword".into()))]),
                    Tag::compound([("index", Tag::Int(5)), ("item", Tag::Str("apple".into()))]),
                ]),
            ),
            ("damage", Tag::Float(0.75)),
            ("weight", Tag::Double(1.5e10)),
            ("tier", Tag::Short(-7)),
            ("seed", Tag::Long(i64::MIN)),
            ("raw", Tag::Bytes(vec![1, 2, 3, 255])),
            ("heights", Tag::IntArray(vec![-1, 0, 64, 320])),
        ])
    }

    #[test]
    fn round_trip_exact() {
        let tree = sample_tree();
        let payload = encode(&tree).unwrap();
        assert_eq!(decode(&payload).unwrap(), tree);
    }

    #[test]
    fn encode_is_deterministic() {
        let tree = sample_tree();
        assert_eq!(encode(&tree).unwrap(), encode(&tree).unwrap());
    }

    #[test]
    fn payload_is_text_safe() {
        let payload = encode(&sample_tree()).unwrap();
        assert!(payload.is_ascii());
        assert!(!payload.contains('\0'));
    }

    #[test]
    fn encode_rejects_non_compound_root() {
        assert!(matches!(
            encode(&Tag::Int(1)),
            Err(CodecError::NotCompound)
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode("not base64!!"),
            Err(CodecError::CorruptPayload(_))
        ));
        // Valid base64 of bytes that are not a zstd frame.
        let bogus = STANDARD.encode(b"hello world");
        assert!(matches!(
            decode(&bogus),
            Err(CodecError::CorruptPayload(_))
        ));
    }

    #[test]
    fn decode_rejects_truncation() {
        let payload = encode(&sample_tree()).unwrap();
        let truncated = &payload[..payload.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn decode_rejects_non_compound_root() {
        // Hand-build a payload whose CBOR root is a bare int.
        let mut cbor = Vec::new();
        ciborium::into_writer(&Tag::Int(7), &mut cbor).unwrap();
        let compressed = zstd_compress(&cbor).unwrap();
        let payload = STANDARD.encode(compressed);
        assert!(matches!(
            decode(&payload),
            Err(CodecError::CorruptPayload(_))
        ));
    }
}
