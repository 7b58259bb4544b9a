//! Storage encoding of object trees.
//!
//! An object is written as its event-free snapshot, serialized to JSON and
//! zlib-compressed. Decoding either yields a complete, validated tree or an
//! error; a partially read object is never returned.

use crate::error::CodecError;
use crate::object::{ObjectSnapshot, WorldObject};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::io::prelude::*;

pub fn encode(object: &WorldObject) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(&object.persistent_snapshot())?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

pub fn decode(bytes: &[u8]) -> Result<WorldObject, CodecError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;

    let snapshot: ObjectSnapshot = serde_json::from_slice(&json)?;
    Ok(WorldObject::from_snapshot(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_not_persisted() {
        let mut object = WorldObject::new();
        object.put("name", "lamp");
        object.add_event("flicker", "once");

        let decoded = decode(&encode(&object).unwrap()).unwrap();

        assert_eq!(decoded, object);
        assert!(decoded.events().is_empty());
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let mut object = WorldObject::new();
        object.put("description", "a rather long description ".repeat(20));
        let bytes = encode(&object).unwrap();

        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
        assert!(decode(b"not zlib at all").is_err());
    }
}
