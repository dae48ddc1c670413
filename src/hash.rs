//! The key hasher: a pure function deriving the 32-bit index coordinate from
//! either a plain string key or a structured document projection.

use tiny_keccak::sha3_256;

use value::Value;

/// Hashes `bytes` to a 32-bit digest. Not cryptographic; deterministic and
/// well-distributed is all §4.1 asks for, so the low 4 bytes of a SHA3-256
/// digest (already depended on for the journal's checksum) serve fine.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
	let digest = sha3_256(bytes);
	u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// `hash(original_key, value, key_structure) -> u32` per §4.1.
///
/// An empty `key_structure` means "no projection" (the primary index is
/// keyed directly by `original_key`). A non-empty one projects `value` along
/// the dotted path and hashes the projected value's string form instead.
pub fn hash_key(original_key: &str, value: &Value, key_structure: &str) -> u32 {
	if key_structure.is_empty() {
		hash_bytes(original_key.as_bytes())
	} else {
		match value.project(key_structure) {
			Some(projected) => hash_bytes(projected.to_projected_string().as_bytes()),
			None => hash_bytes(original_key.as_bytes()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::{hash_bytes, hash_key};
	use value::Value;
	use std::collections::BTreeMap;

	#[test]
	fn is_deterministic() {
		assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
		assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
	}

	#[test]
	fn projects_structured_keys() {
		let mut inner = BTreeMap::new();
		inner.insert("s".to_string(), Value::Str("bob".into()));
		let mut doc = BTreeMap::new();
		doc.insert("in".to_string(), Value::Doc(inner));
		let value = Value::Doc(doc);

		let projected = hash_key("irrelevant", &value, "in.s");
		let direct = hash_bytes(b"bob");
		assert_eq!(projected, direct);
	}

	#[test]
	fn empty_key_structure_hashes_original_key() {
		let value = Value::Str("ignored".into());
		assert_eq!(hash_key("k1", &value, ""), hash_bytes(b"k1"));
	}
}
