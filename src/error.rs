#![allow(unknown_lints)]
#![allow(missing_docs)]

use std::io;

error_chain! {
	foreign_links {
		Io(io::Error);
	}

	errors {
		DatabaseExists(name: String) {
			description("database already exists")
			display("database already exists: {}", name),
		}
		FormExists(name: String) {
			description("form already exists")
			display("form already exists: {}", name),
		}
		IndexExists(key_structure: String) {
			description("index already exists")
			display("index already exists for key structure: {}", key_structure),
		}
		DataIsNil(name: String) {
			description("database had never been created")
			display("no such database: {}", name),
		}
		FormNotFound(name: String) {
			description("form not found")
			display("no such form: {}", name),
		}
		IndexNotFound(key_structure: String) {
			description("index not found")
			display("no such index for key structure: {}", key_structure),
		}
		KeyIsNil {
			description("put key can not be nil")
			display("put key can not be nil"),
		}
		KeyExists(key: String) {
			description("key already exists")
			display("key already exists: {}", key),
		}
		KeyNotFound(key: String) {
			description("key not found")
			display("key not found: {}", key),
		}
		HashCollision(key: String, existing: String, coord: u32) {
			description("hash collision between distinct keys")
			display("key {} collides with existing key {} at coordinate {}", key, existing, coord),
		}
		CatalogCorrupt(msg: String) {
			description("catalog file is corrupt")
			display("catalog file is corrupt: {}", msg),
		}
		LogCorrupt(msg: String) {
			description("index log is corrupt")
			display("index log is corrupt: {}", msg),
		}
		InvalidOptions(field: &'static str, error: String) {
			description("invalid options were provided")
			display("invalid value of `{}`: {}", field, error),
		}
	}
}

impl PartialEq for ErrorKind {
	fn eq(&self, other: &Self) -> bool {
		use self::ErrorKind::*;

		match (self, other) {
			(&DatabaseExists(ref a), &DatabaseExists(ref b)) => a == b,
			(&FormExists(ref a), &FormExists(ref b)) => a == b,
			(&IndexExists(ref a), &IndexExists(ref b)) => a == b,
			(&DataIsNil(ref a), &DataIsNil(ref b)) => a == b,
			(&FormNotFound(ref a), &FormNotFound(ref b)) => a == b,
			(&IndexNotFound(ref a), &IndexNotFound(ref b)) => a == b,
			(&KeyIsNil, &KeyIsNil) => true,
			(&KeyExists(ref a), &KeyExists(ref b)) => a == b,
			(&KeyNotFound(ref a), &KeyNotFound(ref b)) => a == b,
			(&HashCollision(ref a, ref b, c), &HashCollision(ref a2, ref b2, c2)) =>
				a == a2 && b == b2 && c == c2,
			(&CatalogCorrupt(ref a), &CatalogCorrupt(ref b)) => a == b,
			(&LogCorrupt(ref a), &LogCorrupt(ref b)) => a == b,
			(&InvalidOptions(a, ref b), &InvalidOptions(a2, ref b2)) => a == a2 && b == b2,
			_ => false,
		}
	}
}
