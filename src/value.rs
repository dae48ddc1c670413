use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use error::{ErrorKind, Result};

/// A structured value stored in a thing, and the thing a secondary index's
/// `key_structure` projects against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	Array(Vec<Value>),
	Doc(BTreeMap<String, Value>),
}

impl Value {
	const TAG_NULL: u8 = 0;
	const TAG_BOOL: u8 = 1;
	const TAG_INT: u8 = 2;
	const TAG_FLOAT: u8 = 3;
	const TAG_STR: u8 = 4;
	const TAG_ARRAY: u8 = 5;
	const TAG_DOC: u8 = 6;

	/// Projects `self` along a dotted path (e.g. `"in.s"`), descending into
	/// nested `Doc`s one field at a time. Returns `None` if any segment is
	/// absent or the path descends into a non-`Doc` value.
	pub fn project(&self, path: &str) -> Option<&Value> {
		if path.is_empty() {
			return Some(self);
		}

		let mut current = self;
		for segment in path.split('.') {
			match current {
				Value::Doc(map) => current = map.get(segment)?,
				_ => return None,
			}
		}
		Some(current)
	}

	/// Stringifies a (usually already-projected) value for hashing.
	pub fn to_projected_string(&self) -> String {
		match *self {
			Value::Null => String::new(),
			Value::Bool(b) => b.to_string(),
			Value::Int(i) => i.to_string(),
			Value::Float(f) => f.to_string(),
			Value::Str(ref s) => s.clone(),
			Value::Array(ref items) => items.iter().map(Value::to_projected_string).collect::<Vec<_>>().join(","),
			Value::Doc(ref map) => map.iter().map(|(k, v)| format!("{}={}", k, v.to_projected_string())).collect::<Vec<_>>().join(","),
		}
	}

	pub fn write_to_buf(&self, buf: &mut Vec<u8>) {
		match *self {
			Value::Null => buf.push(Self::TAG_NULL),
			Value::Bool(b) => {
				buf.push(Self::TAG_BOOL);
				buf.push(b as u8);
			},
			Value::Int(i) => {
				buf.push(Self::TAG_INT);
				buf.write_i64::<LittleEndian>(i).expect("writing to a Vec never fails; qed");
			},
			Value::Float(f) => {
				buf.push(Self::TAG_FLOAT);
				buf.write_f64::<LittleEndian>(f).expect("writing to a Vec never fails; qed");
			},
			Value::Str(ref s) => {
				buf.push(Self::TAG_STR);
				buf.write_u32::<LittleEndian>(s.len() as u32).expect("writing to a Vec never fails; qed");
				buf.extend_from_slice(s.as_bytes());
			},
			Value::Array(ref items) => {
				buf.push(Self::TAG_ARRAY);
				buf.write_u32::<LittleEndian>(items.len() as u32).expect("writing to a Vec never fails; qed");
				for item in items {
					item.write_to_buf(buf);
				}
			},
			Value::Doc(ref map) => {
				buf.push(Self::TAG_DOC);
				buf.write_u32::<LittleEndian>(map.len() as u32).expect("writing to a Vec never fails; qed");
				for (k, v) in map {
					buf.write_u32::<LittleEndian>(k.len() as u32).expect("writing to a Vec never fails; qed");
					buf.extend_from_slice(k.as_bytes());
					v.write_to_buf(buf);
				}
			},
		}
	}

	/// Reads a `Value` from the front of `buf`, returning the value and the
	/// number of bytes consumed.
	pub fn read_from_buf(buf: &[u8]) -> Result<(Value, usize)> {
		if buf.is_empty() {
			bail!(ErrorKind::LogCorrupt("empty buffer while reading value".into()));
		}

		let tag = buf[0];
		let mut offset = 1;

		macro_rules! need {
			($n:expr) => {
				if buf.len() < offset + $n {
					bail!(ErrorKind::LogCorrupt("truncated value".into()));
				}
			};
		}

		let value = match tag {
			Self::TAG_NULL => Value::Null,
			Self::TAG_BOOL => {
				need!(1);
				let b = buf[offset] != 0;
				offset += 1;
				Value::Bool(b)
			},
			Self::TAG_INT => {
				need!(8);
				let i = LittleEndian::read_i64(&buf[offset..]);
				offset += 8;
				Value::Int(i)
			},
			Self::TAG_FLOAT => {
				need!(8);
				let f = LittleEndian::read_f64(&buf[offset..]);
				offset += 8;
				Value::Float(f)
			},
			Self::TAG_STR => {
				need!(4);
				let len = LittleEndian::read_u32(&buf[offset..]) as usize;
				offset += 4;
				need!(len);
				let s = String::from_utf8(buf[offset..offset + len].to_vec())
					.map_err(|_| ErrorKind::LogCorrupt("string value is not valid utf8".into()))?;
				offset += len;
				Value::Str(s)
			},
			Self::TAG_ARRAY => {
				need!(4);
				let count = LittleEndian::read_u32(&buf[offset..]) as usize;
				offset += 4;
				let mut items = Vec::with_capacity(count);
				for _ in 0..count {
					let (item, consumed) = Value::read_from_buf(&buf[offset..])?;
					offset += consumed;
					items.push(item);
				}
				Value::Array(items)
			},
			Self::TAG_DOC => {
				need!(4);
				let count = LittleEndian::read_u32(&buf[offset..]) as usize;
				offset += 4;
				let mut map = BTreeMap::new();
				for _ in 0..count {
					need!(4);
					let key_len = LittleEndian::read_u32(&buf[offset..]) as usize;
					offset += 4;
					need!(key_len);
					let key = String::from_utf8(buf[offset..offset + key_len].to_vec())
						.map_err(|_| ErrorKind::LogCorrupt("doc key is not valid utf8".into()))?;
					offset += key_len;
					let (value, consumed) = Value::read_from_buf(&buf[offset..])?;
					offset += consumed;
					map.insert(key, value);
				}
				Value::Doc(map)
			},
			other => bail!(ErrorKind::LogCorrupt(format!("unknown value tag {}", other))),
		};

		Ok((value, offset))
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Value {
		Value::Str(s.to_owned())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Value {
		Value::Str(s)
	}
}
