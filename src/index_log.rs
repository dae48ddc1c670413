//! The per-index append-only record log used to recover a [`Mall`](crate::node::Mall)
//! after a restart. Every mutation is appended before it is considered
//! durable; `replay` rebuilds the in-memory tree by re-applying records in
//! file order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use error::{ErrorKind, Result};
use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
	Put = 1,
	Del = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
	pub op: Op,
	pub coord: u32,
	pub key: String,
	pub value: Option<Value>,
}

impl Record {
	fn write_to_buf(&self, buf: &mut Vec<u8>) {
		buf.push(self.op as u8);
		buf.write_u32::<LittleEndian>(self.coord).expect("writing to a Vec never fails; qed");
		buf.write_u16::<LittleEndian>(self.key.len() as u16).expect("writing to a Vec never fails; qed");
		buf.extend_from_slice(self.key.as_bytes());

		match (self.op, &self.value) {
			(Op::Put, Some(value)) => {
				let mut vbuf = Vec::new();
				value.write_to_buf(&mut vbuf);
				buf.write_u32::<LittleEndian>(vbuf.len() as u32).expect("writing to a Vec never fails; qed");
				buf.extend_from_slice(&vbuf);
			},
			_ => buf.write_u32::<LittleEndian>(0).expect("writing to a Vec never fails; qed"),
		}
	}

	fn read_from_buf(buf: &[u8]) -> Result<(Record, usize)> {
		macro_rules! need {
			($offset:expr, $n:expr) => {
				if buf.len() < $offset + $n {
					bail!(ErrorKind::LogCorrupt("truncated record".into()));
				}
			};
		}

		need!(0, 1);
		let op = match buf[0] {
			1 => Op::Put,
			2 => Op::Del,
			other => bail!(ErrorKind::LogCorrupt(format!("unknown record op {}", other))),
		};
		let mut offset = 1;

		need!(offset, 4);
		let coord = LittleEndian::read_u32(&buf[offset..]);
		offset += 4;

		need!(offset, 2);
		let key_len = LittleEndian::read_u16(&buf[offset..]) as usize;
		offset += 2;

		need!(offset, key_len);
		let key = String::from_utf8(buf[offset..offset + key_len].to_vec())
			.map_err(|_| ErrorKind::LogCorrupt("record key is not valid utf8".into()))?;
		offset += key_len;

		need!(offset, 4);
		let value_len = LittleEndian::read_u32(&buf[offset..]) as usize;
		offset += 4;

		let value = match op {
			Op::Put => {
				need!(offset, value_len);
				let (value, consumed) = Value::read_from_buf(&buf[offset..offset + value_len])?;
				if consumed != value_len {
					bail!(ErrorKind::LogCorrupt("record value length mismatch".into()));
				}
				offset += value_len;
				Some(value)
			},
			Op::Del => {
				need!(offset, value_len);
				offset += value_len;
				None
			},
		};

		Ok((Record { op, coord, key, value }, offset))
	}
}

/// An open append-only log file for one index.
pub struct IndexLog {
	file: File,
}

impl IndexLog {
	pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		Ok(IndexLog { file })
	}

	pub fn append_put(&mut self, coord: u32, key: &str, value: &Value) -> Result<()> {
		self.append(&Record { op: Op::Put, coord, key: key.to_string(), value: Some(value.clone()) })
	}

	pub fn append_del(&mut self, coord: u32, key: &str) -> Result<()> {
		self.append(&Record { op: Op::Del, coord, key: key.to_string(), value: None })
	}

	fn append(&mut self, record: &Record) -> Result<()> {
		let mut buf = Vec::new();
		record.write_to_buf(&mut buf);
		self.file.write_all(&buf)?;
		self.file.flush()?;
		Ok(())
	}

	/// Reads every well-formed record from `path` in file order. A record
	/// that fails to parse ends replay there; records read up to that point
	/// are still returned (§7: truncation keeps the valid prefix).
	pub fn replay<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
		let path: &Path = path.as_ref();
		if !path.exists() {
			return Ok(Vec::new());
		}

		let mut bytes = Vec::new();
		File::open(path)?.read_to_end(&mut bytes)?;

		let mut records = Vec::new();
		let mut offset = 0;
		while offset < bytes.len() {
			match Record::read_from_buf(&bytes[offset..]) {
				Ok((record, consumed)) => {
					offset += consumed;
					records.push(record);
				},
				Err(_) => break,
			}
		}
		Ok(records)
	}
}

#[cfg(test)]
mod tests {
	use super::{IndexLog, Op, Record};
	use value::Value;
	use tempdir::TempDir;

	#[test]
	fn record_roundtrips_put_and_del() {
		let put = Record { op: Op::Put, coord: 7, key: "k1".into(), value: Some(Value::Int(9)) };
		let mut buf = Vec::new();
		put.write_to_buf(&mut buf);
		let (read, consumed) = Record::read_from_buf(&buf).unwrap();
		assert_eq!(read, put);
		assert_eq!(consumed, buf.len());

		let del = Record { op: Op::Del, coord: 7, key: "k1".into(), value: None };
		let mut buf = Vec::new();
		del.write_to_buf(&mut buf);
		let (read, consumed) = Record::read_from_buf(&buf).unwrap();
		assert_eq!(read, del);
		assert_eq!(consumed, buf.len());
	}

	#[test]
	fn append_then_replay_recovers_records_in_order() {
		let dir = TempDir::new("lily-log").unwrap();
		let path = dir.path().join("index.log");

		{
			let mut log = IndexLog::open(&path).unwrap();
			log.append_put(1, "k1", &Value::Str("a".into())).unwrap();
			log.append_put(2, "k2", &Value::Str("b".into())).unwrap();
			log.append_del(1, "k1").unwrap();
		}

		let records = IndexLog::replay(&path).unwrap();
		assert_eq!(records.len(), 3);
		assert_eq!(records[0].op, Op::Put);
		assert_eq!(records[1].key, "k2");
		assert_eq!(records[2].op, Op::Del);
	}

	#[test]
	fn replay_of_missing_file_is_empty() {
		let dir = TempDir::new("lily-log").unwrap();
		let records = IndexLog::replay(dir.path().join("missing.log")).unwrap();
		assert!(records.is_empty());
	}

	#[test]
	fn replay_stops_at_first_malformed_record_but_keeps_the_valid_prefix() {
		let dir = TempDir::new("lily-log").unwrap();
		let path = dir.path().join("index.log");

		{
			let mut log = IndexLog::open(&path).unwrap();
			log.append_put(1, "k1", &Value::Str("a".into())).unwrap();
		}
		// Append a truncated trailing record (op byte with no body).
		{
			use std::fs::OpenOptions;
			use std::io::Write;
			let mut file = OpenOptions::new().append(true).open(&path).unwrap();
			file.write_all(&[1u8]).unwrap();
		}

		let records = IndexLog::replay(&path).unwrap();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].key, "k1");
	}
}
