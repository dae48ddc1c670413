//! The catalog: the durable record of every database/form/index and the id
//! derivation used to name their on-disk artifacts. The catalog file is an
//! append-only sequence of full snapshots (like the per-index log, only the
//! last complete one matters on recovery); each snapshot is a hand-rolled
//! tagged, length-prefixed structure in the same style as the per-index
//! record framing.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use rand::distributions::Alphanumeric;
use rand::Rng;

use error::{ErrorKind, Result};
use form::FormType;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
	pub id: String,
	pub primary: bool,
	pub key_structure: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormMeta {
	pub id: String,
	pub name: String,
	pub comment: String,
	pub form_type: FormType,
	pub indexes: Vec<IndexMeta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseMeta {
	pub id: String,
	pub name: String,
	pub comment: String,
	pub forms: Vec<FormMeta>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
	pub databases: Vec<DatabaseMeta>,
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
	buf.write_u32::<LittleEndian>(s.len() as u32).expect("writing to a Vec never fails; qed");
	buf.extend_from_slice(s.as_bytes());
}

fn read_str(buf: &[u8], offset: &mut usize) -> Result<String> {
	if buf.len() < *offset + 4 {
		bail!(ErrorKind::CatalogCorrupt("truncated string length".into()));
	}
	let len = LittleEndian::read_u32(&buf[*offset..]) as usize;
	*offset += 4;
	if buf.len() < *offset + len {
		bail!(ErrorKind::CatalogCorrupt("truncated string body".into()));
	}
	let s = String::from_utf8(buf[*offset..*offset + len].to_vec())
		.map_err(|_| ErrorKind::CatalogCorrupt("string is not valid utf8".into()))?;
	*offset += len;
	Ok(s)
}

fn need(buf: &[u8], offset: usize, n: usize) -> Result<()> {
	if buf.len() < offset + n {
		bail!(ErrorKind::CatalogCorrupt("truncated catalog snapshot".into()));
	}
	Ok(())
}

impl IndexMeta {
	fn write_to_buf(&self, buf: &mut Vec<u8>) {
		write_str(buf, &self.id);
		buf.push(self.primary as u8);
		write_str(buf, &self.key_structure);
	}

	fn read_from_buf(buf: &[u8], offset: &mut usize) -> Result<Self> {
		let id = read_str(buf, offset)?;
		need(buf, *offset, 1)?;
		let primary = buf[*offset] != 0;
		*offset += 1;
		let key_structure = read_str(buf, offset)?;
		Ok(IndexMeta { id, primary, key_structure })
	}
}

impl FormMeta {
	fn write_to_buf(&self, buf: &mut Vec<u8>) {
		write_str(buf, &self.id);
		write_str(buf, &self.name);
		write_str(buf, &self.comment);
		buf.push(match self.form_type {
			FormType::Sql => 0,
			FormType::Doc => 1,
		});
		buf.write_u32::<LittleEndian>(self.indexes.len() as u32).expect("writing to a Vec never fails; qed");
		for index in &self.indexes {
			index.write_to_buf(buf);
		}
	}

	fn read_from_buf(buf: &[u8], offset: &mut usize) -> Result<Self> {
		let id = read_str(buf, offset)?;
		let name = read_str(buf, offset)?;
		let comment = read_str(buf, offset)?;
		need(buf, *offset, 1)?;
		let form_type = match buf[*offset] {
			0 => FormType::Sql,
			1 => FormType::Doc,
			other => bail!(ErrorKind::CatalogCorrupt(format!("unknown form type tag {}", other))),
		};
		*offset += 1;
		need(buf, *offset, 4)?;
		let count = LittleEndian::read_u32(&buf[*offset..]) as usize;
		*offset += 4;
		let mut indexes = Vec::with_capacity(count);
		for _ in 0..count {
			indexes.push(IndexMeta::read_from_buf(buf, offset)?);
		}
		Ok(FormMeta { id, name, comment, form_type, indexes })
	}
}

impl DatabaseMeta {
	fn write_to_buf(&self, buf: &mut Vec<u8>) {
		write_str(buf, &self.id);
		write_str(buf, &self.name);
		write_str(buf, &self.comment);
		buf.write_u32::<LittleEndian>(self.forms.len() as u32).expect("writing to a Vec never fails; qed");
		for form in &self.forms {
			form.write_to_buf(buf);
		}
	}

	fn read_from_buf(buf: &[u8], offset: &mut usize) -> Result<Self> {
		let id = read_str(buf, offset)?;
		let name = read_str(buf, offset)?;
		let comment = read_str(buf, offset)?;
		need(buf, *offset, 4)?;
		let count = LittleEndian::read_u32(&buf[*offset..]) as usize;
		*offset += 4;
		let mut forms = Vec::with_capacity(count);
		for _ in 0..count {
			forms.push(FormMeta::read_from_buf(buf, offset)?);
		}
		Ok(DatabaseMeta { id, name, comment, forms })
	}
}

impl Catalog {
	pub fn write_to_buf(&self, buf: &mut Vec<u8>) {
		buf.write_u32::<LittleEndian>(self.databases.len() as u32).expect("writing to a Vec never fails; qed");
		for database in &self.databases {
			database.write_to_buf(buf);
		}
	}

	/// Returns the parsed catalog and the number of bytes it occupied, so a
	/// caller can keep scanning for later (more recent) snapshots.
	fn read_from_buf(buf: &[u8]) -> Result<(Self, usize)> {
		need(buf, 0, 4)?;
		let count = LittleEndian::read_u32(buf) as usize;
		let mut offset = 4;
		let mut databases = Vec::with_capacity(count);
		for _ in 0..count {
			databases.push(DatabaseMeta::read_from_buf(buf, &mut offset)?);
		}
		Ok((Catalog { databases }, offset))
	}

	/// Appends a new snapshot to the catalog file (creating it if absent).
	pub fn append<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let mut buf = Vec::new();
		self.write_to_buf(&mut buf);
		let mut file = OpenOptions::new().create(true).append(true).open(path)?;
		file.write_all(&buf)?;
		file.flush()?;
		Ok(())
	}

	/// Reads every snapshot in the catalog file and returns the last
	/// complete one. `None` if the file is absent, empty, or holds no
	/// complete snapshot.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Catalog>> {
		let path: &Path = path.as_ref();
		if !path.exists() {
			return Ok(None);
		}

		let mut bytes = Vec::new();
		File::open(path)?.read_to_end(&mut bytes)?;

		let mut offset = 0;
		let mut last = None;
		while offset < bytes.len() {
			match Catalog::read_from_buf(&bytes[offset..]) {
				Ok((catalog, consumed)) => {
					offset += consumed;
					last = Some(catalog);
				},
				Err(_) => break,
			}
		}
		Ok(last)
	}
}

/// Derives `hex(MD5(name))[:16]`, retrying with a random 3-character
/// alphanumeric suffix appended to the running id on collision with
/// `existing_ids`, per §4.5.
pub fn derive_id(name: &str, existing_ids: &HashSet<String>) -> String {
	let mut id = hex_md5_16(name);
	while existing_ids.contains(&id) {
		let suffix: String = rand::thread_rng().sample_iter(Alphanumeric).take(3).map(char::from).collect();
		id = hex_md5_16(&format!("{}{}", id, suffix));
	}
	id
}

fn hex_md5_16(s: &str) -> String {
	let digest = md5::compute(s.as_bytes());
	format!("{:x}", digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
	use super::{derive_id, Catalog, DatabaseMeta, FormMeta, IndexMeta};
	use form::FormType;
	use std::collections::HashSet;
	use tempdir::TempDir;

	fn sample() -> Catalog {
		Catalog {
			databases: vec![DatabaseMeta {
				id: "d1".into(),
				name: "lily".into(),
				comment: "".into(),
				forms: vec![FormMeta {
					id: "f1".into(),
					name: "_default".into(),
					comment: "".into(),
					form_type: FormType::Doc,
					indexes: vec![IndexMeta { id: "i1".into(), primary: true, key_structure: "".into() }],
				}],
			}],
		}
	}

	#[test]
	fn roundtrips_through_buffer() {
		let catalog = sample();
		let mut buf = Vec::new();
		catalog.write_to_buf(&mut buf);
		let (read, consumed) = Catalog::read_from_buf(&buf).unwrap();
		assert_eq!(read, catalog);
		assert_eq!(consumed, buf.len());
	}

	/// Vec order is part of a catalog's identity: encoding must not reorder
	/// entries, even when they aren't alphabetically sorted to begin with.
	#[test]
	fn roundtrips_multi_entry_catalog_in_original_unsorted_order() {
		let catalog = Catalog {
			databases: vec![
				DatabaseMeta {
					id: "d2".into(),
					name: "zebra".into(),
					comment: "".into(),
					forms: vec![
						FormMeta {
							id: "f2".into(),
							name: "orders".into(),
							comment: "".into(),
							form_type: FormType::Doc,
							indexes: vec![
								IndexMeta { id: "i2".into(), primary: false, key_structure: "total".into() },
								IndexMeta { id: "i1".into(), primary: true, key_structure: "".into() },
							],
						},
						FormMeta {
							id: "f1".into(),
							name: "_default".into(),
							comment: "".into(),
							form_type: FormType::Doc,
							indexes: vec![IndexMeta { id: "i3".into(), primary: true, key_structure: "".into() }],
						},
					],
				},
				DatabaseMeta { id: "d1".into(), name: "apple".into(), comment: "".into(), forms: vec![] },
			],
		};

		let mut buf = Vec::new();
		catalog.write_to_buf(&mut buf);
		let (read, consumed) = Catalog::read_from_buf(&buf).unwrap();
		assert_eq!(read, catalog);
		assert_eq!(consumed, buf.len());
	}

	#[test]
	fn append_then_load_keeps_the_latest_snapshot() {
		let dir = TempDir::new("lily-catalog").unwrap();
		let path = dir.path().join("catalog.db");

		let first = sample();
		first.append(&path).unwrap();

		let mut second = sample();
		second.databases[0].comment = "updated".into();
		second.append(&path).unwrap();

		let loaded = Catalog::load(&path).unwrap().unwrap();
		assert_eq!(loaded, second);
	}

	#[test]
	fn load_of_missing_file_is_none() {
		let dir = TempDir::new("lily-catalog").unwrap();
		assert!(Catalog::load(dir.path().join("missing.db")).unwrap().is_none());
	}

	#[test]
	fn derive_id_is_deterministic_and_retries_on_collision() {
		let mut existing = HashSet::new();
		let id = derive_id("lily", &existing);
		assert_eq!(id, derive_id("lily", &existing));
		assert_eq!(id.len(), 16);

		existing.insert(id.clone());
		let retried = derive_id("lily", &existing);
		assert_ne!(retried, id);
	}
}
