//! An index: one hashed tree ([`Mall`]) plus the append log that recovers it.
//! A form owns one primary index (`key_structure` empty, keyed directly by
//! the caller's key) and zero or more secondary indexes (`key_structure` a
//! dotted path projected out of the stored value).

use parking_lot::Mutex;

use error::Result;
use hash::hash_key;
use index_log::IndexLog;
use node::{Mall, PutMode};
use value::Value;

pub struct Index {
	pub id: String,
	pub key_structure: String,
	pub primary: bool,
	root: Mall,
	log: Mutex<IndexLog>,
}

impl Index {
	pub fn open(id: String, key_structure: String, primary: bool, log_path: &::std::path::Path) -> Result<Self> {
		Ok(Index {
			id,
			key_structure,
			primary,
			root: Mall::new(),
			log: Mutex::new(IndexLog::open(log_path)?),
		})
	}

	fn coordinate(&self, original_key: &str, value: &Value) -> u32 {
		hash_key(original_key, value, &self.key_structure)
	}

	pub fn put(&mut self, original_key: &str, value: Value, mode: PutMode) -> Result<u32> {
		let coord = self.coordinate(original_key, &value);
		self.root.put(original_key, coord, value.clone(), mode)?;
		self.log.lock().append_put(coord, original_key, &value)?;
		Ok(coord)
	}

	pub fn get(&self, original_key: &str) -> Result<&Value> {
		let coord = self.coordinate(original_key, &Value::Null);
		self.root.get(original_key, coord)
	}

	pub fn remove(&mut self, original_key: &str, value_hint: &Value) -> Result<()> {
		let coord = self.coordinate(original_key, value_hint);
		self.root.remove(original_key, coord)?;
		self.log.lock().append_del(coord, original_key)?;
		Ok(())
	}

	/// All live things, ascending or descending by coordinate.
	pub fn things(&self, ascending: bool) -> Vec<&crate::node::Thing> {
		self.root.collect(ascending)
	}

	/// Replays the index's own log into its (empty, just-opened) root.
	/// Last write for a coordinate wins, matching file order.
	pub fn recover(&mut self, log_path: &::std::path::Path) -> Result<()> {
		use index_log::Op;

		for record in IndexLog::replay(log_path)? {
			match record.op {
				Op::Put => {
					let value = record.value.expect("Put records always carry a value; qed");
					// Recovery re-applies history verbatim: overwrite, don't fail on repeats.
					if let Err(e) = self.root.put(&record.key, record.coord, value, PutMode::Set) {
						warn!("index {}: skipping unreplayable record for key {}: {}", self.id, record.key, e);
					}
				},
				Op::Del => {
					let _ = self.root.remove(&record.key, record.coord);
				},
			}
		}
		Ok(())
	}
}
