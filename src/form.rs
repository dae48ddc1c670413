//! A form: a primary index plus zero or more secondary indexes kept in
//! convergence with it, guarded by one read-write lock per §5's locking
//! discipline (write for put/remove/delete, read for get/select).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use error::{Error, ErrorKind, Result};
use index::Index;
use node::PutMode;
use selector::{self, MatchedThing, Selector};
use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
	Sql,
	Doc,
}

const PRIMARY_KEY_STRUCTURE: &str = "";

pub struct Form {
	pub id: String,
	pub name: String,
	pub form_type: FormType,
	pub comment: String,
	auto_id: AtomicU64,
	indexes: RwLock<HashMap<String, Index>>,
}

impl Form {
	pub fn new(id: String, name: String, form_type: FormType, comment: String) -> Self {
		Form {
			id,
			name,
			form_type,
			comment,
			auto_id: AtomicU64::new(1),
			indexes: RwLock::new(HashMap::new()),
		}
	}

	pub fn add_index(&self, index: Index) -> Result<()> {
		let mut indexes = self.indexes.write();
		if indexes.contains_key(&index.key_structure) {
			bail!(ErrorKind::IndexExists(index.key_structure.clone()));
		}
		indexes.insert(index.key_structure.clone(), index);
		Ok(())
	}

	pub fn index_structures(&self) -> Vec<String> {
		self.indexes.read().keys().cloned().collect()
	}

	/// `(id, primary, key_structure)` for every index, used to build a
	/// catalog snapshot and to scope id derivation.
	pub fn index_metas(&self) -> Vec<(String, bool, String)> {
		self.indexes.read().values().map(|index| (index.id.clone(), index.primary, index.key_structure.clone())).collect()
	}

	/// Recomputes the auto-id counter from the primary index's current
	/// contents: `1 + max(existing numeric original_key)`, per §4.5.
	pub fn resync_auto_id(&self) {
		let indexes = self.indexes.read();
		let max_existing = match indexes.get(PRIMARY_KEY_STRUCTURE) {
			Some(primary) => primary.things(true).iter().filter_map(|t| t.original_key.parse::<u64>().ok()).max(),
			None => None,
		};
		self.auto_id.store(max_existing.map_or(1, |m| m + 1), Ordering::SeqCst);
	}

	pub fn put(&self, key: &str, value: Value, mode: PutMode) -> Result<()> {
		if key.is_empty() {
			bail!(ErrorKind::KeyIsNil);
		}

		let mut indexes = self.indexes.write();

		{
			let primary = indexes.get_mut(PRIMARY_KEY_STRUCTURE).ok_or_else(|| Error::from(ErrorKind::IndexNotFound(PRIMARY_KEY_STRUCTURE.into())))?;
			primary.put(key, value.clone(), mode)?;
		}

		let secondary_structures: Vec<String> = indexes.keys().filter(|k| !k.is_empty()).cloned().collect();
		for structure in secondary_structures {
			let index = indexes.get_mut(&structure).expect("key was just read from this same map; qed");
			if let Err(e) = index.put(key, value.clone(), mode) {
				warn!("form {}: secondary index {} did not converge for key {}: {}", self.name, structure, key, e);
			}
		}

		Ok(())
	}

	/// Allocates the form's next auto-increment id and inserts `value` under
	/// its decimal-string form, returning the generated key. This is the only
	/// path that produces an auto-assigned key: `put` always requires an
	/// explicit, non-empty key (§4.3/§4.6).
	pub fn insert_auto(&self, value: Value) -> Result<String> {
		let key = self.auto_id.fetch_add(1, Ordering::SeqCst).to_string();
		self.put(&key, value, PutMode::Insert)?;
		Ok(key)
	}

	pub fn get(&self, key: &str) -> Result<Value> {
		let indexes = self.indexes.read();
		let primary = indexes.get(PRIMARY_KEY_STRUCTURE).ok_or_else(|| Error::from(ErrorKind::IndexNotFound(PRIMARY_KEY_STRUCTURE.into())))?;
		primary.get(key).map(Clone::clone)
	}

	pub fn select(&self, selector: &Selector) -> Result<Vec<MatchedThing>> {
		let indexes = self.indexes.read();
		let primary = indexes.get(PRIMARY_KEY_STRUCTURE).ok_or_else(|| Error::from(ErrorKind::IndexNotFound(PRIMARY_KEY_STRUCTURE.into())))?;
		selector::select(primary, selector)
	}

	/// Tombstones a single key through the primary index.
	pub fn remove(&self, key: &str) -> Result<()> {
		let mut indexes = self.indexes.write();
		let primary = indexes.get(PRIMARY_KEY_STRUCTURE).ok_or_else(|| Error::from(ErrorKind::IndexNotFound(PRIMARY_KEY_STRUCTURE.into())))?;
		let value = primary.get(key)?.clone();
		let primary = indexes.get_mut(PRIMARY_KEY_STRUCTURE).expect("checked present above; qed");
		primary.remove(key, &value)
	}

	/// Tombstones every thing the selector matches through the primary
	/// index only; secondaries re-converge on the next recovery, same as
	/// a `put` whose secondary leg fails (§4.4).
	pub fn delete(&self, selector: &Selector) -> Result<usize> {
		let mut indexes = self.indexes.write();
		let matched = {
			let primary = indexes.get(PRIMARY_KEY_STRUCTURE).ok_or_else(|| Error::from(ErrorKind::IndexNotFound(PRIMARY_KEY_STRUCTURE.into())))?;
			selector::select(primary, selector)?
		};

		let primary = indexes.get_mut(PRIMARY_KEY_STRUCTURE).expect("checked present above; qed");
		for thing in &matched {
			primary.remove(&thing.original_key, &thing.value)?;
		}
		Ok(matched.len())
	}
}

#[cfg(test)]
mod tests {
	use super::{Form, FormType};
	use index::Index;
	use node::PutMode;
	use selector::Selector;
	use value::Value;
	use tempdir::TempDir;

	fn sample_form() -> (TempDir, Form) {
		let dir = TempDir::new("lily-form").unwrap();
		let form = Form::new("f1".into(), "people".into(), FormType::Doc, "".into());
		let primary = Index::open("i1".into(), "".into(), true, &dir.path().join("i1.log")).unwrap();
		form.add_index(primary).unwrap();
		(dir, form)
	}

	#[test]
	fn put_with_explicit_key_then_get() {
		let (_dir, form) = sample_form();
		form.put("alice", Value::Int(1), PutMode::Insert).unwrap();
		assert_eq!(form.get("alice").unwrap(), Value::Int(1));
	}

	#[test]
	fn empty_key_is_rejected_regardless_of_mode() {
		let (_dir, form) = sample_form();
		let err = form.put("", Value::Int(1), PutMode::Set).unwrap_err();
		assert_eq!(err.kind(), &crate::error::ErrorKind::KeyIsNil);

		let err = form.put("", Value::Int(1), PutMode::Insert).unwrap_err();
		assert_eq!(err.kind(), &crate::error::ErrorKind::KeyIsNil);
	}

	#[test]
	fn insert_auto_assigns_successive_keys() {
		let (_dir, form) = sample_form();
		let k1 = form.insert_auto(Value::Int(1)).unwrap();
		let k2 = form.insert_auto(Value::Int(2)).unwrap();
		assert_eq!(form.get(&k1).unwrap(), Value::Int(1));
		assert_eq!(form.get(&k2).unwrap(), Value::Int(2));
		assert_ne!(k1, k2);
	}

	#[test]
	fn delete_removes_matching_things() {
		let (_dir, form) = sample_form();
		form.put("a", Value::Int(1), PutMode::Insert).unwrap();
		form.put("b", Value::Int(2), PutMode::Insert).unwrap();

		let deleted = form.delete(&Selector::default()).unwrap();
		assert_eq!(deleted, 2);
		assert!(form.get("a").is_err());
		assert!(form.get("b").is_err());
	}

	#[test]
	fn resync_auto_id_skips_non_numeric_keys() {
		let (_dir, form) = sample_form();
		form.put("alice", Value::Int(1), PutMode::Insert).unwrap();
		let k1 = form.insert_auto(Value::Int(2)).unwrap();
		form.resync_auto_id();
		let k2 = form.insert_auto(Value::Int(3)).unwrap();
		assert_eq!(form.get(&k1).unwrap(), Value::Int(2));
		assert_eq!(form.get(&k2).unwrap(), Value::Int(3));
	}
}
