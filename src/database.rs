//! A database: a namespace of forms, addressed by name.

use std::collections::HashMap;

use parking_lot::RwLock;

use error::{Error, ErrorKind, Result};
use form::Form;
use node::PutMode;
use selector::{MatchedThing, Selector};
use value::Value;

pub struct Database {
	pub id: String,
	pub name: String,
	pub comment: String,
	forms: RwLock<HashMap<String, Form>>,
}

impl Database {
	pub fn new(id: String, name: String, comment: String) -> Self {
		Database { id, name, comment, forms: RwLock::new(HashMap::new()) }
	}

	pub fn add_form(&self, form: Form) -> Result<()> {
		let mut forms = self.forms.write();
		if forms.contains_key(&form.name) {
			bail!(ErrorKind::FormExists(form.name));
		}
		forms.insert(form.name.clone(), form);
		Ok(())
	}

	pub fn form_names(&self) -> Vec<String> {
		self.forms.read().keys().cloned().collect()
	}

	fn with_form<T>(&self, name: &str, f: impl FnOnce(&Form) -> Result<T>) -> Result<T> {
		let forms = self.forms.read();
		let form = forms.get(name).ok_or_else(|| Error::from(ErrorKind::FormNotFound(name.to_string())))?;
		f(form)
	}

	pub fn put(&self, form: &str, key: &str, value: Value, mode: PutMode) -> Result<()> {
		self.with_form(form, |f| f.put(key, value, mode))
	}

	pub fn get(&self, form: &str, key: &str) -> Result<Value> {
		self.with_form(form, |f| f.get(key))
	}

	pub fn insert_auto(&self, form: &str, value: Value) -> Result<String> {
		self.with_form(form, |f| f.insert_auto(value))
	}

	pub fn remove(&self, form: &str, key: &str) -> Result<()> {
		self.with_form(form, |f| f.remove(key))
	}

	pub fn select(&self, form: &str, selector: &Selector) -> Result<Vec<MatchedThing>> {
		self.with_form(form, |f| f.select(selector))
	}

	pub fn delete(&self, form: &str, selector: &Selector) -> Result<usize> {
		self.with_form(form, |f| f.delete(selector))
	}

	pub fn forms(&self) -> &RwLock<HashMap<String, Form>> {
		&self.forms
	}
}

#[cfg(test)]
mod tests {
	use super::Database;
	use form::{Form, FormType};
	use index::Index;
	use node::PutMode;
	use value::Value;
	use tempdir::TempDir;

	#[test]
	fn unknown_form_is_form_not_found() {
		let db = Database::new("d1".into(), "db".into(), "".into());
		let err = db.get("nope", "k1").unwrap_err();
		assert_eq!(err.kind(), &crate::error::ErrorKind::FormNotFound("nope".into()));
	}

	#[test]
	fn put_and_get_round_trip_through_the_database() {
		let dir = TempDir::new("lily-db").unwrap();
		let db = Database::new("d1".into(), "db".into(), "".into());
		let form = Form::new("f1".into(), "people".into(), FormType::Doc, "".into());
		form.add_index(Index::open("i1".into(), "".into(), true, &dir.path().join("i1.log")).unwrap()).unwrap();
		db.add_form(form).unwrap();

		db.put("people", "alice", Value::Int(30), PutMode::Insert).unwrap();
		assert_eq!(db.get("people", "alice").unwrap(), Value::Int(30));
	}
}
