//! `Lily`: the top-level handle. Owns the catalog file lock, the in-memory
//! database map, and the start/stop/restart lifecycle, mirroring the
//! teacher's acquire-lock-on-open posture applied to a catalog file instead
//! of a single mmap'd data file.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::fs::File;
use std::sync::Arc;

use fs2::FileExt;
use itertools::Itertools;
use parking_lot::Mutex;
use rayon::prelude::*;

use catalog::{self, Catalog, DatabaseMeta, FormMeta, IndexMeta};
use database::Database;
use error::{Error, ErrorKind, Result};
use form::{Form, FormType};
use index::Index;
use node::PutMode;
use options::{InternalOptions, Options};
use selector::{MatchedThing, Selector};
use value::Value;

const DEFAULT_DATABASE: &str = "lily";
const USER_FORM: &str = "_user";
const DEFAULT_FORM: &str = "_default";

pub struct Lily {
	options: InternalOptions,
	databases: Mutex<HashMap<String, Arc<Database>>>,
	lock_file: Mutex<Option<File>>,
}

impl Lily {
	/// Opens (creating if needed) the data directory, takes the catalog's
	/// exclusive lock, and either recovers an existing catalog or bootstraps
	/// a fresh one with the default `lily` database.
	pub fn start(options: Options) -> Result<Self> {
		let options = InternalOptions::from_external(options)?;
		fs::create_dir_all(&options.data_dir)?;

		let lock_file = File::create(options.catalog_path().with_extension("lock"))?;
		lock_file.try_lock_exclusive().map_err(|e| Error::from(ErrorKind::CatalogCorrupt(format!("catalog already locked: {}", e))))?;

		let databases = match Catalog::load(options.catalog_path())? {
			Some(catalog) => {
				info!("recovering catalog from {:?}", options.catalog_path());
				recover_from_catalog(&options, catalog)?
			},
			None => HashMap::new(),
		};

		let lily = Lily { options, databases: Mutex::new(databases), lock_file: Mutex::new(Some(lock_file)) };

		if lily.databases.lock().is_empty() {
			lily.bootstrap()?;
		}

		Ok(lily)
	}

	fn bootstrap(&self) -> Result<()> {
		info!("bootstrapping default database {}", DEFAULT_DATABASE);
		self.create_database(DEFAULT_DATABASE, "")?;
		self.create_form(DEFAULT_DATABASE, USER_FORM, FormType::Sql, "")?;
		self.create_form(DEFAULT_DATABASE, DEFAULT_FORM, FormType::Doc, "")?;
		Ok(())
	}

	/// Releases the catalog lock. The registry may be `restart`ed afterward.
	pub fn stop(&self) -> Result<()> {
		if let Some(file) = self.lock_file.lock().take() {
			FileExt::unlock(&file)?;
		}
		Ok(())
	}

	/// Re-acquires the catalog lock and re-recovers the in-memory state from
	/// disk, discarding whatever was in memory.
	pub fn restart(&self) -> Result<()> {
		self.stop()?;

		let lock_file = File::create(self.options.catalog_path().with_extension("lock"))?;
		lock_file.try_lock_exclusive().map_err(|e| Error::from(ErrorKind::CatalogCorrupt(format!("catalog already locked: {}", e))))?;
		*self.lock_file.lock() = Some(lock_file);

		let databases = match Catalog::load(self.options.catalog_path())? {
			Some(catalog) => recover_from_catalog(&self.options, catalog)?,
			None => HashMap::new(),
		};
		*self.databases.lock() = databases;
		Ok(())
	}

	fn all_ids(&self, databases: &HashMap<String, Arc<Database>>) -> HashSet<String> {
		let mut ids = HashSet::new();
		for db in databases.values() {
			ids.insert(db.id.clone());
			for form in db.forms().read().values() {
				ids.insert(form.id.clone());
				for (id, _, _) in form.index_metas() {
					ids.insert(id);
				}
			}
		}
		ids
	}

	pub fn create_database(&self, name: &str, comment: &str) -> Result<()> {
		let mut databases = self.databases.lock();
		if databases.contains_key(name) {
			bail!(ErrorKind::DatabaseExists(name.to_string()));
		}
		let existing_ids = self.all_ids(&databases);
		let id = catalog::derive_id(name, &existing_ids);
		databases.insert(name.to_string(), Arc::new(Database::new(id, name.to_string(), comment.to_string())));
		drop(databases);
		self.persist_catalog()?;
		info!("created database {}", name);
		Ok(())
	}

	pub fn get_database(&self, name: &str) -> Result<Arc<Database>> {
		self.databases.lock().get(name).cloned().ok_or_else(|| ErrorKind::DataIsNil(name.to_string()).into())
	}

	pub fn get_databases(&self) -> Vec<String> {
		self.databases.lock().keys().cloned().collect()
	}

	pub fn create_form(&self, database: &str, name: &str, form_type: FormType, comment: &str) -> Result<()> {
		let db = self.get_database(database)?;

		let existing_ids = self.all_ids(&self.databases.lock());
		let form_id = catalog::derive_id(name, &existing_ids);
		let form = Form::new(form_id.clone(), name.to_string(), form_type, comment.to_string());

		let mut scoped_ids = existing_ids;
		scoped_ids.insert(form_id.clone());
		let index_id = catalog::derive_id(&format!("{}:primary", name), &scoped_ids);

		fs::create_dir_all(self.options.form_dir(&db.id, &form_id))?;
		let log_path = self.options.index_log_path(&db.id, &form_id, &index_id);
		form.add_index(Index::open(index_id, String::new(), true, &log_path)?)?;

		db.add_form(form)?;
		self.persist_catalog()?;
		info!("created form {} in database {}", name, database);
		Ok(())
	}

	pub fn create_index(&self, database: &str, form_name: &str, key_structure: &str, _comment: &str) -> Result<()> {
		let db = self.get_database(database)?;
		let existing_ids = self.all_ids(&self.databases.lock());

		let form_id = {
			let forms = db.forms().read();
			let form = forms.get(form_name).ok_or_else(|| Error::from(ErrorKind::FormNotFound(form_name.to_string())))?;
			form.id.clone()
		};

		let index_id = catalog::derive_id(&format!("{}:{}", form_name, key_structure), &existing_ids);
		let log_path = self.options.index_log_path(&db.id, &form_id, &index_id);

		let forms = db.forms().read();
		let form = forms.get(form_name).ok_or_else(|| Error::from(ErrorKind::FormNotFound(form_name.to_string())))?;
		form.add_index(Index::open(index_id, key_structure.to_string(), false, &log_path)?)?;
		drop(forms);

		self.persist_catalog()?;
		info!("created index {} on form {} in database {}", key_structure, form_name, database);
		Ok(())
	}

	pub fn put(&self, database: &str, form: &str, key: &str, value: Value, mode: PutMode) -> Result<()> {
		if key.is_empty() {
			bail!(ErrorKind::KeyIsNil);
		}
		self.get_database(database)?.put(form, key, value, mode)
	}

	pub fn get(&self, database: &str, form: &str, key: &str) -> Result<Value> {
		self.get_database(database)?.get(form, key)
	}

	/// Allocates the form's next auto-increment id and inserts `value` under
	/// it, returning the generated key (§4.3).
	pub fn insert_auto(&self, database: &str, form: &str, value: Value) -> Result<String> {
		self.get_database(database)?.insert_auto(form, value)
	}

	pub fn remove(&self, database: &str, form: &str, key: &str) -> Result<()> {
		if key.is_empty() {
			bail!(ErrorKind::KeyIsNil);
		}
		self.get_database(database)?.remove(form, key)
	}

	pub fn select(&self, database: &str, form: &str, selector: &Selector) -> Result<Vec<MatchedThing>> {
		self.get_database(database)?.select(form, selector)
	}

	pub fn delete(&self, database: &str, form: &str, selector: &Selector) -> Result<usize> {
		self.get_database(database)?.delete(form, selector)
	}

	pub fn put_d(&self, key: &str, value: Value) -> Result<()> {
		self.put(DEFAULT_DATABASE, DEFAULT_FORM, key, value, PutMode::Insert)
	}

	pub fn set_d(&self, key: &str, value: Value) -> Result<()> {
		self.put(DEFAULT_DATABASE, DEFAULT_FORM, key, value, PutMode::Set)
	}

	pub fn get_d(&self, key: &str) -> Result<Value> {
		self.get(DEFAULT_DATABASE, DEFAULT_FORM, key)
	}

	pub fn insert_auto_d(&self, value: Value) -> Result<String> {
		self.insert_auto(DEFAULT_DATABASE, DEFAULT_FORM, value)
	}

	/// Builds a catalog snapshot with every level sorted by name (forms by
	/// key structure, for indexes), so appended snapshots are deterministic
	/// regardless of `HashMap` iteration order.
	fn persist_catalog(&self) -> Result<()> {
		let databases = self.databases.lock();
		let catalog = Catalog {
			databases: databases
				.values()
				.sorted_by(|a, b| a.name.cmp(&b.name))
				.map(|db| DatabaseMeta {
					id: db.id.clone(),
					name: db.name.clone(),
					comment: db.comment.clone(),
					forms: db
						.forms()
						.read()
						.values()
						.sorted_by(|a, b| a.name.cmp(&b.name))
						.map(|form| FormMeta {
							id: form.id.clone(),
							name: form.name.clone(),
							comment: form.comment.clone(),
							form_type: form.form_type,
							indexes: form
								.index_metas()
								.into_iter()
								.sorted_by(|a, b| a.2.cmp(&b.2))
								.map(|(id, primary, key_structure)| IndexMeta { id, primary, key_structure })
								.collect(),
						})
						.collect(),
				})
				.collect(),
		};
		catalog.append(self.options.catalog_path())
	}
}

/// Rebuilds every database/form/index from a catalog snapshot, replaying
/// each index's log in parallel (`rayon`'s parallel iterator; `collect` is
/// the join barrier — every worker finishes before recovery returns).
fn recover_from_catalog(options: &InternalOptions, catalog: Catalog) -> Result<HashMap<String, Arc<Database>>> {
	struct Job {
		db_pos: usize,
		form_pos: usize,
		meta: IndexMeta,
		log_path: ::std::path::PathBuf,
	}

	let mut jobs = Vec::new();
	for (db_pos, db) in catalog.databases.iter().enumerate() {
		for (form_pos, form) in db.forms.iter().enumerate() {
			for index_meta in &form.indexes {
				jobs.push(Job {
					db_pos,
					form_pos,
					meta: index_meta.clone(),
					log_path: options.index_log_path(&db.id, &form.id, &index_meta.id),
				});
			}
		}
	}

	let built: Vec<Result<(usize, usize, Index)>> = jobs
		.into_par_iter()
		.map(|job| {
			let mut index = Index::open(job.meta.id.clone(), job.meta.key_structure.clone(), job.meta.primary, &job.log_path)?;
			index.recover(&job.log_path)?;
			Ok((job.db_pos, job.form_pos, index))
		})
		.collect();

	let mut grouped: HashMap<(usize, usize), Vec<Index>> = HashMap::new();
	for result in built {
		let (db_pos, form_pos, index) = result?;
		grouped.entry((db_pos, form_pos)).or_insert_with(Vec::new).push(index);
	}

	let mut databases = HashMap::new();
	for (db_pos, db_meta) in catalog.databases.into_iter().enumerate() {
		let database = Database::new(db_meta.id.clone(), db_meta.name.clone(), db_meta.comment.clone());
		for (form_pos, form_meta) in db_meta.forms.into_iter().enumerate() {
			let form = Form::new(form_meta.id.clone(), form_meta.name.clone(), form_meta.form_type, form_meta.comment.clone());
			if let Some(indices) = grouped.remove(&(db_pos, form_pos)) {
				for index in indices {
					form.add_index(index)?;
				}
			}
			form.resync_auto_id();
			database.add_form(form)?;
		}
		databases.insert(db_meta.name.clone(), Arc::new(database));
	}

	Ok(databases)
}

#[cfg(test)]
mod tests {
	use super::Lily;
	use form::FormType;
	use node::PutMode;
	use options::Options;
	use value::Value;
	use tempdir::TempDir;

	fn start(dir: &TempDir) -> Lily {
		Lily::start(Options { data_dir: dir.path().to_path_buf() }).unwrap()
	}

	#[test]
	fn bootstraps_default_database_and_forms() {
		let dir = TempDir::new("lily-registry").unwrap();
		let lily = start(&dir);
		assert!(lily.get_databases().contains(&"lily".to_string()));
		lily.put_d("k1", Value::Str("v1".into())).unwrap();
		assert_eq!(lily.get_d("k1").unwrap(), Value::Str("v1".into()));
	}

	#[test]
	fn create_database_form_index_and_put_get() {
		let dir = TempDir::new("lily-registry").unwrap();
		let lily = start(&dir);

		lily.create_database("shop", "").unwrap();
		lily.create_form("shop", "orders", FormType::Doc, "").unwrap();
		lily.put("shop", "orders", "o1", Value::Int(100), PutMode::Insert).unwrap();
		assert_eq!(lily.get("shop", "orders", "o1").unwrap(), Value::Int(100));
	}

	#[test]
	fn restart_recovers_prior_writes() {
		let dir = TempDir::new("lily-registry").unwrap();
		{
			let lily = start(&dir);
			lily.create_database("shop", "").unwrap();
			lily.create_form("shop", "orders", FormType::Doc, "").unwrap();
			lily.put("shop", "orders", "o1", Value::Int(100), PutMode::Insert).unwrap();
			lily.stop().unwrap();
		}

		let lily = Lily::start(Options { data_dir: dir.path().to_path_buf() }).unwrap();
		assert_eq!(lily.get("shop", "orders", "o1").unwrap(), Value::Int(100));
	}

	#[test]
	fn unknown_database_is_data_is_nil() {
		let dir = TempDir::new("lily-registry").unwrap();
		let lily = start(&dir);
		let err = lily.get("nope", "orders", "o1").unwrap_err();
		assert_eq!(err.kind(), &crate::error::ErrorKind::DataIsNil("nope".into()));
	}

	#[test]
	fn empty_key_is_rejected_regardless_of_mode() {
		let dir = TempDir::new("lily-registry").unwrap();
		let lily = start(&dir);
		assert!(matches!(
			lily.put_d("", Value::Int(1)).unwrap_err().kind(),
			&crate::error::ErrorKind::KeyIsNil
		));
		assert!(matches!(
			lily.set_d("", Value::Int(1)).unwrap_err().kind(),
			&crate::error::ErrorKind::KeyIsNil
		));
	}

	#[test]
	fn insert_auto_d_assigns_successive_keys() {
		let dir = TempDir::new("lily-registry").unwrap();
		let lily = start(&dir);
		let k1 = lily.insert_auto_d(Value::Int(1)).unwrap();
		let k2 = lily.insert_auto_d(Value::Int(2)).unwrap();
		assert_eq!(lily.get_d(&k1).unwrap(), Value::Int(1));
		assert_eq!(lily.get_d(&k2).unwrap(), Value::Int(2));
	}

	#[test]
	fn starting_twice_on_the_same_data_dir_is_catalog_corrupt() {
		let dir = TempDir::new("lily-registry").unwrap();
		let _first = start(&dir);
		assert!(matches!(
			Lily::start(Options { data_dir: dir.path().to_path_buf() }).unwrap_err().kind(),
			&crate::error::ErrorKind::CatalogCorrupt(_)
		));
	}
}
