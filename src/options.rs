use std::path::{Path, PathBuf};

use error::{ErrorKind, Result};

/// Registry-wide options.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
	/// Root directory under which the catalog file and every
	/// `{database_id}/{form_id}/{index_id}.log` lives.
	pub data_dir: PathBuf,
}

impl Default for Options {
	fn default() -> Self {
		Options {
			data_dir: PathBuf::from("./lily-data"),
		}
	}
}

/// Validated [`Options`], the only form the registry ever holds onto.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalOptions {
	pub data_dir: PathBuf,
}

impl InternalOptions {
	pub fn from_external(external: Options) -> Result<Self> {
		if external.data_dir.as_os_str().is_empty() {
			bail!(ErrorKind::InvalidOptions("data_dir", "must not be empty".into()));
		}

		Ok(InternalOptions {
			data_dir: external.data_dir,
		})
	}

	pub fn catalog_path(&self) -> PathBuf {
		self.data_dir.join("catalog.db")
	}

	pub fn form_dir(&self, database_id: &str, form_id: &str) -> PathBuf {
		self.data_dir.join(database_id).join(form_id)
	}

	pub fn index_log_path(&self, database_id: &str, form_id: &str, index_id: &str) -> PathBuf {
		self.form_dir(database_id, form_id).join(format!("{}.log", index_id))
	}
}

impl AsRef<Path> for InternalOptions {
	fn as_ref(&self) -> &Path {
		&self.data_dir
	}
}
