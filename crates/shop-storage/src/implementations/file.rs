//! File-based storage backend.
//!
//! Every key is one file under `storage_path`. Writes go to a temporary file
//! that is renamed over the target, so readers never see a partial value.
//! Writers to the same key serialize on an advisory lock held on a sibling
//! `.lock` file, which also makes compare-and-swap safe across processes
//! sharing the directory.
//!
//! With a deadline, the lock is polled every `lock_retry_ms` and the write is
//! abandoned if the lock is still taken when the deadline passes. A write that
//! got the lock always completes.

use crate::{Deadline, StorageError, StorageFactory, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use shop_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_STORAGE_PATH: &str = "./data/orders";
const DEFAULT_LOCK_RETRY_MS: u64 = 5;

/// File storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Pause between attempts to take a contended key lock.
	lock_retry: Duration,
}

impl FileStorage {
	/// Creates a new FileStorage rooted at `base_path`.
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			lock_retry: Duration::from_millis(DEFAULT_LOCK_RETRY_MS),
		}
	}

	pub fn with_lock_retry(mut self, lock_retry: Duration) -> Self {
		self.lock_retry = lock_retry;
		self
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.json", safe_key))
	}

	/// Runs a write under the key's lock on the blocking pool.
	///
	/// The blocking task is awaited to the end, so the caller learns the
	/// outcome of every write that started.
	async fn locked<F, T>(
		&self,
		key: &str,
		deadline: Option<Deadline>,
		op: F,
	) -> Result<T, StorageError>
	where
		F: FnOnce(&Path) -> io::Result<T> + Send + 'static,
		T: Send + 'static,
	{
		let path = self.get_file_path(key);
		let lock_retry = self.lock_retry;
		let outcome =
			tokio::task::spawn_blocking(move || with_key_lock(&path, deadline, lock_retry, op))
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?
				.map_err(|e| StorageError::Backend(e.to_string()))?;

		match (outcome, deadline) {
			(Some(value), _) => Ok(value),
			(None, Some(deadline)) => {
				warn!(key, "key lock still held at deadline, write abandoned");
				Err(deadline.timeout_error())
			},
			(None, None) => Err(StorageError::Backend(format!("lock on {} not acquired", key))),
		}
	}
}

/// Holds an exclusive lock on `<path>.lock` while `op` runs.
///
/// Returns `Ok(None)` without running `op` when the lock could not be taken
/// before `deadline`.
fn with_key_lock<F, T>(
	path: &Path,
	deadline: Option<Deadline>,
	lock_retry: Duration,
	op: F,
) -> io::Result<Option<T>>
where
	F: FnOnce(&Path) -> io::Result<T>,
{
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let lock_file = OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(path.with_extension("lock"))?;
	if !acquire(&lock_file, deadline, lock_retry)? {
		return Ok(None);
	}

	let result = op(path);
	let unlocked = FileExt::unlock(&lock_file);
	let value = result?;
	unlocked?;
	Ok(Some(value))
}

/// Takes the exclusive lock, polling until `deadline` when one is given.
fn acquire(
	lock_file: &File,
	deadline: Option<Deadline>,
	lock_retry: Duration,
) -> io::Result<bool> {
	let Some(deadline) = deadline else {
		FileExt::lock_exclusive(lock_file)?;
		return Ok(true);
	};

	loop {
		match FileExt::try_lock_exclusive(lock_file) {
			Ok(()) => return Ok(true),
			Err(e) if is_contended(&e) => {},
			Err(e) => return Err(e),
		}
		if deadline.expired() {
			return Ok(false);
		}
		std::thread::sleep(lock_retry.min(deadline.remaining()));
	}
}

fn is_contended(e: &io::Error) -> bool {
	e.kind() == io::ErrorKind::WouldBlock
		|| e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
	match fs::read(path) {
		Ok(data) => Ok(Some(data)),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

/// Replaces the file contents through a temp file and rename.
fn write_atomic(path: &Path, value: &[u8]) -> io::Result<()> {
	let temp_path = path.with_extension("tmp");
	let mut temp = File::create(&temp_path)?;
	io::Write::write_all(&mut temp, value)?;
	temp.sync_all()?;
	fs::rename(&temp_path, path)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match tokio::fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		deadline: Option<Deadline>,
	) -> Result<(), StorageError> {
		self.locked(key, deadline, move |path| write_atomic(path, &value))
			.await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<Vec<u8>>,
		value: Vec<u8>,
		deadline: Option<Deadline>,
	) -> Result<bool, StorageError> {
		let swapped = self
			.locked(key, deadline, move |path| {
				if read_optional(path)? != expected {
					return Ok(false);
				}
				write_atomic(path, &value)?;
				Ok(true)
			})
			.await?;

		if !swapped {
			debug!(key, "compare-and-swap lost to a concurrent writer");
		}
		Ok(swapped)
	}

	async fn delete(&self, key: &str, deadline: Option<Deadline>) -> Result<(), StorageError> {
		self.locked(key, deadline, |path| match fs::remove_file(path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e),
		})
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		tokio::fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String),
				Field::new(
					"lock_retry_ms",
					FieldType::Integer {
						min: Some(1),
						max: Some(1000),
					},
				),
			],
		);
		schema.validate(config)?;

		if let Some(path) = config.get("storage_path").and_then(|v| v.as_str()) {
			if path.trim().is_empty() {
				return Err(ValidationError::InvalidValue {
					field: "storage_path".to_string(),
					message: "Path cannot be empty".to_string(),
				});
			}
		}
		Ok(())
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Directory for the order files (default: "./data/orders")
/// - `lock_retry_ms`: Pause between attempts on a busy key lock (default: 5)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);
	let lock_retry_ms = config
		.get("lock_retry_ms")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
		.unwrap_or(DEFAULT_LOCK_RETRY_MS);

	Ok(Box::new(
		FileStorage::new(PathBuf::from(storage_path))
			.with_lock_retry(Duration::from_millis(lock_retry_ms)),
	))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
