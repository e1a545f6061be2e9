//! Storage module for the shop order system.
//!
//! This module provides abstractions for persistent storage of order data,
//! supporting different backend implementations such as in-memory or
//! file-based storage. Backends only deal in bytes; [`StorageService`] adds
//! typed JSON access, compare-and-swap writes and a per-call timeout.
//!
//! Reads are simply abandoned when the timeout fires. Writes are not: the
//! backend receives a [`Deadline`] and either gives up before touching the
//! key or finishes the write, so a timed-out write never lands later.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shop_types::{ConfigSchema, ImplementationRegistry};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The backend did not answer within the configured time.
	#[error("Storage operation timed out after {0:?}")]
	Timeout(Duration),
}

/// Point in time after which a write must not start.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
	at: Instant,
	limit: Duration,
}

impl Deadline {
	/// A deadline `limit` from now.
	pub fn after(limit: Duration) -> Self {
		Self {
			at: Instant::now() + limit,
			limit,
		}
	}

	pub fn expired(&self) -> bool {
		Instant::now() >= self.at
	}

	pub fn remaining(&self) -> Duration {
		self.at.saturating_duration_since(Instant::now())
	}

	/// The error reported when the deadline passes first.
	pub fn timeout_error(&self) -> StorageError {
		StorageError::Timeout(self.limit)
	}

	/// Awaits `fut` until the deadline. `fut` must not have side effects
	/// that survive being dropped, e.g. acquiring a lock.
	pub async fn wait<F: Future>(&self, fut: F) -> Result<F::Output, StorageError> {
		tokio::time::timeout(self.remaining(), fut)
			.await
			.map_err(|_| self.timeout_error())
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// Write methods take an optional [`Deadline`]. A backend returns
/// [`StorageError::Timeout`] if it cannot start the write before the
/// deadline; once the write has started it runs to completion.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes unconditionally.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		deadline: Option<Deadline>,
	) -> Result<(), StorageError>;

	/// Replaces the value only if the current bytes equal `expected`.
	///
	/// `expected = None` means the key must not exist yet. Returns `Ok(false)`
	/// without writing when the precondition does not hold. The comparison and
	/// the write happen as one step with respect to other calls on the same key.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<Vec<u8>>,
		value: Vec<u8>,
		deadline: Option<Deadline>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str, deadline: Option<Deadline>) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A value read from storage together with the exact bytes it was decoded
/// from. The bytes are the token for a later compare-and-swap.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	raw: Vec<u8>,
}

/// High-level storage service that provides typed operations.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
	/// Upper bound for each backend call.
	timeout: Option<Duration>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			timeout: None,
		}
	}

	/// Bounds every backend call by `timeout`.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	fn deadline(&self) -> Option<Deadline> {
		self.timeout.map(Deadline::after)
	}

	/// Bounds a read. Only for calls that are safe to drop midway.
	async fn bounded<T, F>(&self, op: F) -> Result<T, StorageError>
	where
		F: Future<Output = Result<T, StorageError>>,
	{
		match self.timeout {
			Some(limit) => tokio::time::timeout(limit, op)
				.await
				.map_err(|_| StorageError::Timeout(limit))?,
			None => op.await,
		}
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Stores a serializable value, overwriting any previous one.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes = Self::encode(data)?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, self.deadline())
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		Ok(self.retrieve_versioned(namespace, id).await?.value)
	}

	/// Retrieves a value together with its raw bytes for a later
	/// [`compare_and_swap`](Self::compare_and_swap).
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let raw = self
			.bounded(self.backend.get_bytes(&Self::key(namespace, id)))
			.await?;
		let value =
			serde_json::from_slice(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok(Versioned { value, raw })
	}

	/// Retrieves a value, or `None` when the key does not exist.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<Versioned<T>>, StorageError> {
		match self.retrieve_versioned(namespace, id).await {
			Ok(found) => Ok(Some(found)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Writes `data` only if the stored bytes are still those of `current`
	/// (or, with `None`, only if nothing is stored yet).
	///
	/// Returns `Ok(false)` when another writer got there first.
	pub async fn compare_and_swap<T: Serialize, U>(
		&self,
		namespace: &str,
		id: &str,
		current: Option<&Versioned<U>>,
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes = Self::encode(data)?;
		let expected = current.map(|v| v.raw.clone());
		self.backend
			.compare_and_swap(&Self::key(namespace, id), expected, bytes, self.deadline())
			.await
	}

	/// Stores a value only if the key is still free.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		self.compare_and_swap::<T, T>(namespace, id, None, data)
			.await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend
			.delete(&Self::key(namespace, id), self.deadline())
			.await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.bounded(self.backend.exists(&Self::key(namespace, id)))
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;

	/// Backend that never answers, to exercise the timeout path.
	struct StalledStorage;

	/// Waits for a write slot that never frees up.
	async fn stall<T>(deadline: Option<Deadline>) -> Result<T, StorageError> {
		match deadline {
			Some(deadline) => deadline.wait(std::future::pending::<T>()).await,
			None => std::future::pending().await,
		}
	}

	#[async_trait]
	impl StorageInterface for StalledStorage {
		async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
			std::future::pending().await
		}

		async fn set_bytes(
			&self,
			_key: &str,
			_value: Vec<u8>,
			deadline: Option<Deadline>,
		) -> Result<(), StorageError> {
			stall(deadline).await
		}

		async fn compare_and_swap(
			&self,
			_key: &str,
			_expected: Option<Vec<u8>>,
			_value: Vec<u8>,
			deadline: Option<Deadline>,
		) -> Result<bool, StorageError> {
			stall(deadline).await
		}

		async fn delete(&self, _key: &str, deadline: Option<Deadline>) -> Result<(), StorageError> {
			stall(deadline).await
		}

		async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
			std::future::pending().await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			MemoryStorage::new().config_schema()
		}
	}

	#[tokio::test]
	async fn test_typed_round_trip_and_missing_key() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		service.store("orders", "a", &vec![1u32, 2, 3]).await.unwrap();

		let value: Vec<u32> = service.retrieve("orders", "a").await.unwrap();
		assert_eq!(value, vec![1, 2, 3]);

		let missing = service
			.retrieve_optional::<Vec<u32>>("orders", "b")
			.await
			.unwrap();
		assert!(missing.is_none());
	}

	#[tokio::test]
	async fn test_compare_and_swap_detects_stale_reads() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));
		assert!(service.insert_new("counters", "seq", &1u64).await.unwrap());
		assert!(!service.insert_new("counters", "seq", &1u64).await.unwrap());

		let first = service
			.retrieve_versioned::<u64>("counters", "seq")
			.await
			.unwrap();
		let second = first.clone();

		assert!(service
			.compare_and_swap("counters", "seq", Some(&first), &2u64)
			.await
			.unwrap());
		// The second reader still holds the bytes of value 1
		assert!(!service
			.compare_and_swap("counters", "seq", Some(&second), &3u64)
			.await
			.unwrap());

		let value: u64 = service.retrieve("counters", "seq").await.unwrap();
		assert_eq!(value, 2);
	}

	#[tokio::test]
	async fn test_timeout_fails_fast() {
		let service = StorageService::new(Box::new(StalledStorage))
			.with_timeout(Duration::from_millis(20));

		let result = service.retrieve::<u64>("counters", "seq").await;
		assert!(matches!(result, Err(StorageError::Timeout(_))));
	}

	#[tokio::test]
	async fn test_write_gives_up_at_deadline() {
		let service = StorageService::new(Box::new(StalledStorage))
			.with_timeout(Duration::from_millis(20));

		let result = service.insert_new("counters", "seq", &1u64).await;
		assert!(matches!(
			result,
			Err(StorageError::Timeout(limit)) if limit == Duration::from_millis(20)
		));
		let result = service.remove("counters", "seq").await;
		assert!(matches!(result, Err(StorageError::Timeout(_))));
	}

	#[test]
	fn test_deadline_expiry() {
		let deadline = Deadline::after(Duration::ZERO);
		assert!(deadline.expired());
		assert_eq!(deadline.remaining(), Duration::ZERO);

		let deadline = Deadline::after(Duration::from_secs(60));
		assert!(!deadline.expired());
		assert!(deadline.remaining() > Duration::from_secs(59));
	}
}
