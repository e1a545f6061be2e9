//! Builder for constructing order engines.
//!
//! Resolves the configured storage implementations through their factories,
//! validates each backend's section, and wires the state machine, event bus
//! and activity feed together.

use crate::engine::{activity::ActivityFeed, event_bus::EventBus, OrderEngine};
use crate::state::OrderStateMachine;
use shop_config::Config;
use shop_storage::{StorageError, StorageFactory, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions the builder can choose from, keyed by implementation name.
pub struct EngineFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

impl EngineFactories<StorageFactory> {
	/// Every storage implementation compiled into this build.
	pub fn registered() -> Self {
		Self {
			storage_factories: shop_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

/// Builder for constructing an [`OrderEngine`].
pub struct EngineBuilder {
	config: Config,
}

impl EngineBuilder {
	/// Creates a new EngineBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine with the primary storage implementation from config.
	pub async fn build<SF>(self, factories: EngineFactories<SF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = self.config.storage.primary.clone();
		let section = self
			.config
			.storage
			.implementations
			.get(&primary)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' has no configuration section",
					primary
				))
			})?;
		let factory = factories.storage_factories.get(&primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		let backend = match factory(section) {
			Ok(backend) => backend,
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)));
			},
		};
		backend.config_schema().validate(section).map_err(|e| {
			BuilderError::Config(format!("Invalid storage.implementations.{}: {}", primary, e))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		Ok(self.build_with_backend(backend))
	}

	/// Builds the engine on an already constructed storage backend.
	///
	/// Must run inside a Tokio runtime, which hosts the activity feed task.
	pub fn build_with_backend(self, backend: Box<dyn StorageInterface>) -> OrderEngine {
		let timeout = Duration::from_millis(self.config.storage.operation_timeout_ms);
		let storage = Arc::new(StorageService::new(backend).with_timeout(timeout));

		let lifecycle = &self.config.lifecycle;
		let state = OrderStateMachine::new(storage, lifecycle.max_transition_retries);
		let event_bus = EventBus::new(lifecycle.event_channel_capacity);
		let activity = Arc::new(ActivityFeed::new(lifecycle.activity_capacity));
		activity.spawn(event_bus.subscribe());

		OrderEngine::new(self.config, state, event_bus, activity)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn config_with_storage(storage: &str) -> Config {
		format!(
			r#"
[shop]
id = "builder-test"

{}

[[branches]]
id = 1
name = "Main Warehouse"
code = "MW"
"#,
			storage
		)
		.parse()
		.unwrap()
	}

	#[tokio::test]
	async fn test_build_with_file_storage() {
		let temp_dir = TempDir::new().unwrap();
		let config = config_with_storage(&format!(
			"[storage]\nprimary = \"file\"\n[storage.implementations.file]\nstorage_path = \"{}\"",
			temp_dir.path().display()
		));

		let engine = EngineBuilder::new(config)
			.build(EngineFactories::registered())
			.await
			.unwrap();
		assert_eq!(engine.branches().len(), 1);
	}

	#[tokio::test]
	async fn test_invalid_backend_section_is_rejected() {
		let config = config_with_storage(
			"[storage]\nprimary = \"memory\"\n[storage.implementations.memory]\npath = \"x\"",
		);

		let result = EngineBuilder::new(config)
			.build(EngineFactories::registered())
			.await;
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[tokio::test]
	async fn test_unregistered_backend_is_missing() {
		let config = config_with_storage(
			"[storage]\nprimary = \"redis\"\n[storage.implementations.redis]\nurl = \"x\"",
		);
		let factories = EngineFactories::<StorageFactory> {
			storage_factories: HashMap::new(),
		};

		let result = EngineBuilder::new(config).build(factories).await;
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
