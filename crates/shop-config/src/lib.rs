//! Configuration module for the shop order service.
//!
//! Configuration is TOML. It can be split into several files with
//! `include = ["storage.toml", "branches.toml"]`; every top-level section must
//! then appear in exactly one file. `${VAR}` and `${VAR:-default}` are replaced
//! with environment values before parsing, and the result is validated.

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use shop_types::Branch;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub shop: ShopConfig,
	/// Storage backend selection.
	pub storage: StorageConfig,
	/// Order lifecycle tuning.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Branch directory orders can be routed to.
	#[serde(default)]
	pub branches: Vec<Branch>,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShopConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
	/// Display name of the business.
	#[serde(default)]
	pub name: Option<String>,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound for a single storage call. Calls exceeding it fail fast
	/// and can be retried.
	#[serde(default = "default_storage_timeout_ms")]
	pub operation_timeout_ms: u64,
}

fn default_storage_timeout_ms() -> u64 {
	5_000
}

/// Tuning of the order lifecycle engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	/// How often a transition that lost a concurrent write is re-evaluated
	/// before giving up with a conflict.
	#[serde(default = "default_max_transition_retries")]
	pub max_transition_retries: u32,
	/// Whether staff may jump several fulfillment steps at once.
	#[serde(default = "default_allow_step_skipping")]
	pub allow_step_skipping: bool,
	/// Number of entries kept by the activity feed.
	#[serde(default = "default_activity_capacity")]
	pub activity_capacity: usize,
	/// Buffer size of the event bus.
	#[serde(default = "default_event_channel_capacity")]
	pub event_channel_capacity: usize,
}

fn default_max_transition_retries() -> u32 {
	3
}

fn default_allow_step_skipping() -> bool {
	true
}

fn default_activity_capacity() -> usize {
	200
}

fn default_event_channel_capacity() -> usize {
	1024
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			max_transition_retries: default_max_transition_retries(),
			allow_step_skipping: default_allow_step_skipping(),
			activity_capacity: default_activity_capacity(),
			event_channel_capacity: default_event_channel_capacity(),
		}
	}
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default = "default_api_enabled")]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_enabled() -> bool {
	true
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	5000
}

fn default_api_timeout() -> u64 {
	30
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: default_api_enabled(),
			host: default_api_host(),
			port: default_api_port(),
			timeout_seconds: default_api_timeout(),
			cors: None,
		}
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(var_name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Returns the API configuration, falling back to defaults.
	pub fn api_or_default(&self) -> ApiConfig {
		self.api.clone().unwrap_or_default()
	}

	/// Validates cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.shop.id.trim().is_empty() {
			return Err(ConfigError::Validation("Shop ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' is not among the configured implementations",
				self.storage.primary
			)));
		}
		if self.storage.operation_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"storage.operation_timeout_ms must be greater than zero".into(),
			));
		}

		if self.lifecycle.max_transition_retries == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.max_transition_retries must be at least 1".into(),
			));
		}
		if self.lifecycle.activity_capacity == 0 || self.lifecycle.event_channel_capacity == 0 {
			return Err(ConfigError::Validation(
				"lifecycle capacities must be greater than zero".into(),
			));
		}

		self.validate_branches()
	}

	/// Every branch needs a unique id and code, and at least one must accept orders.
	fn validate_branches(&self) -> Result<(), ConfigError> {
		if self.branches.is_empty() {
			return Err(ConfigError::Validation(
				"At least one branch must be configured".into(),
			));
		}

		let mut ids = HashSet::new();
		let mut codes = HashSet::new();
		for branch in &self.branches {
			if branch.name.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Branch {} has an empty name",
					branch.id
				)));
			}
			if !ids.insert(branch.id) {
				return Err(ConfigError::Validation(format!(
					"Duplicate branch id {}",
					branch.id
				)));
			}
			if !codes.insert(branch.code.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate branch code '{}'",
					branch.code
				)));
			}
		}

		if !self.branches.iter().any(|b| b.is_active) {
			return Err(ConfigError::Validation(
				"At least one branch must be active".into(),
			));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
pub(crate) const TEST_CONFIG: &str = r#"
[shop]
id = "seatmakers-main"

[storage]
primary = "memory"
[storage.implementations.memory]

[[branches]]
id = 1
name = "Main Warehouse"
code = "MW"
is_warehouse = true

[[branches]]
id = 2
name = "Branch A"
code = "BA"
"#;
