//! Main entry point for the shop order service.
//!
//! Loads the configuration, builds the order engine on the configured
//! storage backend and serves the HTTP API until interrupted.

use clap::Parser;
use shop_config::Config;
use shop_core::{EngineBuilder, EngineFactories, OrderEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the shop service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/shop.toml", env = "SHOP_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started shop service");

	let config = load_config(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.shop.id);

	let engine = Arc::new(build_engine(config.clone()).await?);

	let api_config = config.api_or_default();
	if api_config.enabled {
		server::start_server(api_config, engine).await?;
	} else {
		tracing::warn!("API server disabled in configuration, nothing to serve");
	}

	tracing::info!("Stopped shop service");
	Ok(())
}

async fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
	let path = path
		.to_str()
		.ok_or_else(|| format!("Configuration path is not valid UTF-8: {}", path.display()))?;
	Ok(Config::from_file(path).await?)
}

/// Builds the order engine with every registered storage implementation.
async fn build_engine(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let engine = EngineBuilder::new(config)
		.build(EngineFactories::registered())
		.await?;
	Ok(engine)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_args_defaults() {
		let args = Args::try_parse_from(["shop"]).unwrap();
		assert_eq!(args.log_level, "info");

		let args = Args::try_parse_from(["shop", "-c", "conf/shop.toml", "-l", "debug"]).unwrap();
		assert_eq!(args.config, PathBuf::from("conf/shop.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[tokio::test]
	async fn test_engine_from_config_file() {
		let dir = TempDir::new().unwrap();
		let data_dir = dir.path().join("orders");
		let config_path = dir.path().join("shop.toml");
		std::fs::write(
			&config_path,
			format!(
				r#"
[shop]
id = "main-test"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"

[api]
enabled = false

[[branches]]
id = 1
name = "Main Warehouse"
code = "MW"
"#,
				data_dir.display()
			),
		)
		.unwrap();

		let config = load_config(&config_path).await.unwrap();
		assert!(!config.api_or_default().enabled);
		let engine = build_engine(config).await.unwrap();
		assert_eq!(engine.branches()[0].code, "MW");
	}

	#[tokio::test]
	async fn test_missing_config_file() {
		let dir = TempDir::new().unwrap();
		assert!(load_config(&dir.path().join("absent.toml")).await.is_err());
	}
}
