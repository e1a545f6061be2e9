//! Branch directory types.

use serde::{Deserialize, Serialize};

/// An organizational location customer orders are routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
	pub id: u64,
	pub name: String,
	pub code: String,
	#[serde(default)]
	pub address: String,
	#[serde(default, alias = "is_warehouse")]
	pub is_warehouse: bool,
	#[serde(default = "default_active", alias = "is_active")]
	pub is_active: bool,
}

fn default_active() -> bool {
	true
}
