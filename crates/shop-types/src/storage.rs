//! Storage-related types for the shop system.

/// Storage keys for different data collections.
///
/// Namespaces every record the lifecycle persists, so storage calls never
/// spell out collection names by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing customer order records
	Orders,
	/// Key for the list of all order ids in placement order
	OrderIndex,
	/// Key for sequence counters such as order numbers
	Counters,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderIndex => "order_index",
			StorageKey::Counters => "counters",
		}
	}
}
