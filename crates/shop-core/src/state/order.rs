//! Order state machine implementation.
//!
//! Every change to a stored order goes through [`OrderStateMachine::transition`]:
//! read the record, evaluate the guards against it, and commit the result with
//! a compare-and-swap on the exact bytes that were read. A writer that loses
//! the swap re-reads the winner's record and evaluates its guards again, so it
//! either still applies cleanly or fails on the new state.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use shop_storage::{StorageError, StorageService};
use shop_types::{
	format_order_number, truncate_id, CustomerOrder, OrderStatus, QuotationStatus, StorageKey,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Counter id under [`StorageKey::Counters`] for order numbers.
const ORDER_NUMBER_COUNTER: &str = "order_number";
/// Index id under [`StorageKey::OrderIndex`] listing every order.
const ORDER_INDEX: &str = "all";
/// Bound for counter and index updates. Every lost swap means another writer
/// made progress.
const SEQUENCE_RETRY_LIMIT: u32 = 128;

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	/// Malformed input, e.g. a quotation without valid items.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The transition is not legal from the order's current state.
	#[error("Invalid state: {0}")]
	InvalidState(String),
	/// The actor lacks the role or ownership.
	#[error("Authorization error: {0}")]
	Authorization(String),
	#[error("Order not found: {0}")]
	NotFound(String),
	/// Lost a race against a concurrent transition.
	#[error("Conflict: {0}")]
	Conflict(String),
	/// The backing store failed or timed out. Safe to retry.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl LifecycleError {
	/// Whether the caller may retry the same request unchanged.
	pub fn is_retryable(&self) -> bool {
		matches!(self, LifecycleError::Conflict(_) | LifecycleError::Storage(_))
	}
}

fn storage_error(e: StorageError) -> LifecycleError {
	LifecycleError::Storage(e.to_string())
}

/// Fulfillment transitions: forward along the path, or to `Cancelled` from any
/// non-terminal status.
static STATUS_TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let path = OrderStatus::FULFILLMENT_PATH;
	let mut m = HashMap::new();
	for (rank, status) in path.iter().enumerate() {
		let mut next: HashSet<OrderStatus> = path[rank + 1..].iter().copied().collect();
		if !status.is_terminal() {
			next.insert(OrderStatus::Cancelled);
		}
		m.insert(*status, next);
	}
	m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
	m
});

/// Quotation transitions. Re-quoting is not supported.
static QUOTATION_TRANSITIONS: Lazy<HashMap<QuotationStatus, HashSet<QuotationStatus>>> =
	Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			QuotationStatus::PendingQuotation,
			HashSet::from([QuotationStatus::Quoted]),
		);
		m.insert(
			QuotationStatus::Quoted,
			HashSet::from([QuotationStatus::Accepted, QuotationStatus::Rejected]),
		);
		m.insert(QuotationStatus::Accepted, HashSet::new());
		m.insert(QuotationStatus::Rejected, HashSet::new());
		m
	});

/// Checks a fulfillment transition. With `allow_skipping = false` only the
/// immediate next step (or cancellation) is accepted.
pub fn is_valid_status_transition(
	from: OrderStatus,
	to: OrderStatus,
	allow_skipping: bool,
) -> bool {
	let listed = STATUS_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to));
	if !listed {
		return false;
	}
	allow_skipping || to == OrderStatus::Cancelled || from.next() == Some(to)
}

pub fn is_valid_quotation_transition(from: QuotationStatus, to: QuotationStatus) -> bool {
	QUOTATION_TRANSITIONS
		.get(&from)
		.is_some_and(|set| set.contains(&to))
}

/// Outcome of a committed (or skipped) transition.
#[derive(Debug, Clone)]
pub struct Transition {
	/// The record the guards were evaluated against.
	pub previous: CustomerOrder,
	/// The record as stored after the call.
	pub order: CustomerOrder,
	/// False when the guards decided nothing needed to change.
	pub changed: bool,
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	max_retries: u32,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, max_retries: u32) -> Self {
		Self {
			storage,
			max_retries: max_retries.max(1),
		}
	}

	/// Allocates the next `CO-NNNN` order number.
	pub async fn next_order_number(&self) -> Result<String, LifecycleError> {
		let namespace = StorageKey::Counters.as_str();
		for _ in 0..SEQUENCE_RETRY_LIMIT {
			let current = self
				.storage
				.retrieve_optional::<u64>(namespace, ORDER_NUMBER_COUNTER)
				.await
				.map_err(storage_error)?;
			let next = current.as_ref().map_or(1, |c| c.value + 1);

			if self
				.storage
				.compare_and_swap(namespace, ORDER_NUMBER_COUNTER, current.as_ref(), &next)
				.await
				.map_err(storage_error)?
			{
				return Ok(format_order_number(next));
			}
		}
		Err(LifecycleError::Conflict(
			"order number counter is contended, retry".into(),
		))
	}

	/// Stores a freshly placed order.
	///
	/// The id is indexed first; until the record itself is written, readers
	/// skip the id, so a half-created order is never visible.
	pub async fn create_order(&self, order: &CustomerOrder) -> Result<(), LifecycleError> {
		self.append_to_index(&order.id).await?;

		let inserted = self
			.storage
			.insert_new(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(storage_error)?;
		if !inserted {
			return Err(LifecycleError::Conflict(format!(
				"order {} already exists",
				order.id
			)));
		}
		Ok(())
	}

	async fn append_to_index(&self, order_id: &str) -> Result<(), LifecycleError> {
		let namespace = StorageKey::OrderIndex.as_str();
		for _ in 0..SEQUENCE_RETRY_LIMIT {
			let current = self
				.storage
				.retrieve_optional::<Vec<String>>(namespace, ORDER_INDEX)
				.await
				.map_err(storage_error)?;
			let mut ids = current
				.as_ref()
				.map(|c| c.value.clone())
				.unwrap_or_default();
			ids.push(order_id.to_string());

			if self
				.storage
				.compare_and_swap(namespace, ORDER_INDEX, current.as_ref(), &ids)
				.await
				.map_err(storage_error)?
			{
				return Ok(());
			}
		}
		Err(LifecycleError::Conflict("order index is contended, retry".into()))
	}

	/// Gets an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<CustomerOrder, LifecycleError> {
		match self
			.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
		{
			Ok(order) => Ok(order),
			Err(StorageError::NotFound) => Err(LifecycleError::NotFound(order_id.to_string())),
			Err(e) => Err(storage_error(e)),
		}
	}

	/// All stored orders, newest first.
	pub async fn list_orders(&self) -> Result<Vec<CustomerOrder>, LifecycleError> {
		let ids = self
			.storage
			.retrieve_optional::<Vec<String>>(StorageKey::OrderIndex.as_str(), ORDER_INDEX)
			.await
			.map_err(storage_error)?
			.map(|index| index.value)
			.unwrap_or_default();

		let mut orders = Vec::with_capacity(ids.len());
		for id in ids.iter().rev() {
			if let Some(found) = self
				.storage
				.retrieve_optional::<CustomerOrder>(StorageKey::Orders.as_str(), id)
				.await
				.map_err(storage_error)?
			{
				orders.push(found.value);
			}
		}
		// Stable, so equal timestamps keep index order
		orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(orders)
	}

	/// Applies `apply` to the stored order and commits the result atomically.
	///
	/// `apply` gets a copy of the current record and the commit timestamp. It
	/// returns `Ok(false)` when nothing needs to change, in which case nothing
	/// is written. On a lost race it runs again against the fresh record, up to
	/// the configured number of attempts.
	pub async fn transition<F>(
		&self,
		order_id: &str,
		expected_version: Option<u64>,
		mut apply: F,
	) -> Result<Transition, LifecycleError>
	where
		F: FnMut(&mut CustomerOrder, DateTime<Utc>) -> Result<bool, LifecycleError>,
	{
		let namespace = StorageKey::Orders.as_str();

		for attempt in 1..=self.max_retries {
			let current = match self
				.storage
				.retrieve_versioned::<CustomerOrder>(namespace, order_id)
				.await
			{
				Ok(current) => current,
				Err(StorageError::NotFound) => {
					return Err(LifecycleError::NotFound(order_id.to_string()))
				},
				Err(e) => return Err(storage_error(e)),
			};

			if let Some(expected) = expected_version {
				if current.value.version != expected {
					return Err(LifecycleError::Conflict(format!(
						"order {} is at version {}, expected {}",
						current.value.order_number, current.value.version, expected
					)));
				}
			}

			let now = Utc::now();
			let mut order = current.value.clone();
			if !apply(&mut order, now)? {
				return Ok(Transition {
					previous: current.value.clone(),
					order: current.value,
					changed: false,
				});
			}
			order.version = current.value.version + 1;
			order.updated_at = now;

			if self
				.storage
				.compare_and_swap(namespace, order_id, Some(&current), &order)
				.await
				.map_err(storage_error)?
			{
				return Ok(Transition {
					previous: current.value,
					order,
					changed: true,
				});
			}

			debug!(
				order_id = %truncate_id(order_id),
				attempt,
				"Concurrent update detected, re-evaluating"
			);
		}

		Err(LifecycleError::Conflict(format!(
			"order {} kept changing concurrently, retry",
			order_id
		)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use shop_storage::implementations::memory::MemoryStorage;
	use shop_types::{CustomerInfo, ServiceRequest, VehicleInfo};

	fn machine() -> OrderStateMachine {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		OrderStateMachine::new(storage, 3)
	}

	fn sample_order(id: &str, number: &str) -> CustomerOrder {
		let now = Utc::now();
		CustomerOrder {
			id: id.to_string(),
			order_number: number.to_string(),
			customer: CustomerInfo {
				customer_id: "cust-1".to_string(),
				name: "Maria Santos".to_string(),
				phone: "0917 555 0101".to_string(),
				email: None,
				address: None,
			},
			vehicle_info: VehicleInfo::default(),
			services: vec![ServiceRequest {
				service_type: "seat_cover".to_string(),
				material: Some("leather".to_string()),
				design: None,
				pocket: None,
				others: None,
				description: None,
			}],
			notes: None,
			branch_id: 1,
			branch_name: "Main Warehouse".to_string(),
			status: OrderStatus::Pending,
			quotation_status: QuotationStatus::PendingQuotation,
			quotation_items: Vec::new(),
			quotation_total: Default::default(),
			quotation_notes: None,
			customer_response_notes: None,
			quoted_at: None,
			responded_at: None,
			created_at: now,
			updated_at: now,
			version: 1,
		}
	}

	#[test]
	fn test_status_transitions_only_move_forward() {
		use OrderStatus::*;

		assert!(is_valid_status_transition(Pending, Processing, false));
		assert!(is_valid_status_transition(Pending, Completed, true));
		assert!(!is_valid_status_transition(Pending, Completed, false));
		assert!(!is_valid_status_transition(InProgress, Processing, true));
		assert!(!is_valid_status_transition(Processing, Processing, true));
		assert!(is_valid_status_transition(ReadyForInstallation, Cancelled, false));

		for target in OrderStatus::FULFILLMENT_PATH.iter().chain([&Cancelled]) {
			assert!(!is_valid_status_transition(Delivered, *target, true));
			assert!(!is_valid_status_transition(Cancelled, *target, true));
		}
	}

	#[test]
	fn test_quotation_transitions() {
		use QuotationStatus::*;

		assert!(is_valid_quotation_transition(PendingQuotation, Quoted));
		assert!(is_valid_quotation_transition(Quoted, Accepted));
		assert!(is_valid_quotation_transition(Quoted, Rejected));
		assert!(!is_valid_quotation_transition(PendingQuotation, Accepted));
		assert!(!is_valid_quotation_transition(Rejected, Quoted));
		assert!(!is_valid_quotation_transition(Accepted, Rejected));
	}

	#[tokio::test]
	async fn test_order_numbers_are_sequential() {
		let machine = machine();
		assert_eq!(machine.next_order_number().await.unwrap(), "CO-0001");
		assert_eq!(machine.next_order_number().await.unwrap(), "CO-0002");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_order_numbers_are_unique() {
		let machine = Arc::new(machine());
		let mut handles = Vec::new();
		for _ in 0..20 {
			let machine = machine.clone();
			handles.push(tokio::spawn(
				async move { machine.next_order_number().await },
			));
		}

		let mut numbers = HashSet::new();
		for handle in handles {
			numbers.insert(handle.await.unwrap().unwrap());
		}
		assert_eq!(numbers.len(), 20);
		assert!(numbers.contains("CO-0020"));
	}

	#[tokio::test]
	async fn test_transition_commits_and_bumps_version() {
		let machine = machine();
		machine
			.create_order(&sample_order("o1", "CO-0001"))
			.await
			.unwrap();

		let result = machine
			.transition("o1", Some(1), |order, _| {
				order.notes = Some("rush".to_string());
				Ok(true)
			})
			.await
			.unwrap();
		assert!(result.changed);
		assert_eq!(result.previous.version, 1);
		assert_eq!(result.order.version, 2);

		let stored = machine.get_order("o1").await.unwrap();
		assert_eq!(stored.notes.as_deref(), Some("rush"));
		assert_eq!(stored.version, 2);
	}

	#[tokio::test]
	async fn test_transition_failures_leave_record_untouched() {
		let machine = machine();
		machine
			.create_order(&sample_order("o1", "CO-0001"))
			.await
			.unwrap();

		let stale = machine
			.transition("o1", Some(7), |_, _| Ok(true))
			.await;
		assert!(matches!(stale, Err(LifecycleError::Conflict(_))));

		let rejected = machine
			.transition("o1", None, |order, _| {
				order.status = OrderStatus::Delivered;
				Err(LifecycleError::InvalidState("nope".into()))
			})
			.await;
		assert!(matches!(rejected, Err(LifecycleError::InvalidState(_))));

		let noop = machine.transition("o1", None, |_, _| Ok(false)).await.unwrap();
		assert!(!noop.changed);

		let stored = machine.get_order("o1").await.unwrap();
		assert_eq!(stored.version, 1);
		assert_eq!(stored.status, OrderStatus::Pending);

		assert!(matches!(
			machine.transition("missing", None, |_, _| Ok(true)).await,
			Err(LifecycleError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_list_orders_newest_first() {
		let machine = machine();
		let mut first = sample_order("o1", "CO-0001");
		first.created_at = Utc::now() - chrono::Duration::minutes(5);
		machine.create_order(&first).await.unwrap();
		machine
			.create_order(&sample_order("o2", "CO-0002"))
			.await
			.unwrap();

		let orders = machine.list_orders().await.unwrap();
		let numbers: Vec<_> = orders.iter().map(|o| o.order_number.as_str()).collect();
		assert_eq!(numbers, vec!["CO-0002", "CO-0001"]);
	}
}
