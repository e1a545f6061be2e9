//! Recent-activity feed for dashboards.
//!
//! A background task subscribes to the event bus and keeps a bounded list of
//! human-readable entries, newest last.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_types::{OrderEvent, QuotationEvent, ShopEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

/// One line of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
	pub order_id: String,
	pub order_number: String,
	pub description: String,
	/// User who triggered the change.
	pub actor_id: String,
	pub at: DateTime<Utc>,
}

impl ActivityEntry {
	pub fn from_event(event: &ShopEvent) -> Self {
		let (order_number, description, actor_id, at) = match event {
			ShopEvent::Order(OrderEvent::Placed {
				order_number,
				customer_id,
				branch_id,
				at,
				..
			}) => (
				order_number,
				format!("Placed order {} at branch {}", order_number, branch_id),
				customer_id,
				at,
			),
			ShopEvent::Order(OrderEvent::StatusChanged {
				order_number,
				from,
				to,
				actor_id,
				at,
				..
			}) => (
				order_number,
				format!("Moved order {} from {} to {}", order_number, from, to),
				actor_id,
				at,
			),
			ShopEvent::Order(OrderEvent::Cancelled {
				order_number,
				from,
				actor_id,
				at,
				..
			}) => (
				order_number,
				format!("Cancelled order {} (was {})", order_number, from),
				actor_id,
				at,
			),
			ShopEvent::Quotation(QuotationEvent::Submitted {
				order_number,
				total,
				item_count,
				actor_id,
				at,
				..
			}) => (
				order_number,
				format!(
					"Quoted order {}: {} item(s), total {}",
					order_number, item_count, total
				),
				actor_id,
				at,
			),
			ShopEvent::Quotation(QuotationEvent::Accepted {
				order_number,
				actor_id,
				at,
				..
			}) => (
				order_number,
				format!("Customer accepted quotation for {}", order_number),
				actor_id,
				at,
			),
			ShopEvent::Quotation(QuotationEvent::Rejected {
				order_number,
				actor_id,
				at,
				..
			}) => (
				order_number,
				format!("Customer rejected quotation for {}", order_number),
				actor_id,
				at,
			),
		};

		Self {
			order_id: event.order_id().to_string(),
			order_number: order_number.clone(),
			description,
			actor_id: actor_id.clone(),
			at: *at,
		}
	}
}

/// Bounded in-memory activity log fed from the event bus.
pub struct ActivityFeed {
	entries: RwLock<VecDeque<ActivityEntry>>,
	capacity: usize,
}

impl ActivityFeed {
	pub fn new(capacity: usize) -> Self {
		Self {
			entries: RwLock::new(VecDeque::with_capacity(capacity)),
			capacity: capacity.max(1),
		}
	}

	/// Starts a task that records every event received on `receiver`.
	///
	/// The task ends when the bus is dropped.
	pub fn spawn(
		self: &Arc<Self>,
		mut receiver: broadcast::Receiver<ShopEvent>,
	) -> JoinHandle<()> {
		let feed = self.clone();
		tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(event) => feed.record(&event).await,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!(skipped, "Activity feed lagged behind the event bus");
					},
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}

	pub async fn record(&self, event: &ShopEvent) {
		let mut entries = self.entries.write().await;
		if entries.len() == self.capacity {
			entries.pop_front();
		}
		entries.push_back(ActivityEntry::from_event(event));
	}

	/// Up to `limit` entries, newest first.
	pub async fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
		let entries = self.entries.read().await;
		entries.iter().rev().take(limit).cloned().collect()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}
}
