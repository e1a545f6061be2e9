//! Event types for observing order lifecycle changes.
//!
//! Events are published on the event bus only after a transition has been
//! committed, so consumers (activity feed, dashboards, customer order lists)
//! never observe an intermediate state.

use crate::{OrderStatus, QuotationStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all shop events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShopEvent {
	/// Events on the fulfillment axis.
	Order(OrderEvent),
	/// Events on the quotation axis.
	Quotation(QuotationEvent),
}

impl ShopEvent {
	/// Id of the order the event belongs to.
	pub fn order_id(&self) -> &str {
		match self {
			ShopEvent::Order(OrderEvent::Placed { order_id, .. })
			| ShopEvent::Order(OrderEvent::StatusChanged { order_id, .. })
			| ShopEvent::Order(OrderEvent::Cancelled { order_id, .. })
			| ShopEvent::Quotation(QuotationEvent::Submitted { order_id, .. })
			| ShopEvent::Quotation(QuotationEvent::Accepted { order_id, .. })
			| ShopEvent::Quotation(QuotationEvent::Rejected { order_id, .. }) => order_id,
		}
	}
}

/// Events related to order placement and fulfillment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A customer placed a new order.
	Placed {
		order_id: String,
		order_number: String,
		customer_id: String,
		branch_id: u64,
		at: DateTime<Utc>,
	},
	/// Staff moved the order forward along the fulfillment path.
	StatusChanged {
		order_id: String,
		order_number: String,
		from: OrderStatus,
		to: OrderStatus,
		actor_id: String,
		at: DateTime<Utc>,
	},
	/// Staff cancelled the order.
	Cancelled {
		order_id: String,
		order_number: String,
		from: OrderStatus,
		quotation_status: QuotationStatus,
		actor_id: String,
		at: DateTime<Utc>,
	},
}

/// Events related to the quotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuotationEvent {
	/// Staff attached a quotation to the order.
	Submitted {
		order_id: String,
		order_number: String,
		total: Decimal,
		item_count: usize,
		actor_id: String,
		at: DateTime<Utc>,
	},
	/// The customer accepted the quotation.
	Accepted {
		order_id: String,
		order_number: String,
		notes: Option<String>,
		actor_id: String,
		at: DateTime<Utc>,
	},
	/// The customer rejected the quotation.
	Rejected {
		order_id: String,
		order_number: String,
		reason: Option<String>,
		actor_id: String,
		at: DateTime<Utc>,
	},
}
