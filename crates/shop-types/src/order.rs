//! Customer order types for the shop system.
//!
//! A customer order moves along two orthogonal axes: the quotation axis
//! (`pending_quotation -> quoted -> accepted | rejected`) and the fulfillment
//! axis (`pending -> processing -> in_progress -> ready_for_installation ->
//! completed -> delivered`, with `cancelled` reachable from any non-terminal
//! status). The types here only describe the record; transition rules live in
//! the lifecycle crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Actor;

/// Fulfillment status of a customer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order placed, waiting for an accepted quotation.
	#[default]
	Pending,
	/// Accepted and queued for work.
	Processing,
	/// Work on the vehicle has started.
	InProgress,
	/// Upholstery finished, waiting for installation.
	ReadyForInstallation,
	/// Installation finished.
	Completed,
	/// Handed over to the customer. Terminal.
	Delivered,
	/// Cancelled by staff. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// The fulfillment path in order. `Cancelled` is not part of it.
	pub const FULFILLMENT_PATH: [OrderStatus; 6] = [
		OrderStatus::Pending,
		OrderStatus::Processing,
		OrderStatus::InProgress,
		OrderStatus::ReadyForInstallation,
		OrderStatus::Completed,
		OrderStatus::Delivered,
	];

	/// Position along the fulfillment path, `None` for `Cancelled`.
	pub fn rank(&self) -> Option<usize> {
		Self::FULFILLMENT_PATH.iter().position(|s| s == self)
	}

	/// The immediate next fulfillment step, if any.
	pub fn next(&self) -> Option<OrderStatus> {
		self.rank()
			.and_then(|r| Self::FULFILLMENT_PATH.get(r + 1))
			.copied()
	}

	/// Whether no further transition is possible.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Processing => "processing",
			OrderStatus::InProgress => "in_progress",
			OrderStatus::ReadyForInstallation => "ready_for_installation",
			OrderStatus::Completed => "completed",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(OrderStatus::Pending),
			"processing" => Ok(OrderStatus::Processing),
			"in_progress" => Ok(OrderStatus::InProgress),
			"ready_for_installation" => Ok(OrderStatus::ReadyForInstallation),
			"completed" => Ok(OrderStatus::Completed),
			"delivered" => Ok(OrderStatus::Delivered),
			"cancelled" => Ok(OrderStatus::Cancelled),
			other => Err(format!("Invalid order status: {}", other)),
		}
	}
}

/// Quotation status of a customer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
	/// Waiting for staff to prepare a quotation.
	#[default]
	PendingQuotation,
	/// Quotation sent, waiting for the customer.
	Quoted,
	/// Customer accepted the quotation.
	Accepted,
	/// Customer rejected the quotation.
	Rejected,
}

impl QuotationStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			QuotationStatus::PendingQuotation => "pending_quotation",
			QuotationStatus::Quoted => "quoted",
			QuotationStatus::Accepted => "accepted",
			QuotationStatus::Rejected => "rejected",
		}
	}
}

impl fmt::Display for QuotationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A priced line of a quotation.
///
/// `total` is always `quantity * unit_price`; it is computed on construction
/// and never taken from client input. Construction fails when the product
/// does not fit a [`Decimal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationItem {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub quantity: u32,
	pub unit_price: Decimal,
	pub total: Decimal,
}

impl QuotationItem {
	pub fn new(
		name: impl Into<String>,
		description: Option<String>,
		quantity: u32,
		unit_price: Decimal,
	) -> Option<Self> {
		let total = Decimal::from(quantity).checked_mul(unit_price)?;
		Some(Self {
			name: name.into(),
			description,
			quantity,
			unit_price,
			total,
		})
	}
}

/// A service requested by the customer when placing the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
	/// Kind of work, e.g. "seat_cover" or "door_panel".
	#[serde(rename = "type")]
	pub service_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub material: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub design: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pocket: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub others: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
}

/// Vehicle the work is done on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
	#[serde(default)]
	pub make: String,
	#[serde(default)]
	pub model: String,
	#[serde(default)]
	pub year: String,
	#[serde(default)]
	pub plate_number: String,
}

/// Contact details of the ordering customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
	/// Account id of the customer who owns the order.
	pub customer_id: String,
	pub name: String,
	pub phone: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
}

/// A customer order together with its quotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrder {
	/// Unique identifier for this order.
	pub id: String,
	/// Human facing order number, e.g. `CO-0007`.
	pub order_number: String,
	pub customer: CustomerInfo,
	pub vehicle_info: VehicleInfo,
	pub services: Vec<ServiceRequest>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub notes: Option<String>,
	pub branch_id: u64,
	pub branch_name: String,
	/// Fulfillment status.
	pub status: OrderStatus,
	pub quotation_status: QuotationStatus,
	#[serde(default)]
	pub quotation_items: Vec<QuotationItem>,
	/// Sum of the item totals.
	#[serde(default)]
	pub quotation_total: Decimal,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quotation_notes: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_response_notes: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quoted_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub responded_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Incremented on every committed change.
	pub version: u64,
}

impl CustomerOrder {
	/// Sum of `quantity * unit_price` over the quotation items, or `None`
	/// if it overflows.
	pub fn computed_quotation_total(&self) -> Option<Decimal> {
		self.quotation_items.iter().try_fold(Decimal::ZERO, |sum, item| {
			Decimal::from(item.quantity)
				.checked_mul(item.unit_price)
				.and_then(|line| sum.checked_add(line))
		})
	}

	/// Whether the stored total agrees with the items.
	pub fn quotation_total_is_consistent(&self) -> bool {
		self.computed_quotation_total() == Some(self.quotation_total)
	}

	/// Whether the actor is the customer who placed this order.
	pub fn is_owned_by(&self, actor: &Actor) -> bool {
		self.customer.customer_id == actor.user_id
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}
}
