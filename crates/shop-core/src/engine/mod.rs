//! Order lifecycle engine.
//!
//! [`OrderEngine`] is the entry point for every operation on customer orders.
//! Each call checks the role policy, lets the state machine apply the change
//! atomically, and only then publishes an event describing the committed
//! transition.

pub mod activity;
pub mod event_bus;

use crate::policy::{self, Action};
use crate::state::{
	is_valid_quotation_transition, is_valid_status_transition, LifecycleError, OrderStateMachine,
};
use activity::{ActivityEntry, ActivityFeed};
use chrono::Utc;
use event_bus::EventBus;
use rust_decimal::Decimal;
use shop_config::Config;
use shop_types::{
	truncate_id, Actor, Branch, CustomerInfo, CustomerOrder, OrderEvent, OrderStatus,
	PlaceOrderRequest, QuotationAction, QuotationEvent, QuotationItem, QuotationItemInput,
	QuotationStatus, RespondToQuotationRequest, SetQuotationRequest, ShopEvent,
	UpdateStatusRequest,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Main engine for the customer order lifecycle.
pub struct OrderEngine {
	/// Service configuration.
	config: Config,
	/// Applies transitions to stored orders.
	state: OrderStateMachine,
	/// Receives an event for every committed transition.
	event_bus: EventBus,
	/// Recent activity, fed from the event bus.
	activity: Arc<ActivityFeed>,
}

impl OrderEngine {
	pub fn new(
		config: Config,
		state: OrderStateMachine,
		event_bus: EventBus,
		activity: Arc<ActivityFeed>,
	) -> Self {
		Self {
			config,
			state,
			event_bus,
			activity,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Branches that currently accept orders.
	pub fn branches(&self) -> Vec<Branch> {
		self.config
			.branches
			.iter()
			.filter(|b| b.is_active)
			.cloned()
			.collect()
	}

	fn publish(&self, event: ShopEvent) {
		// No subscribers is fine
		self.event_bus.publish(event).ok();
	}

	/// Places a new order on behalf of the acting customer.
	#[instrument(skip_all, fields(actor = %actor, branch_id = request.branch_id))]
	pub async fn place_order(
		&self,
		actor: &Actor,
		request: PlaceOrderRequest,
	) -> Result<CustomerOrder, LifecycleError> {
		policy::authorize(actor, Action::PlaceOrder)?;
		validate_placement(&request)?;

		let branch = self
			.config
			.branches
			.iter()
			.find(|b| b.id == request.branch_id)
			.ok_or_else(|| {
				LifecycleError::Validation(format!("unknown branch {}", request.branch_id))
			})?;
		if !branch.is_active {
			return Err(LifecycleError::Validation(format!(
				"branch {} is not accepting orders",
				branch.name
			)));
		}

		let order_number = self.state.next_order_number().await?;
		let now = Utc::now();
		let order = CustomerOrder {
			id: uuid::Uuid::new_v4().to_string(),
			order_number,
			customer: CustomerInfo {
				customer_id: actor.user_id.clone(),
				name: request.customer_name.trim().to_string(),
				phone: request.customer_phone.trim().to_string(),
				email: request.customer_email,
				address: request.customer_address,
			},
			vehicle_info: request.vehicle_info,
			services: request.services,
			notes: request.notes,
			branch_id: branch.id,
			branch_name: branch.name.clone(),
			status: OrderStatus::Pending,
			quotation_status: QuotationStatus::PendingQuotation,
			quotation_items: Vec::new(),
			quotation_total: Decimal::ZERO,
			quotation_notes: None,
			customer_response_notes: None,
			quoted_at: None,
			responded_at: None,
			created_at: now,
			updated_at: now,
			version: 1,
		};

		self.state.create_order(&order).await?;

		info!(
			order_id = %truncate_id(&order.id),
			order_number = %order.order_number,
			"Order placed"
		);
		self.publish(ShopEvent::Order(OrderEvent::Placed {
			order_id: order.id.clone(),
			order_number: order.order_number.clone(),
			customer_id: order.customer.customer_id.clone(),
			branch_id: order.branch_id,
			at: now,
		}));

		Ok(order)
	}

	/// Fetches one order the actor is allowed to see.
	#[instrument(skip_all, fields(actor = %actor, order_id = %truncate_id(order_id)))]
	pub async fn get_order(
		&self,
		actor: &Actor,
		order_id: &str,
	) -> Result<CustomerOrder, LifecycleError> {
		let scope = policy::authorize(actor, Action::ViewOrder)?;
		let order = self.state.get_order(order_id).await?;
		policy::check_scope(scope, actor, &order)?;
		Ok(order)
	}

	/// Lists the orders visible to the actor, newest first.
	#[instrument(skip_all, fields(actor = %actor))]
	pub async fn list_orders(&self, actor: &Actor) -> Result<Vec<CustomerOrder>, LifecycleError> {
		let scope = policy::authorize(actor, Action::ListOrders)?;
		let orders = self.state.list_orders().await?;
		Ok(orders
			.into_iter()
			.filter(|order| policy::covers(scope, actor, order))
			.collect())
	}

	/// Attaches a quotation to an order waiting for one.
	#[instrument(skip_all, fields(actor = %actor, order_id = %truncate_id(order_id)))]
	pub async fn set_quotation(
		&self,
		actor: &Actor,
		order_id: &str,
		request: SetQuotationRequest,
	) -> Result<CustomerOrder, LifecycleError> {
		let scope = policy::authorize(actor, Action::SubmitQuotation)?;
		let (items, total) = validate_quotation_items(&request.items)?;

		let transition = self
			.state
			.transition(order_id, request.expected_version, |order, now| {
				policy::check_scope(scope, actor, order)?;
				ensure_not_terminal(order)?;
				if !is_valid_quotation_transition(order.quotation_status, QuotationStatus::Quoted) {
					return Err(LifecycleError::InvalidState(format!(
						"order {} already has a {} quotation",
						order.order_number, order.quotation_status
					)));
				}

				order.quotation_items = items.clone();
				order.quotation_total = total;
				order.quotation_notes = request.notes.clone();
				order.quotation_status = QuotationStatus::Quoted;
				if order.quoted_at.is_none() {
					order.quoted_at = Some(now);
				}
				Ok(true)
			})
			.await?;

		let order = transition.order;
		info!(
			order_number = %order.order_number,
			total = %order.quotation_total,
			"Quotation submitted"
		);
		self.publish(ShopEvent::Quotation(QuotationEvent::Submitted {
			order_id: order.id.clone(),
			order_number: order.order_number.clone(),
			total: order.quotation_total,
			item_count: order.quotation_items.len(),
			actor_id: actor.user_id.clone(),
			at: order.updated_at,
		}));
		Ok(order)
	}

	/// Records the customer's answer to a quotation.
	#[instrument(skip_all, fields(actor = %actor, order_id = %truncate_id(order_id)))]
	pub async fn respond_to_quotation(
		&self,
		actor: &Actor,
		order_id: &str,
		request: RespondToQuotationRequest,
	) -> Result<CustomerOrder, LifecycleError> {
		let scope = policy::authorize(actor, Action::RespondToQuotation)?;
		let target = match request.action {
			QuotationAction::Accept => QuotationStatus::Accepted,
			QuotationAction::Reject => QuotationStatus::Rejected,
		};

		let transition = self
			.state
			.transition(order_id, request.expected_version, |order, now| {
				policy::check_scope(scope, actor, order)?;
				ensure_not_terminal(order)?;
				if !is_valid_quotation_transition(order.quotation_status, target) {
					return Err(LifecycleError::InvalidState(format!(
						"quotation for {} is {}, not quoted",
						order.order_number, order.quotation_status
					)));
				}

				order.quotation_status = target;
				order.customer_response_notes = request.notes.clone();
				if order.responded_at.is_none() {
					order.responded_at = Some(now);
				}
				Ok(true)
			})
			.await?;

		let order = transition.order;
		info!(
			order_number = %order.order_number,
			response = %order.quotation_status,
			"Quotation answered"
		);
		let event = match request.action {
			QuotationAction::Accept => QuotationEvent::Accepted {
				order_id: order.id.clone(),
				order_number: order.order_number.clone(),
				notes: order.customer_response_notes.clone(),
				actor_id: actor.user_id.clone(),
				at: order.updated_at,
			},
			QuotationAction::Reject => QuotationEvent::Rejected {
				order_id: order.id.clone(),
				order_number: order.order_number.clone(),
				reason: order.customer_response_notes.clone(),
				actor_id: actor.user_id.clone(),
				at: order.updated_at,
			},
		};
		self.publish(ShopEvent::Quotation(event));
		Ok(order)
	}

	/// Moves an order along the fulfillment path. `cancelled` is handled by
	/// [`cancel`](Self::cancel).
	#[instrument(skip_all, fields(actor = %actor, order_id = %truncate_id(order_id), to = %request.status))]
	pub async fn update_status(
		&self,
		actor: &Actor,
		order_id: &str,
		request: UpdateStatusRequest,
	) -> Result<CustomerOrder, LifecycleError> {
		if request.status == OrderStatus::Cancelled {
			return self
				.cancel(actor, order_id, request.expected_version)
				.await;
		}

		let scope = policy::authorize(actor, Action::AdvanceStatus)?;
		let target = request.status;
		let allow_skipping = self.config.lifecycle.allow_step_skipping;

		let transition = self
			.state
			.transition(order_id, request.expected_version, |order, _| {
				policy::check_scope(scope, actor, order)?;
				ensure_not_terminal(order)?;
				if order.quotation_status != QuotationStatus::Accepted {
					return Err(LifecycleError::InvalidState(format!(
						"order {} cannot move to {} while its quotation is {}",
						order.order_number, target, order.quotation_status
					)));
				}
				if order.status == target {
					// Repeating the current status is a no-op
					return Ok(false);
				}
				if !is_valid_status_transition(order.status, target, allow_skipping) {
					return Err(LifecycleError::InvalidState(format!(
						"order {} cannot move from {} to {}",
						order.order_number, order.status, target
					)));
				}

				order.status = target;
				Ok(true)
			})
			.await?;

		let order = transition.order;
		if transition.changed {
			info!(
				order_number = %order.order_number,
				from = %transition.previous.status,
				to = %order.status,
				"Order status changed"
			);
			self.publish(ShopEvent::Order(OrderEvent::StatusChanged {
				order_id: order.id.clone(),
				order_number: order.order_number.clone(),
				from: transition.previous.status,
				to: order.status,
				actor_id: actor.user_id.clone(),
				at: order.updated_at,
			}));
		}
		Ok(order)
	}

	/// Cancels an order that has not reached a terminal status.
	#[instrument(skip_all, fields(actor = %actor, order_id = %truncate_id(order_id)))]
	pub async fn cancel(
		&self,
		actor: &Actor,
		order_id: &str,
		expected_version: Option<u64>,
	) -> Result<CustomerOrder, LifecycleError> {
		let scope = policy::authorize(actor, Action::Cancel)?;

		let transition = self
			.state
			.transition(order_id, expected_version, |order, _| {
				policy::check_scope(scope, actor, order)?;
				ensure_not_terminal(order)?;
				order.status = OrderStatus::Cancelled;
				Ok(true)
			})
			.await?;

		let order = transition.order;
		info!(
			order_number = %order.order_number,
			from = %transition.previous.status,
			"Order cancelled"
		);
		self.publish(ShopEvent::Order(OrderEvent::Cancelled {
			order_id: order.id.clone(),
			order_number: order.order_number.clone(),
			from: transition.previous.status,
			quotation_status: order.quotation_status,
			actor_id: actor.user_id.clone(),
			at: order.updated_at,
		}));
		Ok(order)
	}

	/// Most recent activity entries, newest first.
	pub async fn recent_activity(
		&self,
		actor: &Actor,
		limit: usize,
	) -> Result<Vec<ActivityEntry>, LifecycleError> {
		policy::authorize(actor, Action::ViewActivity)?;
		Ok(self.activity.recent(limit).await)
	}
}

fn ensure_not_terminal(order: &CustomerOrder) -> Result<(), LifecycleError> {
	if order.is_terminal() {
		return Err(LifecycleError::InvalidState(format!(
			"order {} is {} and can no longer change",
			order.order_number, order.status
		)));
	}
	Ok(())
}

fn validate_placement(request: &PlaceOrderRequest) -> Result<(), LifecycleError> {
	if request.customer_name.trim().is_empty() {
		return Err(LifecycleError::Validation("customer name is required".into()));
	}
	if request.customer_phone.trim().is_empty() {
		return Err(LifecycleError::Validation("customer phone is required".into()));
	}
	if request.services.is_empty() {
		return Err(LifecycleError::Validation(
			"at least one service must be selected".into(),
		));
	}
	if let Some(position) = request
		.services
		.iter()
		.position(|s| s.service_type.trim().is_empty())
	{
		return Err(LifecycleError::Validation(format!(
			"service {} has no type",
			position + 1
		)));
	}
	Ok(())
}

/// Turns submitted lines into priced items and their total.
///
/// A line is kept with a non-blank name, a positive quantity and a positive
/// unit price; other lines are dropped. Fails when no line is left or when
/// the amounts do not fit a [`Decimal`].
fn validate_quotation_items(
	inputs: &[QuotationItemInput],
) -> Result<(Vec<QuotationItem>, Decimal), LifecycleError> {
	let out_of_range = || LifecycleError::Validation("quotation total out of range".into());
	let mut items = Vec::with_capacity(inputs.len());
	let mut dropped = 0usize;

	for input in inputs {
		let quantity = u32::try_from(input.quantity).ok().filter(|q| *q > 0);
		match quantity {
			Some(quantity) if !input.name.trim().is_empty() && input.unit_price > Decimal::ZERO => {
				let item = QuotationItem::new(
					input.name.trim(),
					input.description.clone(),
					quantity,
					input.unit_price,
				)
				.ok_or_else(out_of_range)?;
				items.push(item);
			},
			_ => dropped += 1,
		}
	}

	if items.is_empty() {
		return Err(LifecycleError::Validation(
			"at least one valid quotation item required".into(),
		));
	}
	if dropped > 0 {
		debug!(dropped, kept = items.len(), "dropped incomplete quotation lines");
	}

	let total = items
		.iter()
		.try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.total))
		.ok_or_else(out_of_range)?;
	Ok((items, total))
}
