//! Customer order endpoints.
//!
//! Thin adapters between HTTP requests and [`OrderEngine`] calls. Every
//! failure is logged at `warn` with the operation name before it is mapped
//! to an [`APIError`].

use super::lifecycle_error;
use shop_core::{ActivityEntry, LifecycleError, OrderEngine};
use shop_types::{
	APIError, Actor, CancelOrderRequest, CustomerOrder, PlaceOrderRequest,
	RespondToQuotationRequest, SetQuotationRequest, UpdateStatusRequest,
};
use tracing::warn;

/// Largest number of activity entries returned by one request.
pub const MAX_ACTIVITY_LIMIT: usize = 200;
/// Number of activity entries returned when the request names none.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 50;

fn rejected(operation: &'static str, actor: &Actor, err: LifecycleError) -> APIError {
	warn!(operation, actor = %actor, error = %err, "Order request failed");
	lifecycle_error(err)
}

pub async fn place_order(
	engine: &OrderEngine,
	actor: &Actor,
	request: PlaceOrderRequest,
) -> Result<CustomerOrder, APIError> {
	engine
		.place_order(actor, request)
		.await
		.map_err(|e| rejected("place_order", actor, e))
}

pub async fn get_order(
	engine: &OrderEngine,
	actor: &Actor,
	order_id: &str,
) -> Result<CustomerOrder, APIError> {
	engine
		.get_order(actor, order_id)
		.await
		.map_err(|e| rejected("get_order", actor, e))
}

pub async fn list_orders(
	engine: &OrderEngine,
	actor: &Actor,
) -> Result<Vec<CustomerOrder>, APIError> {
	engine
		.list_orders(actor)
		.await
		.map_err(|e| rejected("list_orders", actor, e))
}

pub async fn set_quotation(
	engine: &OrderEngine,
	actor: &Actor,
	order_id: &str,
	request: SetQuotationRequest,
) -> Result<CustomerOrder, APIError> {
	engine
		.set_quotation(actor, order_id, request)
		.await
		.map_err(|e| rejected("set_quotation", actor, e))
}

pub async fn respond_to_quotation(
	engine: &OrderEngine,
	actor: &Actor,
	order_id: &str,
	request: RespondToQuotationRequest,
) -> Result<CustomerOrder, APIError> {
	engine
		.respond_to_quotation(actor, order_id, request)
		.await
		.map_err(|e| rejected("respond_to_quotation", actor, e))
}

pub async fn update_status(
	engine: &OrderEngine,
	actor: &Actor,
	order_id: &str,
	request: UpdateStatusRequest,
) -> Result<CustomerOrder, APIError> {
	engine
		.update_status(actor, order_id, request)
		.await
		.map_err(|e| rejected("update_status", actor, e))
}

pub async fn cancel_order(
	engine: &OrderEngine,
	actor: &Actor,
	order_id: &str,
	request: CancelOrderRequest,
) -> Result<CustomerOrder, APIError> {
	engine
		.cancel(actor, order_id, request.expected_version)
		.await
		.map_err(|e| rejected("cancel", actor, e))
}

/// Returns recent lifecycle activity, newest first.
///
/// The limit defaults to [`DEFAULT_ACTIVITY_LIMIT`] and is capped at
/// [`MAX_ACTIVITY_LIMIT`].
pub async fn recent_activity(
	engine: &OrderEngine,
	actor: &Actor,
	limit: Option<usize>,
) -> Result<Vec<ActivityEntry>, APIError> {
	let limit = limit
		.unwrap_or(DEFAULT_ACTIVITY_LIMIT)
		.min(MAX_ACTIVITY_LIMIT);
	engine
		.recent_activity(actor, limit)
		.await
		.map_err(|e| rejected("recent_activity", actor, e))
}
