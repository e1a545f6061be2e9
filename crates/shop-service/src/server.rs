//! HTTP server for the shop API.
//!
//! All routes live under `/api`. Order routes require the caller identity
//! headers checked by [`CurrentActor`]; health and the branch directory do
//! not.

use crate::apis::{self, actor::CurrentActor};
use axum::{
	body::Bytes,
	extract::{
		rejection::{JsonRejection, QueryRejection},
		Path, Query, State,
	},
	http::{HeaderValue, Method, StatusCode},
	response::Json,
	routing::{get, post, put},
	Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use shop_config::ApiConfig;
use shop_core::{ActivityEntry, OrderEngine};
use shop_types::{
	APIError, ApiResponse, Branch, CancelOrderRequest, CustomerOrder, PlaceOrderRequest,
	RespondToQuotationRequest, SetQuotationRequest, UpdateStatusRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Engine executing every lifecycle operation.
	pub engine: Arc<OrderEngine>,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, APIError>;

/// Builds the API router with its middleware stack.
pub fn router(engine: Arc<OrderEngine>, api_config: &ApiConfig) -> Router {
	let orders = Router::new()
		.route(
			"/customer-orders",
			post(handle_place_order).get(handle_list_orders),
		)
		.route("/customer-orders/{id}", get(handle_get_order))
		.route("/customer-orders/{id}/quotation", put(handle_set_quotation))
		.route(
			"/customer-orders/{id}/quotation/respond",
			post(handle_respond_to_quotation),
		)
		.route("/customer-orders/{id}/status", put(handle_update_status))
		.route("/customer-orders/{id}/cancel", post(handle_cancel_order))
		.route("/activity", get(handle_recent_activity))
		.route("/branches", get(handle_branches))
		.route("/health", get(handle_health));

	Router::new()
		.nest("/api", orders)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(cors_layer(api_config)),
		)
		.with_state(AppState { engine })
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse::<HeaderValue>() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods([Method::GET, Method::POST, Method::PUT])
		.allow_headers(Any)
}

/// Starts the HTTP server and serves until Ctrl-C.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Shop API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown signal received");
}

fn bad_request(message: String) -> APIError {
	tracing::warn!(error = %message, "Malformed request");
	APIError::BadRequest {
		error_type: "INVALID_REQUEST".to_string(),
		message,
	}
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, APIError> {
	body.map(|Json(value)| value)
		.map_err(|rejection| bad_request(rejection.body_text()))
}

/// Parses a body that may be omitted entirely.
fn optional_json_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, APIError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(T::default());
	}
	serde_json::from_slice(body).map_err(|e| bad_request(format!("Invalid JSON body: {}", e)))
}

/// Handles POST /api/customer-orders requests.
async fn handle_place_order(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	body: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerOrder>>), APIError> {
	let request = json_body(body)?;
	let order = apis::order::place_order(&state.engine, &actor, request).await?;
	Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

/// Handles GET /api/customer-orders requests.
async fn handle_list_orders(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
) -> ApiResult<Vec<CustomerOrder>> {
	let orders = apis::order::list_orders(&state.engine, &actor).await?;
	Ok(Json(ApiResponse::success(orders)))
}

/// Handles GET /api/customer-orders/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
) -> ApiResult<CustomerOrder> {
	let order = apis::order::get_order(&state.engine, &actor, &id).await?;
	Ok(Json(ApiResponse::success(order)))
}

/// Handles PUT /api/customer-orders/{id}/quotation requests.
async fn handle_set_quotation(
	Path(id): Path<String>,
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	body: Result<Json<SetQuotationRequest>, JsonRejection>,
) -> ApiResult<CustomerOrder> {
	let request = json_body(body)?;
	let order = apis::order::set_quotation(&state.engine, &actor, &id, request).await?;
	Ok(Json(ApiResponse::success(order)))
}

/// Handles POST /api/customer-orders/{id}/quotation/respond requests.
async fn handle_respond_to_quotation(
	Path(id): Path<String>,
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	body: Result<Json<RespondToQuotationRequest>, JsonRejection>,
) -> ApiResult<CustomerOrder> {
	let request = json_body(body)?;
	let order = apis::order::respond_to_quotation(&state.engine, &actor, &id, request).await?;
	Ok(Json(ApiResponse::success(order)))
}

/// Handles PUT /api/customer-orders/{id}/status requests.
async fn handle_update_status(
	Path(id): Path<String>,
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<CustomerOrder> {
	let request = json_body(body)?;
	let order = apis::order::update_status(&state.engine, &actor, &id, request).await?;
	Ok(Json(ApiResponse::success(order)))
}

/// Handles POST /api/customer-orders/{id}/cancel requests. The body is
/// optional.
async fn handle_cancel_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	body: Bytes,
) -> ApiResult<CustomerOrder> {
	let request: CancelOrderRequest = optional_json_body(&body)?;
	let order = apis::order::cancel_order(&state.engine, &actor, &id, request).await?;
	Ok(Json(ApiResponse::success(order)))
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
	limit: Option<usize>,
}

/// Handles GET /api/activity requests.
async fn handle_recent_activity(
	State(state): State<AppState>,
	CurrentActor(actor): CurrentActor,
	query: Result<Query<ActivityQuery>, QueryRejection>,
) -> ApiResult<Vec<ActivityEntry>> {
	let Query(query) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
	let entries = apis::order::recent_activity(&state.engine, &actor, query.limit).await?;
	Ok(Json(ApiResponse::success(entries)))
}

/// Handles GET /api/branches requests.
async fn handle_branches(State(state): State<AppState>) -> Json<ApiResponse<Vec<Branch>>> {
	Json(ApiResponse::success(state.engine.branches()))
}

/// Handles GET /api/health requests.
async fn handle_health(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
	Json(ApiResponse::success(serde_json::json!({
		"status": "ok",
		"shopId": state.engine.config().shop.id,
	})))
}
