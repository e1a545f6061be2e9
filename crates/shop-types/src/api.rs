//! API types for the shop HTTP API.
//!
//! Request bodies mirror the calls the presentation layer makes
//! (`placeOrder`, `setQuotation`, `respondToQuotation`, `updateStatus`);
//! responses use the `{ "status": "success", "data": ... }` envelope.

use crate::{OrderStatus, ServiceRequest, VehicleInfo};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request body for placing a customer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
	pub customer_name: String,
	pub customer_phone: String,
	#[serde(default)]
	pub customer_email: Option<String>,
	#[serde(default)]
	pub customer_address: Option<String>,
	#[serde(default)]
	pub vehicle_info: VehicleInfo,
	#[serde(default)]
	pub services: Vec<ServiceRequest>,
	#[serde(default)]
	pub notes: Option<String>,
	pub branch_id: u64,
}

/// A quotation line as entered by staff.
///
/// Quantity is signed so that a negative entry is reported as a validation
/// failure rather than a malformed body. Any client supplied total is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationItemInput {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	pub quantity: i64,
	pub unit_price: Decimal,
}

/// Request body for attaching a quotation to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetQuotationRequest {
	pub items: Vec<QuotationItemInput>,
	#[serde(default)]
	pub notes: Option<String>,
	/// Version the caller last saw; a mismatch fails with a conflict.
	#[serde(default)]
	pub expected_version: Option<u64>,
}

/// The customer's answer to a quotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotationAction {
	Accept,
	Reject,
}

/// Request body for answering a quotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondToQuotationRequest {
	pub action: QuotationAction,
	#[serde(default)]
	pub notes: Option<String>,
	#[serde(default)]
	pub expected_version: Option<u64>,
}

/// Request body for moving an order along the fulfillment path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
	pub status: OrderStatus,
	#[serde(default)]
	pub expected_version: Option<u64>,
}

/// Request body for cancelling an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
	#[serde(default)]
	pub expected_version: Option<u64>,
}

/// Successful response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
	pub status: String,
	pub data: T,
}

impl<T> ApiResponse<T> {
	pub fn success(data: T) -> Self {
		Self {
			status: "success".to_string(),
			data,
		}
	}
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Always "error".
	pub status: String,
	/// Stable error code, e.g. `INVALID_STATE`.
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed or invalid input (400)
	BadRequest { error_type: String, message: String },
	/// Missing or unusable identity (401)
	Unauthorized { error_type: String, message: String },
	/// Identity lacks the role or ownership (403)
	Forbidden { error_type: String, message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Illegal transition or lost race (409)
	Conflict { error_type: String, message: String },
	/// Backing store unavailable, safe to retry (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
		}
	}

	fn parts(&self) -> (&str, &str) {
		match self {
			APIError::BadRequest { error_type, message }
			| APIError::Unauthorized { error_type, message }
			| APIError::Forbidden { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::ServiceUnavailable {
				error_type, message, ..
			} => (error_type, message),
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = self.parts();
		let retry_after = match self {
			APIError::ServiceUnavailable { retry_after, .. } => *retry_after,
			_ => None,
		};
		ErrorResponse {
			status: "error".to_string(),
			error: error_type.to_string(),
			message: message.to_string(),
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (error_type, message) = self.parts();
		write!(f, "{} ({}): {}", error_type, self.status_code(), message)
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_respond_request_parsing() {
		let request: RespondToQuotationRequest =
			serde_json::from_value(serde_json::json!({"action": "reject", "notes": "too pricey"}))
				.unwrap();
		assert_eq!(request.action, QuotationAction::Reject);
		assert_eq!(request.expected_version, None);
	}

	#[test]
	fn test_quotation_item_accepts_numeric_price() {
		let item: QuotationItemInput = serde_json::from_value(serde_json::json!({
			"name": "Leather seat cover",
			"quantity": 2,
			"unitPrice": 2500
		}))
		.unwrap();
		assert_eq!(item.unit_price, Decimal::from(2500));
	}

	#[test]
	fn test_error_response_shape() {
		let err = APIError::ServiceUnavailable {
			error_type: "STORAGE_UNAVAILABLE".to_string(),
			message: "timed out".to_string(),
			retry_after: Some(1),
		};
		assert_eq!(err.status_code(), 503);
		let body = serde_json::to_value(err.to_error_response()).unwrap();
		assert_eq!(body["status"], "error");
		assert_eq!(body["error"], "STORAGE_UNAVAILABLE");
		assert_eq!(body["retryAfter"], 1);
	}
}
