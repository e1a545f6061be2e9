//! API handlers for the shop HTTP API.
//!
//! Each submodule implements one group of endpoints. Lifecycle failures are
//! turned into [`APIError`] values here so that every endpoint reports them
//! with the same status codes and error codes.

pub mod actor;
pub mod order;

use shop_core::LifecycleError;
use shop_types::APIError;

/// Seconds a client should wait before retrying after a storage failure.
const STORAGE_RETRY_AFTER_SECS: u64 = 1;

/// Maps a lifecycle failure onto its HTTP representation.
pub fn lifecycle_error(err: LifecycleError) -> APIError {
	match err {
		LifecycleError::Validation(message) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".to_string(),
			message,
		},
		LifecycleError::Authorization(message) => APIError::Forbidden {
			error_type: "FORBIDDEN".to_string(),
			message,
		},
		LifecycleError::NotFound(message) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message,
		},
		LifecycleError::InvalidState(message) => APIError::Conflict {
			error_type: "INVALID_STATE".to_string(),
			message,
		},
		LifecycleError::Conflict(message) => APIError::Conflict {
			error_type: "CONFLICT".to_string(),
			message,
		},
		LifecycleError::Storage(message) => APIError::ServiceUnavailable {
			error_type: "STORAGE_UNAVAILABLE".to_string(),
			message,
			retry_after: Some(STORAGE_RETRY_AFTER_SECS),
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		let cases = [
			(LifecycleError::Validation("x".into()), 400, "VALIDATION_ERROR"),
			(LifecycleError::Authorization("x".into()), 403, "FORBIDDEN"),
			(LifecycleError::NotFound("x".into()), 404, "ORDER_NOT_FOUND"),
			(LifecycleError::InvalidState("x".into()), 409, "INVALID_STATE"),
			(LifecycleError::Conflict("x".into()), 409, "CONFLICT"),
			(LifecycleError::Storage("x".into()), 503, "STORAGE_UNAVAILABLE"),
		];
		for (err, status, code) in cases {
			let api = lifecycle_error(err);
			assert_eq!(api.status_code(), status);
			assert_eq!(api.to_error_response().error, code);
		}
	}

	#[test]
	fn test_storage_errors_suggest_retry() {
		let api = lifecycle_error(LifecycleError::Storage("timed out".into()));
		assert_eq!(api.to_error_response().retry_after, Some(1));
	}
}
