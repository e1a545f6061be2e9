//! Identity extraction.
//!
//! Authentication is done by the gateway in front of this service, which
//! forwards the authenticated user in request headers. This extractor turns
//! those headers into an [`Actor`] for the lifecycle calls.

use axum::{extract::FromRequestParts, http::request::Parts};
use shop_types::{APIError, Actor, Role};
use thiserror::Error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_BRANCH_HEADER: &str = "x-user-branch";

/// Reasons the forwarded identity cannot be used.
#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("Missing header {0}")]
	Missing(&'static str),
	#[error("Header {0} is not valid text")]
	NotText(&'static str),
	#[error("{0}")]
	UnknownRole(String),
	#[error("Invalid branch id: {0}")]
	InvalidBranch(String),
}

impl From<IdentityError> for APIError {
	fn from(err: IdentityError) -> Self {
		APIError::Unauthorized {
			error_type: "UNAUTHENTICATED".to_string(),
			message: err.to_string(),
		}
	}
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
	S: Send + Sync,
{
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let actor = actor_from_parts(parts).map_err(|e| {
			tracing::warn!(error = %e, "Rejected request identity");
			APIError::from(e)
		})?;
		Ok(CurrentActor(actor))
	}
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<Option<&'a str>, IdentityError> {
	match parts.headers.get(name) {
		None => Ok(None),
		Some(value) => value
			.to_str()
			.map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
			.map_err(|_| IdentityError::NotText(name)),
	}
}

fn actor_from_parts(parts: &Parts) -> Result<Actor, IdentityError> {
	let user_id = header(parts, USER_ID_HEADER)?.ok_or(IdentityError::Missing(USER_ID_HEADER))?;
	let role: Role = header(parts, USER_ROLE_HEADER)?
		.ok_or(IdentityError::Missing(USER_ROLE_HEADER))?
		.parse()
		.map_err(IdentityError::UnknownRole)?;

	let mut actor = Actor::new(user_id, role);
	if let Some(branch) = header(parts, USER_BRANCH_HEADER)? {
		let branch_id = branch
			.parse::<u64>()
			.map_err(|_| IdentityError::InvalidBranch(branch.to_string()))?;
		actor = actor.with_branch(branch_id);
	}
	Ok(actor)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::Request;

	fn parts(headers: &[(&str, &str)]) -> Parts {
		let mut builder = Request::builder().uri("/");
		for (name, value) in headers {
			builder = builder.header(*name, *value);
		}
		builder.body(()).unwrap().into_parts().0
	}

	#[test]
	fn test_staff_identity_with_branch() {
		let actor = actor_from_parts(&parts(&[
			(USER_ID_HEADER, "mgr-1"),
			(USER_ROLE_HEADER, "sales_manager"),
			(USER_BRANCH_HEADER, "2"),
		]))
		.unwrap();
		assert_eq!(actor, Actor::new("mgr-1", Role::SalesManager).with_branch(2));
	}

	#[test]
	fn test_customer_identity_without_branch() {
		let actor = actor_from_parts(&parts(&[
			(USER_ID_HEADER, "cust-1"),
			(USER_ROLE_HEADER, "customer"),
		]))
		.unwrap();
		assert_eq!(actor, Actor::customer("cust-1"));
	}

	#[test]
	fn test_unusable_identities() {
		assert!(matches!(
			actor_from_parts(&parts(&[(USER_ROLE_HEADER, "customer")])),
			Err(IdentityError::Missing(USER_ID_HEADER))
		));
		assert!(matches!(
			actor_from_parts(&parts(&[(USER_ID_HEADER, "u"), (USER_ROLE_HEADER, "owner")])),
			Err(IdentityError::UnknownRole(_))
		));
		assert!(matches!(
			actor_from_parts(&parts(&[
				(USER_ID_HEADER, "u"),
				(USER_ROLE_HEADER, "staff"),
				(USER_BRANCH_HEADER, "north"),
			])),
			Err(IdentityError::InvalidBranch(_))
		));
	}
}
