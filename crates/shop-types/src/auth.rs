//! Acting user types.
//!
//! Authentication happens outside this system. Whatever authenticated the
//! request hands over an [`Actor`], which is then passed explicitly into every
//! lifecycle call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Administrator,
	Supervisor,
	SalesManager,
	Staff,
	SeatMaker,
	Sewer,
	Customer,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Administrator => "administrator",
			Role::Supervisor => "supervisor",
			Role::SalesManager => "sales_manager",
			Role::Staff => "staff",
			Role::SeatMaker => "seat_maker",
			Role::Sewer => "sewer",
			Role::Customer => "customer",
		}
	}

	/// Returns an iterator over all roles.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Administrator,
			Self::Supervisor,
			Self::SalesManager,
			Self::Staff,
			Self::SeatMaker,
			Self::Sewer,
			Self::Customer,
		]
		.into_iter()
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Role::all()
			.find(|role| role.as_str() == s)
			.ok_or_else(|| format!("Unknown role: {}", s))
	}
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
	pub user_id: String,
	pub role: Role,
	/// Branch the user works at. Customers have none.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub branch_id: Option<u64>,
}

impl Actor {
	pub fn new(user_id: impl Into<String>, role: Role) -> Self {
		Self {
			user_id: user_id.into(),
			role,
			branch_id: None,
		}
	}

	pub fn with_branch(mut self, branch_id: u64) -> Self {
		self.branch_id = Some(branch_id);
		self
	}

	pub fn customer(user_id: impl Into<String>) -> Self {
		Self::new(user_id, Role::Customer)
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.user_id, self.role)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_role_round_trip_names() {
		for role in Role::all() {
			assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
		}
		assert!("manager".parse::<Role>().is_err());
	}
}
