//! Role policy for order operations.
//!
//! One static table decides which role may perform which action and how far
//! the permission reaches (every order, the actor's branch, or only the
//! actor's own orders). Call sites never compare role strings themselves.

use crate::state::LifecycleError;
use once_cell::sync::Lazy;
use shop_types::{Actor, CustomerOrder, Role};
use std::collections::HashMap;
use std::fmt;

/// Operations subject to the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
	PlaceOrder,
	SubmitQuotation,
	RespondToQuotation,
	AdvanceStatus,
	Cancel,
	ViewOrder,
	ListOrders,
	ViewActivity,
}

impl Action {
	pub fn as_str(&self) -> &'static str {
		match self {
			Action::PlaceOrder => "place_order",
			Action::SubmitQuotation => "submit_quotation",
			Action::RespondToQuotation => "respond_to_quotation",
			Action::AdvanceStatus => "advance_status",
			Action::Cancel => "cancel",
			Action::ViewOrder => "view_order",
			Action::ListOrders => "list_orders",
			Action::ViewActivity => "view_activity",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Reach of a granted permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
	/// Any order.
	All,
	/// Orders routed to the actor's branch.
	Branch,
	/// Orders the actor placed.
	Owner,
}

static POLICY: Lazy<HashMap<(Role, Action), Scope>> = Lazy::new(|| {
	use Action::*;
	use Role::*;

	let mut m = HashMap::new();
	m.insert((Customer, PlaceOrder), Scope::Owner);
	m.insert((Customer, RespondToQuotation), Scope::Owner);
	m.insert((Customer, ViewOrder), Scope::Owner);
	m.insert((Customer, ListOrders), Scope::Owner);

	for role in [Administrator, Supervisor, SalesManager] {
		m.insert((role, SubmitQuotation), Scope::All);
		m.insert((role, AdvanceStatus), Scope::All);
		m.insert((role, Cancel), Scope::All);
		m.insert((role, ViewActivity), Scope::All);
	}

	m.insert((Administrator, ViewOrder), Scope::All);
	m.insert((Administrator, ListOrders), Scope::All);
	for role in [Supervisor, SalesManager, Staff] {
		m.insert((role, ViewOrder), Scope::Branch);
		m.insert((role, ListOrders), Scope::Branch);
	}
	// seat_maker and sewer work from job orders and get no access here
	m
});

/// Looks up the scope granted to `role` for `action`, if any.
pub fn scope_for(role: Role, action: Action) -> Option<Scope> {
	POLICY.get(&(role, action)).copied()
}

/// Checks the role part of the policy.
pub fn authorize(actor: &Actor, action: Action) -> Result<Scope, LifecycleError> {
	let scope = scope_for(actor.role, action).ok_or_else(|| {
		LifecycleError::Authorization(format!("role {} may not {}", actor.role, action))
	})?;

	if scope == Scope::Branch && actor.branch_id.is_none() {
		return Err(LifecycleError::Authorization(format!(
			"{} has no branch assigned",
			actor
		)));
	}
	Ok(scope)
}

/// Whether a granted scope covers the given order.
pub fn covers(scope: Scope, actor: &Actor, order: &CustomerOrder) -> bool {
	match scope {
		Scope::All => true,
		Scope::Branch => actor.branch_id == Some(order.branch_id),
		Scope::Owner => order.is_owned_by(actor),
	}
}

/// Checks the scope part of the policy against a concrete order.
pub fn check_scope(
	scope: Scope,
	actor: &Actor,
	order: &CustomerOrder,
) -> Result<(), LifecycleError> {
	if covers(scope, actor, order) {
		return Ok(());
	}
	let reason = match scope {
		Scope::Owner => "belongs to another customer",
		_ => "belongs to another branch",
	};
	Err(LifecycleError::Authorization(format!(
		"order {} {}",
		order.order_number, reason
	)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_staff_actions_need_management_role() {
		for action in [Action::SubmitQuotation, Action::AdvanceStatus, Action::Cancel] {
			for role in Role::all() {
				let allowed = matches!(
					role,
					Role::Administrator | Role::Supervisor | Role::SalesManager
				);
				assert_eq!(scope_for(role, action).is_some(), allowed, "{role} {action}");
			}
		}
	}

	#[test]
	fn test_only_customers_place_and_respond() {
		for role in Role::all() {
			let is_customer = role == Role::Customer;
			assert_eq!(scope_for(role, Action::PlaceOrder).is_some(), is_customer);
			assert_eq!(
				scope_for(role, Action::RespondToQuotation).is_some(),
				is_customer
			);
		}
	}

	#[test]
	fn test_activity_feed_is_for_management() {
		assert_eq!(
			scope_for(Role::Supervisor, Action::ViewActivity),
			Some(Scope::All)
		);
		for role in [Role::Customer, Role::Staff, Role::SeatMaker, Role::Sewer] {
			assert!(scope_for(role, Action::ViewActivity).is_none(), "{role}");
		}
	}

	#[test]
	fn test_workshop_roles_see_nothing() {
		for role in [Role::SeatMaker, Role::Sewer] {
			let actor = Actor::new("w1", role).with_branch(1);
			assert!(matches!(
				authorize(&actor, Action::ListOrders),
				Err(LifecycleError::Authorization(_))
			));
		}
	}

	#[test]
	fn test_branch_scope_requires_branch() {
		let unassigned = Actor::new("s1", Role::Supervisor);
		assert!(authorize(&unassigned, Action::ViewOrder).is_err());

		let assigned = Actor::new("s1", Role::Supervisor).with_branch(2);
		assert_eq!(
			authorize(&assigned, Action::ViewOrder).unwrap(),
			Scope::Branch
		);
		assert_eq!(
			authorize(&Actor::new("a1", Role::Administrator), Action::ListOrders).unwrap(),
			Scope::All
		);
	}
}
