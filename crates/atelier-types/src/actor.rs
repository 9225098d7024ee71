//! Actor and role types for authorization decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an actor interacting with the fulfillment core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Global administrator; may apply any permitted transition.
	Admin,
	/// Fulfillment worker; may progress orders assigned to them.
	Tailor,
	/// Customer account; no transition authority in this core.
	Customer,
}

/// An authenticated actor initiating an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
	/// Stable identifier of the actor.
	pub id: String,
	/// Role carried by the actor's session.
	pub role: Role,
}

impl Actor {
	pub fn new(id: impl Into<String>, role: Role) -> Self {
		Self {
			id: id.into(),
			role,
		}
	}

	/// The synthetic actor used for payment-driven transitions.
	///
	/// Payment verification and automatic cancellation on payment failure
	/// are not initiated by a human; history entries record this id.
	pub fn system() -> Self {
		Self {
			id: "system".to_string(),
			role: Role::Admin,
		}
	}

	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({:?})", self.id, self.role)
	}
}
