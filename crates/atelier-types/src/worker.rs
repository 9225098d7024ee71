//! Worker (tailor) types and eligibility rules.

use serde::{Deserialize, Serialize};

/// A fulfillment worker who can be assigned concurrent active orders.
///
/// The workload counter is maintained exclusively through the directory's
/// atomic reserve/release operations; no code path recounts orders to
/// derive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worker {
	/// Stable identifier of the worker.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Whether the worker is part of the active roster.
	pub is_active: bool,
	/// Whether the worker is currently accepting new assignments.
	pub is_available: bool,
	/// Number of active orders currently assigned.
	pub current_workload: u32,
	/// Maximum number of concurrent active orders.
	pub max_capacity: u32,
	/// Specialization tags (e.g. "sherwani", "suits"). Carried for future
	/// skill-aware strategies; the load-based allocator ignores them.
	#[serde(default)]
	pub specializations: Vec<String>,
}

impl Worker {
	/// A worker is eligible for allocation iff active, available and under
	/// capacity.
	pub fn is_eligible(&self) -> bool {
		self.is_active && self.is_available && self.current_workload < self.max_capacity
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn worker(active: bool, available: bool, load: u32, cap: u32) -> Worker {
		Worker {
			id: "w1".into(),
			name: "Asha".into(),
			is_active: active,
			is_available: available,
			current_workload: load,
			max_capacity: cap,
			specializations: vec![],
		}
	}

	#[test]
	fn test_eligibility() {
		assert!(worker(true, true, 0, 5).is_eligible());
		assert!(!worker(false, true, 0, 5).is_eligible());
		assert!(!worker(true, false, 0, 5).is_eligible());
		assert!(!worker(true, true, 5, 5).is_eligible());
	}
}
