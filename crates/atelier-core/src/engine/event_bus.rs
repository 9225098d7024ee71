//! Event bus for inter-service communication.
//!
//! Broadcast-based bus carrying fulfillment events. Publishing never blocks;
//! subscribers that fall behind lose the oldest events, which is acceptable
//! because every event is derived from state already persisted in storage.

use atelier_types::FulfillmentEvent;
use tokio::sync::broadcast;

/// Broadcast channel for fulfillment events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<FulfillmentEvent>,
}

impl EventBus {
	/// Creates a new event bus with the given channel capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error only when no subscriber exists, which callers are
	/// free to ignore.
	pub fn publish(
		&self,
		event: FulfillmentEvent,
	) -> Result<(), broadcast::error::SendError<FulfillmentEvent>> {
		self.sender.send(event).map(|_| ())
	}

	/// Creates a new subscription to the event stream.
	pub fn subscribe(&self) -> broadcast::Receiver<FulfillmentEvent> {
		self.sender.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atelier_types::{AllocationEvent, FulfillmentEvent};

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(16);
		let mut rx = bus.subscribe();

		bus.publish(FulfillmentEvent::Allocation(AllocationEvent::Assigned {
			order_id: "o1".into(),
			worker_id: "w1".into(),
		}))
		.unwrap();

		match rx.recv().await.unwrap() {
			FulfillmentEvent::Allocation(AllocationEvent::Assigned { order_id, worker_id }) => {
				assert_eq!(order_id, "o1");
				assert_eq!(worker_id, "w1");
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_publish_without_subscribers_errs() {
		let bus = EventBus::new(16);
		assert!(bus
			.publish(FulfillmentEvent::Allocation(AllocationEvent::Unassigned {
				order_id: "o1".into(),
			}))
			.is_err());
	}
}
