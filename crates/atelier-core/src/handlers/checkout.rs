//! Checkout handler for placing catalog and modular orders.
//!
//! Validates the submitted payload, recomputes all monetary amounts
//! server-side, mints a date-sequenced order id and, for online payments,
//! creates a payment intent at the gateway before persisting the order.

use crate::engine::event_bus::EventBus;
use crate::state::{order::unix_now, OrderStateMachine};
use crate::FulfillmentError;
use atelier_config::PricingConfig;
use atelier_payment::PaymentService;
use atelier_storage::{StorageError, StorageService};
use atelier_types::{
	modular_total, CustomerContact, DesignElement, FulfillmentEvent, LineItem, ModularOrder,
	Order, OrderEvent, OrderStatus, Paise, PaymentMethod, PaymentState, Pricing, ShippingAddress,
	StatusHistoryEntry, StorageKey,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// Retries on the per-day sequence counter before giving up.
const MAX_COUNTER_RETRIES: usize = 16;

/// A catalog checkout submission.
///
/// Carries no client-side totals; pricing is always recomputed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
	pub customer_id: String,
	pub items: Vec<LineItem>,
	pub shipping: ShippingAddress,
	pub payment_method: PaymentMethod,
}

/// A modular (design-your-own) order submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModularCheckoutRequest {
	pub customer: CustomerContact,
	pub base_price: Paise,
	pub selections: BTreeMap<String, DesignElement>,
}

/// Handler for placing new orders.
pub struct CheckoutHandler {
	storage: Arc<StorageService>,
	payment: Arc<PaymentService>,
	state_machine: Arc<OrderStateMachine>,
	event_bus: EventBus,
	pricing: PricingConfig,
	currency: String,
}

impl CheckoutHandler {
	pub fn new(
		storage: Arc<StorageService>,
		payment: Arc<PaymentService>,
		state_machine: Arc<OrderStateMachine>,
		event_bus: EventBus,
		pricing: PricingConfig,
		currency: String,
	) -> Self {
		Self {
			storage,
			payment,
			state_machine,
			event_bus,
			pricing,
			currency,
		}
	}

	/// Places a catalog order.
	///
	/// For online payment the gateway intent is created before the order is
	/// stored, so a persisted order always carries its gateway reference.
	#[instrument(skip_all, fields(customer_id = %request.customer_id))]
	pub async fn handle_checkout(&self, request: CheckoutRequest) -> Result<Order, FulfillmentError> {
		Self::validate_checkout(&request)?;

		let pricing = Pricing::compute(
			&request.items,
			self.pricing.delivery_fee_paise,
			self.pricing.tax_rate_bps,
		)
		.ok_or_else(|| {
			FulfillmentError::Validation("order total overflows the paise range".into())
		})?;
		let order_id = self.next_order_id().await?;

		let mut payment = PaymentState::pending(request.payment_method);
		if request.payment_method == PaymentMethod::Online {
			let intent = self
				.payment
				.create_intent(pricing.total, &self.currency, &order_id)
				.await
				.map_err(|e| FulfillmentError::Gateway(e.to_string()))?;

			// Callbacks arrive keyed by the gateway's reference.
			self.storage
				.store(
					StorageKey::OrdersByGatewayRef.as_str(),
					&intent.gateway_order_id,
					&order_id,
				)
				.await
				.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
			payment.gateway_order_id = Some(intent.gateway_order_id);
		}

		let now = unix_now()?;
		let order = Order {
			id: order_id,
			customer_id: request.customer_id.clone(),
			items: request.items,
			shipping: request.shipping,
			pricing,
			payment,
			status: OrderStatus::Placed,
			assigned_worker: None,
			history: vec![StatusHistoryEntry {
				status: OrderStatus::Placed,
				timestamp: now,
				note: None,
				actor_id: request.customer_id,
			}],
			created_at: now,
			updated_at: now,
		};

		self.state_machine.store_order(&order).await?;
		tracing::info!(order_id = %order.id, total = order.pricing.total, "Order placed");
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Placed {
				order: order.clone(),
			}))
			.ok();

		Ok(order)
	}

	/// Places a modular order.
	#[instrument(skip_all, fields(customer = %request.customer.name))]
	pub async fn handle_modular_checkout(
		&self,
		request: ModularCheckoutRequest,
	) -> Result<ModularOrder, FulfillmentError> {
		Self::validate_modular(&request)?;

		let total_price = modular_total(request.base_price, &request.selections).ok_or_else(
			|| FulfillmentError::Validation("design total overflows the paise range".into()),
		)?;
		let order_id = self.next_order_id().await?;
		let now = unix_now()?;

		let order = ModularOrder {
			id: order_id,
			customer: request.customer,
			selections: request.selections,
			base_price: request.base_price,
			total_price,
			status: OrderStatus::Placed,
			history: vec![StatusHistoryEntry {
				status: OrderStatus::Placed,
				timestamp: now,
				note: None,
				actor_id: "guest".to_string(),
			}],
			created_at: now,
			updated_at: now,
		};

		self.state_machine.store_modular_order(&order).await?;
		tracing::info!(order_id = %order.id, total = total_price, "Modular order placed");
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::ModularPlaced {
				order_id: order.id.clone(),
				total_price,
			}))
			.ok();

		Ok(order)
	}

	fn validate_checkout(request: &CheckoutRequest) -> Result<(), FulfillmentError> {
		if request.customer_id.is_empty() {
			return Err(FulfillmentError::Validation("customer_id is required".into()));
		}
		if request.items.is_empty() {
			return Err(FulfillmentError::Validation(
				"order must contain at least one item".into(),
			));
		}
		for item in &request.items {
			if item.quantity == 0 {
				return Err(FulfillmentError::Validation(format!(
					"item '{}' has zero quantity",
					item.product_id
				)));
			}
			if item.unit_price == 0 {
				return Err(FulfillmentError::Validation(format!(
					"item '{}' has zero price",
					item.product_id
				)));
			}
		}
		let shipping = &request.shipping;
		if shipping.recipient.is_empty()
			|| shipping.line1.is_empty()
			|| shipping.city.is_empty()
			|| shipping.postal_code.is_empty()
			|| shipping.phone.is_empty()
		{
			return Err(FulfillmentError::Validation(
				"shipping address is incomplete".into(),
			));
		}
		Ok(())
	}

	fn validate_modular(request: &ModularCheckoutRequest) -> Result<(), FulfillmentError> {
		let customer = &request.customer;
		if customer.name.is_empty() || customer.phone.is_empty() || customer.address.is_empty() {
			return Err(FulfillmentError::Validation(
				"customer contact is incomplete".into(),
			));
		}
		if request.base_price == 0 {
			return Err(FulfillmentError::Validation("base_price is required".into()));
		}
		if request.selections.is_empty() {
			return Err(FulfillmentError::Validation(
				"at least one design selection is required".into(),
			));
		}
		Ok(())
	}

	/// Mints the next order id, `TLR-YYYYMMDD-NNNN`.
	///
	/// The per-day sequence lives in the counters namespace and advances
	/// through compare-and-swap, so concurrent checkouts never mint the same
	/// id.
	async fn next_order_id(&self) -> Result<String, FulfillmentError> {
		let date = Utc::now().format("%Y%m%d").to_string();
		for _ in 0..MAX_COUNTER_RETRIES {
			match self
				.storage
				.retrieve_versioned::<u64>(StorageKey::Counters.as_str(), &date)
				.await
			{
				Ok((seq, snapshot)) => {
					let next = seq + 1;
					let swapped = self
						.storage
						.swap(StorageKey::Counters.as_str(), &date, &snapshot, &next)
						.await
						.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
					if swapped {
						return Ok(format!("TLR-{}-{:04}", date, next));
					}
				}
				Err(StorageError::NotFound) => {
					let created = self
						.storage
						.swap_create(StorageKey::Counters.as_str(), &date, &1u64)
						.await
						.map_err(|e| FulfillmentError::Storage(e.to_string()))?;
					if created {
						return Ok(format!("TLR-{}-0001", date));
					}
				}
				Err(e) => return Err(FulfillmentError::Storage(e.to_string())),
			}
		}
		Err(FulfillmentError::Storage(
			"Persistent contention on order sequence".into(),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atelier_payment::implementations::mock::MockGateway;
	use atelier_storage::implementations::memory::MemoryStorage;
	use atelier_types::SecretString;

	fn handler() -> CheckoutHandler {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		CheckoutHandler::new(
			storage.clone(),
			Arc::new(PaymentService::new(Box::new(MockGateway::new(
				SecretString::from("s"),
			)))),
			Arc::new(OrderStateMachine::new(storage)),
			EventBus::new(16),
			PricingConfig {
				delivery_fee_paise: 5_000,
				tax_rate_bps: 500,
			},
			"INR".to_string(),
		)
	}

	fn request(method: PaymentMethod) -> CheckoutRequest {
		CheckoutRequest {
			customer_id: "cust-1".into(),
			items: vec![LineItem {
				product_id: "sku-1".into(),
				name: "Bespoke shirt".into(),
				unit_price: 150_000,
				quantity: 2,
				customization: Some("slim fit".into()),
			}],
			shipping: ShippingAddress {
				recipient: "R".into(),
				line1: "1 Lane".into(),
				line2: None,
				city: "Pune".into(),
				state: "MH".into(),
				postal_code: "411001".into(),
				phone: "999".into(),
			},
			payment_method: method,
		}
	}

	#[tokio::test]
	async fn test_online_checkout_creates_intent_and_mapping() {
		let handler = handler();
		let order = handler
			.handle_checkout(request(PaymentMethod::Online))
			.await
			.unwrap();

		assert_eq!(order.status, OrderStatus::Placed);
		assert_eq!(order.pricing.subtotal, 300_000);
		assert_eq!(order.pricing.tax, 15_000);
		assert_eq!(order.pricing.total, 320_000);

		let gateway_order_id = order.payment.gateway_order_id.as_deref().unwrap();
		let mapped: String = handler
			.storage
			.retrieve(StorageKey::OrdersByGatewayRef.as_str(), gateway_order_id)
			.await
			.unwrap();
		assert_eq!(mapped, order.id);
	}

	#[tokio::test]
	async fn test_cod_checkout_skips_gateway() {
		let handler = handler();
		let order = handler
			.handle_checkout(request(PaymentMethod::CashOnDelivery))
			.await
			.unwrap();
		assert!(order.payment.gateway_order_id.is_none());
	}

	#[tokio::test]
	async fn test_order_ids_are_date_sequenced() {
		let handler = handler();
		let date = Utc::now().format("%Y%m%d").to_string();

		let first = handler
			.handle_checkout(request(PaymentMethod::CashOnDelivery))
			.await
			.unwrap();
		let second = handler
			.handle_checkout(request(PaymentMethod::CashOnDelivery))
			.await
			.unwrap();
		assert_eq!(first.id, format!("TLR-{}-0001", date));
		assert_eq!(second.id, format!("TLR-{}-0002", date));
	}

	#[tokio::test]
	async fn test_empty_cart_rejected() {
		let handler = handler();
		let mut req = request(PaymentMethod::Online);
		req.items.clear();
		assert!(matches!(
			handler.handle_checkout(req).await,
			Err(FulfillmentError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_overflowing_price_rejected() {
		let handler = handler();
		let mut req = request(PaymentMethod::Online);
		req.items[0].unit_price = u64::MAX / 2 + 1;
		req.items[0].quantity = 2;
		assert!(matches!(
			handler.handle_checkout(req).await,
			Err(FulfillmentError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_modular_checkout_recomputes_total() {
		let handler = handler();
		let mut selections = BTreeMap::new();
		selections.insert(
			"collar".to_string(),
			DesignElement {
				name: "Mandarin collar".into(),
				price: 15_000,
			},
		);
		let order = handler
			.handle_modular_checkout(ModularCheckoutRequest {
				customer: CustomerContact {
					name: "G".into(),
					phone: "999".into(),
					email: None,
					address: "1 Lane".into(),
				},
				base_price: 200_000,
				selections,
			})
			.await
			.unwrap();
		assert_eq!(order.total_price, 215_000);
		assert_eq!(order.status, OrderStatus::Placed);
	}

	#[tokio::test]
	async fn test_modular_checkout_rejects_overflowing_total() {
		let handler = handler();
		let mut selections = BTreeMap::new();
		selections.insert(
			"collar".to_string(),
			DesignElement {
				name: "Mandarin collar".into(),
				price: u64::MAX,
			},
		);
		let err = handler
			.handle_modular_checkout(ModularCheckoutRequest {
				customer: CustomerContact {
					name: "G".into(),
					phone: "999".into(),
					email: None,
					address: "1 Lane".into(),
				},
				base_price: 200_000,
				selections,
			})
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Validation(_)));
	}

	#[tokio::test]
	async fn test_modular_checkout_requires_selection() {
		let handler = handler();
		let err = handler
			.handle_modular_checkout(ModularCheckoutRequest {
				customer: CustomerContact {
					name: "G".into(),
					phone: "999".into(),
					email: None,
					address: "1 Lane".into(),
				},
				base_price: 200_000,
				selections: BTreeMap::new(),
			})
			.await
			.unwrap_err();
		assert!(matches!(err, FulfillmentError::Validation(_)));
	}
}
