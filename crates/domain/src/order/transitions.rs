//! Order transition table and actor permissions.
//!
//! ```text
//! PENDING ──► PAID ──┬──► PROCESSING ──► DISPATCHED ──► COMPLETED
//!    │         │     └─────────────────────► │
//!    │         │             │               │
//!    └─────────┴─────────────┴───────────────┴──► CANCELLED | REFUNDED
//! ```

use std::fmt;

use common::UserId;
use serde::{Deserialize, Serialize};
use store::{Order, OrderStatus};

use crate::error::{FulfillmentError, Result};

/// Identity on whose behalf a transition is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Internal callers such as payment webhooks and schedulers.
    System,
    Admin(UserId),
    Vendor(UserId),
    Driver(UserId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::Admin(id) => write!(f, "admin {id}"),
            Actor::Vendor(id) => write!(f, "vendor {id}"),
            Actor::Driver(id) => write!(f, "driver {id}"),
        }
    }
}

/// Returns true if the table has an edge from `from` to `to`.
pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Paid)
            | (Paid, Processing)
            | (Paid, Dispatched)
            | (Processing, Dispatched)
            | (Dispatched, Completed)
            | (
                Pending | Paid | Processing | Dispatched,
                Cancelled | Refunded
            )
    )
}

/// Returns true if `actor`'s role may take the edge. Ownership is checked separately.
pub fn actor_may(actor: &Actor, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match actor {
        Actor::System | Actor::Admin(_) => true,
        Actor::Vendor(_) => matches!(
            (from, to),
            (Paid, Processing)
                | (Paid | Processing, Dispatched)
                | (Dispatched, Completed)
                | (Pending | Paid | Processing, Cancelled)
        ),
        Actor::Driver(_) => matches!(
            (from, to),
            (Paid | Processing, Dispatched) | (Dispatched, Completed)
        ),
    }
}

/// Rejects vendors acting on another vendor's order and drivers not assigned to it.
pub(crate) fn check_ownership(actor: &Actor, order: &Order, target: OrderStatus) -> Result<()> {
    let owns = match actor {
        Actor::System | Actor::Admin(_) => true,
        Actor::Vendor(id) => order.vendor_id == *id,
        Actor::Driver(id) => order.driver_id == Some(*id),
    };
    if owns {
        Ok(())
    } else {
        Err(not_permitted(actor, order.status, target))
    }
}

/// Validates a status change that is not a no-op.
pub(crate) fn check_transition(
    actor: &Actor,
    order: &Order,
    target: OrderStatus,
    otp: Option<&str>,
) -> Result<()> {
    let from = order.status;
    if from.is_terminal() || !is_allowed(from, target) {
        return Err(FulfillmentError::InvalidTransition { from, to: target });
    }
    if !actor_may(actor, from, target) {
        return Err(not_permitted(actor, from, target));
    }
    if matches!(actor, Actor::Driver(_)) && target == OrderStatus::Completed {
        match (order.otp_code.as_deref(), otp) {
            (Some(expected), Some(given)) if expected == given.trim() => {}
            _ => return Err(FulfillmentError::InvalidOtp),
        }
    }
    Ok(())
}

fn not_permitted(actor: &Actor, from: OrderStatus, to: OrderStatus) -> FulfillmentError {
    FulfillmentError::NotPermitted {
        actor: actor.to_string(),
        from,
        to,
    }
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Dispatched,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    fn order_in(status: OrderStatus) -> Order {
        let mut order = Order::new(
            UserId::new(),
            UserId::new(),
            Money::from_minor(1000),
            Money::from_minor(100),
            Money::zero(),
        )
        .with_otp("4821");
        order.status = status;
        order.driver_id = Some(UserId::new());
        order
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(OrderStatus::is_terminal) {
            for to in ALL {
                assert!(!is_allowed(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn happy_path_is_allowed() {
        assert!(is_allowed(OrderStatus::Pending, OrderStatus::Paid));
        assert!(is_allowed(OrderStatus::Paid, OrderStatus::Processing));
        assert!(is_allowed(OrderStatus::Processing, OrderStatus::Dispatched));
        assert!(is_allowed(OrderStatus::Dispatched, OrderStatus::Completed));
        assert!(!is_allowed(OrderStatus::Pending, OrderStatus::Completed));
        assert!(!is_allowed(OrderStatus::Dispatched, OrderStatus::Processing));
    }

    #[test]
    fn only_admin_and_system_refund() {
        let from = OrderStatus::Paid;
        assert!(actor_may(&Actor::System, from, OrderStatus::Refunded));
        assert!(actor_may(&Actor::Admin(UserId::new()), from, OrderStatus::Refunded));
        assert!(!actor_may(&Actor::Vendor(UserId::new()), from, OrderStatus::Refunded));
        assert!(!actor_may(&Actor::Driver(UserId::new()), from, OrderStatus::Refunded));
    }

    #[test]
    fn completed_rejects_every_target() {
        let order = order_in(OrderStatus::Completed);
        for to in ALL.into_iter().filter(|s| *s != OrderStatus::Completed) {
            let err = check_transition(&Actor::System, &order, to, None).unwrap_err();
            assert!(matches!(err, FulfillmentError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn vendor_must_own_the_order() {
        let order = order_in(OrderStatus::Paid);
        let stranger = Actor::Vendor(UserId::new());
        assert!(check_ownership(&stranger, &order, OrderStatus::Processing).is_err());
        assert!(
            check_ownership(&Actor::Vendor(order.vendor_id), &order, OrderStatus::Processing)
                .is_ok()
        );
    }

    #[test]
    fn driver_completion_requires_matching_otp() {
        let order = order_in(OrderStatus::Dispatched);
        let driver = Actor::Driver(order.driver_id.unwrap());

        for otp in [None, Some("0000")] {
            let err = check_transition(&driver, &order, OrderStatus::Completed, otp).unwrap_err();
            assert!(matches!(err, FulfillmentError::InvalidOtp));
        }
        assert!(check_transition(&driver, &order, OrderStatus::Completed, Some("4821")).is_ok());
        // Vendors confirm without a code.
        let vendor = Actor::Vendor(order.vendor_id);
        assert!(check_transition(&vendor, &order, OrderStatus::Completed, None).is_ok());
    }

    #[test]
    fn actor_serializes_with_role_tag() {
        let id = UserId::new();
        let json = serde_json::to_value(Actor::Driver(id)).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "driver", "id": id }));
        let system: Actor = serde_json::from_str(r#"{"role":"system"}"#).unwrap();
        assert_eq!(system, Actor::System);
    }
}
