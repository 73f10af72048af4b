//! Order placement, status transition and driver assignment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, UserId};
use domain::{Actor, Assignment, TransitionRequest, TransitionResult};
use serde::Deserialize;
use store::{Order, OrderStatus, Store};

use super::parse_id;
use crate::AppState;
use crate::envelope::{Reply, ok, with_status};
use crate::error::ApiError;

// -- Request types --

/// Checkout hand-off. Totals are in minor units.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub vendor_id: UserId,
    pub customer_id: UserId,
    pub gross_total: i64,
    pub delivery_fee: i64,
    #[serde(default)]
    pub coupon_discount: i64,
    /// Payment already captured at checkout.
    #[serde(default)]
    pub paid: bool,
    pub otp_code: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub actor: Actor,
    pub target_status: OrderStatus,
    pub otp: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignDriverRequest {
    pub driver_id: UserId,
    pub reason: Option<String>,
}

// -- Handlers --

/// POST /orders
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Reply<Order>, ApiError> {
    let Json(req) = payload?;

    let mut order = Order::new(
        req.vendor_id,
        req.customer_id,
        Money::from_minor(req.gross_total),
        Money::from_minor(req.delivery_fee),
        Money::from_minor(req.coupon_discount),
    );
    if req.paid {
        order = order.paid();
    }
    if let Some(otp) = req.otp_code {
        order = order.with_otp(otp);
    }
    match (req.receiver_name, req.receiver_phone) {
        (Some(name), Some(phone)) => order = order.with_gift(name, phone),
        (None, None) => {}
        _ => {
            return Err(ApiError::BadRequest(
                "receiver_name and receiver_phone must be given together".to_string(),
            ));
        }
    }

    let order = state.service.orders().place_order(order).await?;
    Ok(with_status(StatusCode::CREATED, "Order placed", order))
}

/// GET /orders/{id}
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Reply<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order_id")?;
    let order = state.service.orders().get_order(order_id).await?;
    Ok(ok("Order retrieved", order))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Reply<TransitionResult>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order_id")?;
    let Json(req) = payload?;

    let request = TransitionRequest {
        order_id,
        target: req.target_status,
        actor: req.actor,
        otp: req.otp,
        reason: req.reason,
    };
    let result = state.service.orders().transition(request).await?;

    let message = if result.changed {
        format!("Order status updated to {}", result.order.status)
    } else {
        format!("Order already {}", result.order.status)
    };
    Ok(ok(message, result))
}

/// POST /orders/{id}/assign
#[tracing::instrument(skip(state, payload))]
pub async fn assign<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<AssignDriverRequest>, JsonRejection>,
) -> Result<Reply<Assignment>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order_id")?;
    let Json(req) = payload?;

    let assignment = state
        .service
        .assignments()
        .assign(order_id, req.driver_id)
        .await?;
    Ok(ok("Driver assigned", assignment))
}

/// POST /orders/{id}/reassign
#[tracing::instrument(skip(state, payload))]
pub async fn reassign<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<ReassignDriverRequest>, JsonRejection>,
) -> Result<Reply<Assignment>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order_id")?;
    let Json(req) = payload?;

    let assignment = state
        .service
        .assignments()
        .reassign(order_id, req.driver_id, req.reason)
        .await?;
    Ok(ok("Driver reassigned", assignment))
}
