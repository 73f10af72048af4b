//! Payout request and disbursement callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, UserId};
use domain::PayoutReceipt;
use serde::Deserialize;
use store::{Payout, Store};

use crate::AppState;
use crate::envelope::{Reply, ok, with_status};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RequestPayoutRequest {
    pub account_id: UserId,
    /// Minor units.
    pub amount: i64,
    /// Idempotency key. Retries must reuse it.
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailPayoutRequest {
    pub reason: String,
}

/// POST /payouts
///
/// Answers `202 Accepted`: the wallet is debited now, disbursement
/// completes later through the callbacks below.
#[tracing::instrument(skip(state, payload))]
pub async fn request<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<RequestPayoutRequest>, JsonRejection>,
) -> Result<Reply<PayoutReceipt>, ApiError> {
    let Json(req) = payload?;
    let receipt = state
        .service
        .payouts()
        .request_payout(req.account_id, Money::from_minor(req.amount), req.reference)
        .await?;

    let message = if receipt.created {
        "Payout requested"
    } else {
        "Payout already requested"
    };
    Ok(with_status(StatusCode::ACCEPTED, message, receipt))
}

/// GET /payouts/{reference}
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
) -> Result<Reply<Payout>, ApiError> {
    let payout = state.service.payouts().get_payout(&reference).await?;
    Ok(ok("Payout retrieved", payout))
}

/// POST /payouts/{reference}/complete
#[tracing::instrument(skip(state))]
pub async fn complete<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
) -> Result<Reply<Payout>, ApiError> {
    let payout = state.service.payouts().complete_payout(&reference).await?;
    Ok(ok("Payout completed", payout))
}

/// POST /payouts/{reference}/fail
#[tracing::instrument(skip(state, payload))]
pub async fn fail<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
    payload: Result<Json<FailPayoutRequest>, JsonRejection>,
) -> Result<Reply<Payout>, ApiError> {
    let Json(req) = payload?;
    let payout = state
        .service
        .payouts()
        .fail_payout(&reference, &req.reason)
        .await?;
    Ok(ok("Payout failed and reversed", payout))
}
