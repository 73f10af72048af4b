//! Wallet balance, ledger history and reconciliation endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::UserId;
use domain::Reconciliation;
use store::{Store, Transaction, Wallet};

use super::parse_id;
use crate::AppState;
use crate::envelope::{Reply, ok};
use crate::error::ApiError;

/// GET /wallets/{user_id}
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Reply<Wallet>, ApiError> {
    let user_id: UserId = parse_id(&id, "user_id")?;
    let wallet = state.service.ledger().wallet(user_id).await?;
    Ok(ok("Wallet retrieved", wallet))
}

/// GET /wallets/{user_id}/transactions
pub async fn transactions<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Reply<Vec<Transaction>>, ApiError> {
    let user_id: UserId = parse_id(&id, "user_id")?;
    let rows = state.service.ledger().transactions(user_id).await?;
    Ok(ok(format!("{} transactions", rows.len()), rows))
}

/// GET /wallets/{user_id}/reconcile
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Reply<Reconciliation>, ApiError> {
    let user_id: UserId = parse_id(&id, "user_id")?;
    let report = state.service.ledger().reconcile(user_id).await?;
    let message = if report.is_consistent() {
        "Wallet balance matches ledger"
    } else {
        "Wallet balance does not match ledger"
    };
    Ok(ok(message, report))
}
