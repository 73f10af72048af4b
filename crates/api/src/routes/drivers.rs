//! Driver profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::UserId;
use serde::Deserialize;
use store::{Driver, Store};

use super::parse_id;
use crate::AppState;
use crate::envelope::{Reply, ok};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RegisterDriverRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_online: bool,
}

/// POST /drivers (upsert)
#[tracing::instrument(skip(state, payload))]
pub async fn register<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<RegisterDriverRequest>, JsonRejection>,
) -> Result<Reply<Driver>, ApiError> {
    let Json(req) = payload?;
    let driver = state
        .service
        .assignments()
        .register_driver(Driver {
            user_id: req.user_id,
            is_verified: req.is_verified,
            is_online: req.is_online,
        })
        .await?;
    Ok(ok("Driver registered", driver))
}

/// GET /drivers/{user_id}
pub async fn get<S: Store + Clone>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Reply<Driver>, ApiError> {
    let user_id: UserId = parse_id(&id, "user_id")?;
    let driver = state.service.assignments().get_driver(user_id).await?;
    Ok(ok("Driver retrieved", driver))
}
