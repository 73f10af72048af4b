//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::FulfillmentError;

use crate::envelope::ApiResponse;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client.
    BadRequest(String),
    /// Domain validation or infrastructure error.
    Fulfillment(FulfillmentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
        };

        metrics::counter!("http_errors_total", "status" => status.as_u16().to_string()).increment(1);
        (status, axum::Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

/// Maps domain errors to a status code and client-facing message.
///
/// Infrastructure failures are logged in full and reported generically.
pub fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    use FulfillmentError::*;

    if !err.is_client_error() {
        tracing::error!(error = %err, "fulfillment operation failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        );
    }

    let status = match &err {
        OrderNotFound(_) | DriverNotFound(_) | WalletNotFound(_) | PayoutNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        NotPermitted { .. } => StatusCode::FORBIDDEN,
        InvalidTransition { .. }
        | OrderNotReassignable { .. }
        | OrderNotSettleable { .. }
        | DriverAlreadyAssigned { .. }
        | DuplicateTransaction { .. }
        | PayoutNotPending { .. } => StatusCode::CONFLICT,
        InvalidOtp
        | DriverNotEligible { .. }
        | InsufficientBalance { .. }
        | InvalidAmount(_)
        | InvalidReference => StatusCode::UNPROCESSABLE_ENTITY,
        Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, OrderId};
    use store::{OrderStatus, StoreError};

    use super::*;

    #[test]
    fn test_validation_errors_are_client_errors() {
        let (status, _) = fulfillment_error_to_response(FulfillmentError::InsufficientBalance {
            available: Money::from_minor(1),
            requested: Money::from_minor(2),
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, message) = fulfillment_error_to_response(FulfillmentError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Cancelled,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(message.contains("COMPLETED"));

        let (status, _) = fulfillment_error_to_response(FulfillmentError::OrderNotFound(
            OrderId::new(),
        ));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err = FulfillmentError::Store(StoreError::Corrupt {
            table: "orders",
            reason: "bad status".to_string(),
        });
        let (status, message) = fulfillment_error_to_response(err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }
}
