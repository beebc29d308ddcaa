use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use storefront_infra::CheckoutError;

pub fn checkout_error_to_response(err: CheckoutError) -> axum::response::Response {
    let status = match &err {
        CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CheckoutError::InsufficientStock { .. }
        | CheckoutError::DuplicatePayment { .. }
        | CheckoutError::Conflict(_) => StatusCode::CONFLICT,
        CheckoutError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::Forbidden => StatusCode::FORBIDDEN,
        CheckoutError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match err {
        CheckoutError::InsufficientStock {
            product_id,
            ref product_name,
            requested,
            available,
        } => (
            status,
            axum::Json(json!({
                "error": err.code(),
                "message": err.to_string(),
                "product_id": product_id,
                "product_name": product_name,
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        // Persistence details stay in the logs.
        CheckoutError::Internal(_) => json_error(status, err.code(), "internal server error"),
        _ => json_error(status, err.code(), err.to_string()),
    }
}

pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn query_rejection_to_response(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
