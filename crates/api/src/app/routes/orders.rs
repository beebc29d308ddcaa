use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use storefront_core::OrderId;

use crate::app::{dto, errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/quote", post(quote))
        .route("/:id", get(get_order))
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse::<OrderId>()
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}

pub async fn quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<dto::QuoteBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.checkout.quote(ctx.caller(), body.into()).await {
        Ok(quote) => (StatusCode::OK, Json(dto::QuoteResponse::from(quote))).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<dto::CreateOrderBody>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.checkout.create_order(ctx.caller(), body.into()).await {
        Ok(order) => (StatusCode::CREATED, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    match services.checkout.list_orders(ctx.caller()).await {
        Ok(orders) => {
            let body: Vec<dto::OrderResponse> = orders.iter().map(dto::OrderResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::checkout_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.checkout.get_order(ctx.caller(), order_id).await {
        Ok(order) => (StatusCode::OK, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}
