use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use storefront_infra::AdminOrderFilter;
use storefront_orders::OrderStatus;

use crate::app::routes::orders::parse_order_id;
use crate::app::{dto, errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/summary", get(order_summary))
        .route("/orders/:id/status", put(update_order))
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    query: Result<Query<dto::AdminListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };

    let status = match query.status.as_deref().map(str::parse::<OrderStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };

    let filter = AdminOrderFilter {
        status,
        offset: query.offset,
        limit: query.limit,
    };

    match services.checkout.admin_list_orders(ctx.caller(), filter).await {
        Ok(orders) => {
            let body: Vec<dto::OrderResponse> = orders.iter().map(dto::OrderResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::checkout_error_to_response(e),
    }
}

pub async fn order_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    match services.checkout.admin_order_summary(ctx.caller()).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateOrderBody>, JsonRejection>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let patch = match body.into_patch() {
        Ok(patch) => patch,
        Err(message) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", message),
    };

    match services
        .checkout
        .admin_update_order(ctx.caller(), order_id, patch)
        .await
    {
        Ok(order) => (StatusCode::OK, Json(dto::OrderResponse::from(&order))).into_response(),
        Err(e) => errors::checkout_error_to_response(e),
    }
}
