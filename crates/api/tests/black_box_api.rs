use std::sync::Arc;

use reqwest::StatusCode;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use storefront_api::app::{self, AppServices};
use storefront_api::middleware::{HeaderIdentityProvider, USER_ID_HEADER, USER_ROLE_HEADER};
use storefront_catalog::NewProduct;
use storefront_core::{ProductId, UserId};
use storefront_infra::AppConfig;

struct TestServer {
    base_url: String,
    teapot: ProductId,
    kettle: ProductId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig::test();
        let services = AppServices::in_memory(&config);

        let teapot = ProductId::new();
        let kettle = ProductId::new();
        for (id, name, price, stock) in [
            (teapot, "Teapot", dec!(50.00), 5),
            (kettle, "Kettle", dec!(10.00), 1),
        ] {
            services
                .checkout
                .register_product(NewProduct {
                    id,
                    name: name.to_string(),
                    price,
                    discount_price: None,
                    stock_quantity: stock,
                    image_url: None,
                    is_active: true,
                })
                .await
                .unwrap();
        }

        // Same router as prod, bound to an ephemeral port.
        let app = app::build_app(Arc::new(services), Arc::new(HeaderIdentityProvider));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            teapot,
            kettle,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn customer(client: &reqwest::Client, method: reqwest::Method, url: String, user: UserId) -> reqwest::RequestBuilder {
    client
        .request(method, url)
        .header(USER_ID_HEADER, user.to_string())
}

fn admin(client: &reqwest::Client, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
    client
        .request(method, url)
        .header(USER_ID_HEADER, UserId::new().to_string())
        .header(USER_ROLE_HEADER, "admin")
}

fn address() -> Value {
    json!({ "line1": "1 Main St", "city": "Springfield", "postal_code": "12345" })
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn order_routes_require_identity() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = client
        .get(server.url("/orders"))
        .header(USER_ID_HEADER, "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn quote_returns_totals_and_payment_reference() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = customer(&client, reqwest::Method::POST, server.url("/orders/quote"), UserId::new())
        .json(&json!({
            "items": [
                { "product_id": server.teapot, "quantity": 2 },
                { "product_id": server.kettle, "quantity": 1 },
            ],
            "shipping_address": address(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["subtotal"], "110.00");
    assert_eq!(body["shipping"], "0.00");
    assert_eq!(body["tax"], "8.80");
    assert_eq!(body["total"], "118.80");
    let reference = body["payment_reference"].as_str().unwrap();
    assert!(reference.starts_with("pi_"));
    assert_eq!(body["client_secret"], format!("{reference}_secret"));
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = UserId::new();

    let res = customer(&client, reqwest::Method::POST, server.url("/orders"), user)
        .json(&json!({
            "items": [{ "product_id": server.teapot, "quantity": 2 }],
            "shipping_address": address(),
            "payment_reference": "pi_lifecycle",
            "notes": "leave at the door",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["status"], "paid");
    assert_eq!(created["payment_method"], "card");
    assert_eq!(created["total_amount"], "108.00");
    assert_eq!(created["billing_address"], created["shipping_address"]);
    assert!(created["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(created["items"][0]["product_name"], "Teapot");
    assert_eq!(created["items"][0]["line_total"], "100.00");
    let id = created["id"].as_str().unwrap().to_string();

    let res = customer(&client, reqwest::Method::GET, server.url(&format!("/orders/{id}")), user)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Another customer sees nothing.
    let res = customer(&client, reqwest::Method::GET, server.url(&format!("/orders/{id}")), UserId::new())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = customer(&client, reqwest::Method::GET, server.url("/orders"), user)
        .send()
        .await
        .unwrap();
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let res = admin(&client, reqwest::Method::PUT, server.url(&format!("/admin/orders/{id}/status")))
        .json(&json!({ "status": "shipped", "tracking_number": " 1Z999 " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let shipped: Value = res.json().await.unwrap();
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["tracking_number"], "1Z999");
    assert!(shipped["shipped_at"].is_string());

    let res = admin(&client, reqwest::Method::GET, server.url("/admin/orders?status=shipped"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let filtered: Value = res.json().await.unwrap();
    assert_eq!(filtered.as_array().unwrap().len(), 1);

    let res = admin(&client, reqwest::Method::GET, server.url("/admin/orders/summary"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary: Value = res.json().await.unwrap();
    assert_eq!(summary["total_orders"], 1);
    assert_eq!(summary["revenue"], "108.00");
}

#[tokio::test]
async fn admin_routes_reject_customers() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = customer(&client, reqwest::Method::GET, server.url("/admin/orders"), UserId::new())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn invalid_transition_is_unprocessable() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = UserId::new();

    let created: Value = customer(&client, reqwest::Method::POST, server.url("/orders"), user)
        .json(&json!({
            "items": [{ "product_id": server.teapot, "quantity": 1 }],
            "shipping_address": address(),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    let path = format!("/admin/orders/{id}/status");

    let res = admin(&client, reqwest::Method::PUT, server.url(&path))
        .json(&json!({ "status": "delivered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = admin(&client, reqwest::Method::PUT, server.url(&path))
        .json(&json!({ "status": "pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn insufficient_stock_reports_the_product() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = customer(&client, reqwest::Method::POST, server.url("/orders"), UserId::new())
        .json(&json!({
            "items": [
                { "product_id": server.teapot, "quantity": 1 },
                { "product_id": server.kettle, "quantity": 2 },
            ],
            "shipping_address": address(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["product_name"], "Kettle");
    assert_eq!(body["requested"], 2);
    assert_eq!(body["available"], 1);
}

#[tokio::test]
async fn duplicate_payment_reference_conflicts() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({
        "items": [{ "product_id": server.teapot, "quantity": 1 }],
        "shipping_address": address(),
        "payment_reference": "pi_twice",
    });

    let first = customer(&client, reqwest::Method::POST, server.url("/orders"), UserId::new())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = customer(&client, reqwest::Method::POST, server.url("/orders"), UserId::new())
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let err: Value = second.json().await.unwrap();
    assert_eq!(err["error"], "duplicate_payment");
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = UserId::new();

    let res = customer(&client, reqwest::Method::POST, server.url("/orders"), user)
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = customer(&client, reqwest::Method::POST, server.url("/orders"), user)
        .json(&json!({ "items": [], "shipping_address": address() }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = customer(&client, reqwest::Method::POST, server.url("/orders/quote"), user)
        .json(&json!({
            "items": [{ "product_id": server.teapot, "quantity": i64::MAX }],
            "shipping_address": address(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_input");

    let res = customer(&client, reqwest::Method::GET, server.url("/orders/not-a-uuid"), user)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = admin(&client, reqwest::Method::GET, server.url("/admin/orders?limit=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = admin(&client, reqwest::Method::GET, server.url("/admin/orders?status=lost"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
