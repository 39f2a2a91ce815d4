//! Point-of-sale checkout through the HTTP surface.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{basket, body_json, line, send_json, TestContext};
use http_body_util::BodyExt;
use retail_service::models::{Sale, TenderMethod};
use retail_service::services::Store;
use serde_json::json;
use tower::ServiceExt;

async fn post_checkout(ctx: &TestContext, body: serde_json::Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/checkout")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = ctx.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_checkout_decrements_stock_and_records_sale() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let mug = ctx.seed_variant(&tenant, "Mug", 10, 0).await;
    let bowl = ctx.seed_variant(&tenant, "Bowl", 5, 0).await;

    let request = basket(
        "till-1-0001",
        &tenant,
        vec![line(&mug, 2, 500), line(&bowl, 1, 300)],
        vec![(TenderMethod::Cash, 1300)],
    );
    let (status, bytes) = post_checkout(&ctx, json!(request)).await;

    assert_eq!(status, StatusCode::CREATED);
    let sale: Sale = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(sale.total_cents, 1300);
    assert_eq!(sale.subtotal_cents, 1300);
    assert_eq!(sale.items.len(), 2);
    assert_eq!(sale.items[0].product_name, "Mug");
    assert_eq!(sale.payments[0].method, "CASH");
    assert_eq!(sale.payments[0].status, "CAPTURED");
    assert!(sale.is_balanced());

    assert_eq!(ctx.stock(mug.variant_id).await, 8);
    assert_eq!(ctx.stock(bowl.variant_id).await, 4);
    assert_eq!(ctx.store.inventory_log_count().await, 2);

    let logs = ctx.store.list_inventory_logs(mug.variant_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].change_type, "SALE");
    assert_eq!(logs[0].previous_value, 10);
    assert_eq!(logs[0].new_value, 8);
    assert_eq!(logs[0].actor_user_id, tenant.user_id);
}

#[tokio::test]
async fn test_sale_balances_with_discount_and_tax() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Harbor Goods").await;
    let lamp = ctx.seed_variant(&tenant, "Lamp", 4, 0).await;

    let mut item = line(&lamp, 3, 1000);
    item.discount_cents = 100;
    item.tax_cents = 50;
    // 3000 - 300 + 150
    let request = basket(
        "till-2-0001",
        &tenant,
        vec![item],
        vec![(TenderMethod::Card, 2000), (TenderMethod::Cash, 850)],
    );
    let (status, bytes) = post_checkout(&ctx, json!(request)).await;

    assert_eq!(status, StatusCode::CREATED);
    let sale: Sale = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(sale.subtotal_cents, 3000);
    assert_eq!(sale.discount_cents, 300);
    assert_eq!(sale.tax_cents, 150);
    assert_eq!(sale.total_cents, 2850);
    assert_eq!(sale.items[0].line_total_cents, 2850);
    assert_eq!(sale.payments.len(), 2);
    assert!(sale.is_balanced());
}

#[tokio::test]
async fn test_concurrent_checkouts_for_last_unit() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let vase = ctx.seed_variant(&tenant, "Vase", 1, 0).await;

    let first = basket(
        "till-1-race",
        &tenant,
        vec![line(&vase, 1, 500)],
        vec![(TenderMethod::Cash, 500)],
    );
    let second = basket(
        "till-2-race",
        &tenant,
        vec![line(&vase, 1, 500)],
        vec![(TenderMethod::Card, 500)],
    );

    let ((a, _), (b, _)) = tokio::join!(
        post_checkout(&ctx, json!(first)),
        post_checkout(&ctx, json!(second))
    );

    let mut statuses = vec![a, b];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(ctx.stock(vase.variant_id).await, 0);
    assert_eq!(ctx.store.sale_count().await, 1);
}

#[tokio::test]
async fn test_many_concurrent_checkouts_never_oversell() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let candle = ctx.seed_variant(&tenant, "Candle", 5, 0).await;

    let requests: Vec<_> = (0..12)
        .map(|i| {
            basket(
                &format!("till-{}-burst", i),
                &tenant,
                vec![line(&candle, 1, 250)],
                vec![(TenderMethod::Cash, 250)],
            )
        })
        .collect();

    let results =
        futures::future::join_all(requests.into_iter().map(|r| post_checkout(&ctx, json!(r))))
            .await;

    let created = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::CREATED)
        .count();
    let conflicts = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::CONFLICT)
        .count();

    assert_eq!(created, 5);
    assert_eq!(conflicts, 7);
    assert_eq!(ctx.stock(candle.variant_id).await, 0);
    assert_eq!(ctx.store.sale_count().await, 5);
}

#[tokio::test]
async fn test_replay_returns_original_sale() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let mug = ctx.seed_variant(&tenant, "Mug", 10, 0).await;

    let request = basket(
        "till-1-replay",
        &tenant,
        vec![line(&mug, 3, 500)],
        vec![(TenderMethod::Cash, 1500)],
    );

    let (first_status, first_body) = post_checkout(&ctx, json!(request)).await;
    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(ctx.stock(mug.variant_id).await, 7);

    let (second_status, second_body) = post_checkout(&ctx, json!(request)).await;
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first_body, second_body);

    assert_eq!(ctx.stock(mug.variant_id).await, 7);
    assert_eq!(ctx.store.sale_count().await, 1);
    assert_eq!(ctx.store.inventory_log_count().await, 1);
}

#[tokio::test]
async fn test_failed_line_rolls_back_whole_basket() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let plenty = ctx.seed_variant(&tenant, "Plate", 10, 0).await;
    let scarce = ctx.seed_variant(&tenant, "Teapot", 1, 0).await;

    let request = basket(
        "till-1-partial",
        &tenant,
        vec![line(&plenty, 2, 400), line(&scarce, 2, 900)],
        vec![(TenderMethod::Card, 2600)],
    );
    let (status, bytes) = post_checkout(&ctx, json!(request)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient stock"));

    assert_eq!(ctx.stock(plenty.variant_id).await, 10);
    assert_eq!(ctx.stock(scarce.variant_id).await, 1);
    assert_eq!(ctx.store.sale_count().await, 0);
    assert_eq!(ctx.store.inventory_log_count().await, 0);
}

#[tokio::test]
async fn test_retry_after_conflict_with_same_key_can_succeed() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let scarce = ctx.seed_variant(&tenant, "Teapot", 1, 0).await;

    let greedy = basket(
        "till-1-retry",
        &tenant,
        vec![line(&scarce, 2, 900)],
        vec![(TenderMethod::Card, 1800)],
    );
    let (status, _) = post_checkout(&ctx, json!(greedy)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let corrected = basket(
        "till-1-retry",
        &tenant,
        vec![line(&scarce, 1, 900)],
        vec![(TenderMethod::Card, 900)],
    );
    let (status, _) = post_checkout(&ctx, json!(corrected)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ctx.stock(scarce.variant_id).await, 0);
}

#[tokio::test]
async fn test_get_sale_is_tenant_scoped() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let other = ctx.seed_tenant("Harbor Goods").await;
    let mug = ctx.seed_variant(&tenant, "Mug", 10, 0).await;

    let request = basket(
        "till-1-lookup",
        &tenant,
        vec![line(&mug, 1, 500)],
        vec![(TenderMethod::Cash, 500)],
    );
    let (_, bytes) = post_checkout(&ctx, json!(request)).await;
    let sale: Sale = serde_json::from_slice(&bytes).unwrap();

    let router = ctx.router();
    let own = send_json(
        &router,
        Method::GET,
        &format!("/sales/{}?tenant_id={}", sale.sale_id, tenant.tenant_id),
        None,
    )
    .await;
    assert_eq!(own.status(), StatusCode::OK);
    let fetched = body_json(own).await;
    assert_eq!(fetched["sale_id"], json!(sale.sale_id));
    assert_eq!(fetched["items"].as_array().unwrap().len(), 1);

    let foreign = send_json(
        &router,
        Method::GET,
        &format!("/sales/{}?tenant_id={}", sale.sale_id, other.tenant_id),
        None,
    )
    .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_low_stock_alert_is_emailed_after_commit() {
    let ctx = TestContext::new("2024-02-10").await;
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let mug = ctx.seed_variant(&tenant, "Mug", 3, 2).await;
    let bowl = ctx.seed_variant(&tenant, "Bowl", 2, 0).await;

    let request = basket(
        "till-1-alert",
        &tenant,
        vec![line(&mug, 2, 500), line(&bowl, 2, 300)],
        vec![(TenderMethod::Cash, 1600)],
    );
    let (status, _) = post_checkout(&ctx, json!(request)).await;
    assert_eq!(status, StatusCode::CREATED);

    ctx.drain_alerts().await;

    let mut subjects: Vec<String> = ctx
        .notifier
        .sent_messages()
        .into_iter()
        .map(|m| {
            assert_eq!(m.to, tenant.contact_email);
            m.subject
        })
        .collect();
    subjects.sort();
    assert_eq!(
        subjects,
        vec![
            "Low stock: Mug (Standard)".to_string(),
            "Out of stock: Bowl (Standard)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_alert_delivery_failure_does_not_fail_checkout() {
    let ctx = TestContext::new("2024-02-10").await;
    ctx.notifier.set_failing(true);
    let tenant = ctx.seed_tenant("Corner Ceramics").await;
    let mug = ctx.seed_variant(&tenant, "Mug", 1, 0).await;

    let request = basket(
        "till-1-quiet",
        &tenant,
        vec![line(&mug, 1, 500)],
        vec![(TenderMethod::Cash, 500)],
    );
    let (status, _) = post_checkout(&ctx, json!(request)).await;
    ctx.drain_alerts().await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ctx.stock(mug.variant_id).await, 0);
    assert_eq!(ctx.notifier.sent_count(), 0);
}
