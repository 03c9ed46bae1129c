mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{dec_field, PromotionSeed, TestApp};

/// Drives a freshly created order through Draft -> Completed and returns
/// its id.
async fn completed_order(app: &TestApp, daily_price: Decimal, promo: Option<&str>) -> String {
    let vehicle = app.seed_vehicle(daily_price).await;
    let (status, body) = app
        .post(
            "/api/v1/rental-orders",
            json!({
                "customer_id": Uuid::new_v4(),
                "vehicle_id": vehicle.id,
                "start_date": "2026-03-01T09:00:00Z",
                "end_date": "2026-03-04T09:00:00Z",
                "pickup_location": "Downtown branch",
                "return_location": "Downtown branch",
                "promotion_code": promo,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    for action in ["confirm", "start", "complete"] {
        let (status, body) = app
            .post(&format!("/api/v1/rental-orders/{}/{}", id, action), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK, "{} failed: {}", action, body);
    }
    id
}

async fn pay(app: &TestApp, invoice_id: &str, amount: Decimal) -> (StatusCode, Value) {
    app.post(
        "/api/v1/payments",
        json!({
            "invoice_id": invoice_id,
            "amount": amount,
            "payment_method": "bank_transfer",
            "transaction_code": "TXN-0001",
        }),
    )
    .await
}

#[tokio::test]
async fn invoice_taxes_the_discounted_subtotal_and_moves_order_to_invoiced() {
    let app = TestApp::new().await;
    app.seed_promotion(PromotionSeed::percent("TEN", dec!(10)))
        .await;
    let order_id = completed_order(&app, dec!(500000), Some("TEN")).await;

    let (status, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    let inv = &body["data"];
    assert_eq!(inv["status"], "Unpaid");
    assert_eq!(dec_field(inv, "sub_total"), dec!(1500000));
    assert_eq!(dec_field(inv, "discount_amount"), dec!(150000));
    assert_eq!(dec_field(inv, "tax_amount"), dec!(135000));
    assert_eq!(dec_field(inv, "total_amount"), dec!(1485000));
    assert_eq!(dec_field(inv, "remaining_amount"), dec!(1485000));
    assert!(inv["invoice_number"].as_str().unwrap().starts_with("INV-"));

    let lines = inv["details"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["quantity"], 3);
    assert_eq!(dec_field(&lines[0], "unit_price"), dec!(500000));
    assert_eq!(dec_field(&lines[0], "amount"), dec!(1500000));

    let (_, body) = app
        .get(&format!("/api/v1/rental-orders/{}", order_id))
        .await;
    assert_eq!(body["data"]["status"], "Invoiced");

    // A second invoice for the same rental is refused.
    let (status, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(
        body["code"] == "duplicate_invoice" || body["code"] == "invalid_transition",
        "body: {}",
        body
    );
}

#[tokio::test]
async fn invoicing_requires_a_completed_order() {
    let app = TestApp::new().await;
    let vehicle = app.seed_vehicle(dec!(500000)).await;
    let (_, body) = app
        .post(
            "/api/v1/rental-orders",
            json!({
                "customer_id": Uuid::new_v4(),
                "vehicle_id": vehicle.id,
                "start_date": "2026-03-01T09:00:00Z",
                "end_date": "2026-03-04T09:00:00Z",
                "pickup_location": "Downtown branch",
                "return_location": "Downtown branch",
            }),
        )
        .await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn partial_payments_settle_the_invoice() {
    let app = TestApp::new().await;
    app.seed_promotion(PromotionSeed::percent("TEN", dec!(10)))
        .await;
    let order_id = completed_order(&app, dec!(500000), Some("TEN")).await;
    let (_, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = pay(&app, &invoice_id, dec!(700000)).await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    assert!(body["data"]["payment_number"]
        .as_str()
        .unwrap()
        .starts_with("PAY-"));

    let (_, body) = app.get(&format!("/api/v1/invoices/{}", invoice_id)).await;
    assert_eq!(body["data"]["status"], "Partial");
    assert_eq!(dec_field(&body["data"], "paid_amount"), dec!(700000));
    assert_eq!(dec_field(&body["data"], "remaining_amount"), dec!(785000));

    let (status, _) = pay(&app, &invoice_id, dec!(785000)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get(&format!("/api/v1/invoices/{}", invoice_id)).await;
    assert_eq!(body["data"]["status"], "Paid");
    assert_eq!(dec_field(&body["data"], "remaining_amount"), Decimal::ZERO);

    // Settled invoices take no further payments.
    let (status, body) = pay(&app, &invoice_id, dec!(1)).await;
    assert_eq!(status, StatusCode::CONFLICT, "body: {}", body);

    let (status, body) = app
        .get(&format!("/api/v1/invoices/{}/payments", invoice_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn overpayment_and_non_positive_amounts_are_rejected() {
    let app = TestApp::new().await;
    let order_id = completed_order(&app, dec!(500000), None).await;
    let (_, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();
    let total = dec_field(&body["data"], "total_amount");

    let (status, body) = pay(&app, &invoice_id, total + dec!(0.01)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "overpayment_not_allowed");

    let (status, body) = pay(&app, &invoice_id, Decimal::ZERO).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    // Nothing stuck to the ledger.
    let (_, body) = app
        .get(&format!("/api/v1/invoices/{}/payments", invoice_id))
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invoice_can_be_edited_until_paid() {
    let app = TestApp::new().await;
    let order_id = completed_order(&app, dec!(500000), None).await;
    let (_, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id, "tax_rate": "10" }),
        )
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(dec_field(&body["data"], "total_amount"), dec!(1650000));

    let (status, body) = app
        .put(
            &format!("/api/v1/invoices/{}", invoice_id),
            json!({ "tax_rate": "0", "notes": "tax exempt contract" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(dec_field(&body["data"], "tax_amount"), Decimal::ZERO);
    assert_eq!(dec_field(&body["data"], "total_amount"), dec!(1500000));
    assert_eq!(body["data"]["notes"], "tax exempt contract");

    let (status, _) = pay(&app, &invoice_id, dec!(1500000)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .put(
            &format!("/api/v1/invoices/{}", invoice_id),
            json!({ "tax_rate": "5" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "body: {}", body);
}

#[tokio::test]
async fn overdue_is_a_batch_operation_and_still_accepts_payment() {
    let app = TestApp::new().await;
    let order_id = completed_order(&app, dec!(500000), None).await;
    let (_, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({
                "rental_order_id": order_id,
                "invoice_date": "2026-01-01T00:00:00Z",
                "due_date": "2026-01-08T00:00:00Z",
            }),
        )
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    // Reading the invoice does not flip it Overdue.
    let (_, body) = app.get(&format!("/api/v1/invoices/{}", invoice_id)).await;
    assert_eq!(body["data"]["status"], "Unpaid");

    let (status, body) = app.post("/api/v1/invoices/refresh-overdue", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["marked_overdue"], 1);

    let (_, body) = app.get(&format!("/api/v1/invoices/{}", invoice_id)).await;
    assert_eq!(body["data"]["status"], "Overdue");
    let total = dec_field(&body["data"], "total_amount");

    // A second run finds nothing new.
    let (_, body) = app.post("/api/v1/invoices/refresh-overdue", json!({})).await;
    assert_eq!(body["data"]["marked_overdue"], 0);

    let (status, _) = pay(&app, &invoice_id, total).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, body) = app.get(&format!("/api/v1/invoices/{}", invoice_id)).await;
    assert_eq!(body["data"]["status"], "Paid");
}

#[tokio::test]
async fn payments_are_fetchable_by_id() {
    let app = TestApp::new().await;
    let order_id = completed_order(&app, dec!(300000), None).await;
    let (_, body) = app
        .post(
            "/api/v1/invoices/from-rental",
            json!({ "rental_order_id": order_id }),
        )
        .await;
    let invoice_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = pay(&app, &invoice_id, dec!(100000)).await;
    let payment_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app.get(&format!("/api/v1/payments/{}", payment_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["invoice_id"].as_str().unwrap(), invoice_id);
    assert_eq!(body["data"]["payment_method"], "bank_transfer");
    assert_eq!(dec_field(&body["data"], "amount"), dec!(100000));

    let (status, body) = app
        .get(&format!("/api/v1/payments/{}", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = app
        .get(&format!("/api/v1/invoices/{}/payments", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
