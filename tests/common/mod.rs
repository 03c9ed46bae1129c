use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use rental_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{promotion, vehicle},
    events::{self, EventSender},
    handlers::AppServices,
    AppState,
};

/// Test harness over an in-memory SQLite database. A single-connection
/// pool keeps the in-memory database alive for the harness lifetime.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".to_string(),
            port: 18_080,
            env: "test".to_string(),
            log_level: Some("warn".to_string()),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            cors_allowed_origins: None,
            default_tax_rate: 10,
            invoice_due_days: 7,
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Some(Arc::new(event_sender.clone())), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response was not JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    pub async fn seed_vehicle(&self, daily_price: Decimal) -> vehicle::Model {
        vehicle::ActiveModel {
            id: Set(Uuid::new_v4()),
            license_plate: Set(format!("TEST-{}", &Uuid::new_v4().to_string()[..8])),
            display_name: Set("Test Sedan".to_string()),
            daily_rental_price: Set(daily_price),
            status: Set(vehicle::VehicleStatus::Available.to_string()),
            version: Set(0),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("failed to seed vehicle")
    }

    pub async fn seed_promotion(&self, seed: PromotionSeed) -> promotion::Model {
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code.to_string()),
            description: Set(None),
            promotion_type: Set(seed.promotion_type),
            value: Set(seed.value),
            min_amount: Set(seed.min_amount),
            max_discount: Set(seed.max_discount),
            start_date: Set(now - Duration::days(30)),
            end_date: Set(now + Duration::days(30)),
            usage_limit: Set(seed.usage_limit),
            usage_count: Set(0),
            is_active: Set(seed.is_active),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("failed to seed promotion")
    }
}

pub struct PromotionSeed {
    pub code: &'static str,
    pub promotion_type: promotion::PromotionType,
    pub value: Decimal,
    pub min_amount: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub is_active: bool,
}

impl PromotionSeed {
    pub fn percent(code: &'static str, value: Decimal) -> Self {
        Self {
            code,
            promotion_type: promotion::PromotionType::Percentage,
            value,
            min_amount: None,
            max_discount: None,
            usage_limit: None,
            is_active: true,
        }
    }
}

/// Monetary fields serialize as strings; parse them for exact comparison.
pub fn dec_field(value: &Value, key: &str) -> Decimal {
    let field = &value[key];
    let raw = field
        .as_str()
        .map(str::to_owned)
        .unwrap_or_else(|| field.to_string());
    Decimal::from_str(&raw).unwrap_or_else(|_| panic!("field {} was not a decimal: {}", key, field))
}
