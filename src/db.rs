use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tracing::info;

use crate::config::AppConfig;

pub type DbPool = DatabaseConnection;

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(cfg.database_url.clone());
    opts.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("database connection established");
    Ok(db)
}

/// Creates the schema if it does not exist. Idempotent; used at startup
/// when `auto_migrate` is set and by the test harness.
pub async fn run_migrations(db: &DbPool) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    for ddl in SCHEMA_DDL {
        db.execute(Statement::from_string(backend, ddl.to_string()))
            .await?;
    }
    info!("schema migrations applied");
    Ok(())
}

// Monetary columns are REAL: SQLite gives NUMERIC-affinity columns
// INTEGER storage for integral values, which the Decimal codec rejects.
const SCHEMA_DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS vehicles (
        id TEXT PRIMARY KEY,
        license_plate TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        daily_rental_price REAL NOT NULL,
        status TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS vehicle_history (
        id TEXT PRIMARY KEY,
        vehicle_id TEXT NOT NULL,
        rental_order_id TEXT NOT NULL,
        customer_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT NOT NULL,
        notes TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS rental_orders (
        id TEXT PRIMARY KEY,
        order_number TEXT NOT NULL UNIQUE,
        customer_id TEXT NOT NULL,
        vehicle_id TEXT NOT NULL,
        employee_id TEXT,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        actual_start_date TEXT,
        actual_end_date TEXT,
        pickup_location TEXT NOT NULL,
        return_location TEXT NOT NULL,
        daily_rental_price REAL NOT NULL,
        total_days INTEGER NOT NULL,
        sub_total REAL NOT NULL,
        discount_amount REAL NOT NULL,
        promotion_code TEXT,
        total_amount REAL NOT NULL,
        deposit_amount REAL NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT,
        version INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS rental_status_history (
        id TEXT PRIMARY KEY,
        rental_order_id TEXT NOT NULL,
        old_status TEXT,
        new_status TEXT NOT NULL,
        changed_at TEXT NOT NULL,
        changed_by TEXT,
        notes TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS promotions (
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        description TEXT,
        promotion_type TEXT NOT NULL,
        value REAL NOT NULL,
        min_amount REAL,
        max_discount REAL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        usage_limit INTEGER,
        usage_count INTEGER NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS invoices (
        id TEXT PRIMARY KEY,
        invoice_number TEXT NOT NULL UNIQUE,
        rental_order_id TEXT NOT NULL UNIQUE,
        customer_id TEXT NOT NULL,
        invoice_date TEXT NOT NULL,
        due_date TEXT NOT NULL,
        sub_total REAL NOT NULL,
        tax_rate REAL NOT NULL,
        tax_amount REAL NOT NULL,
        discount_amount REAL NOT NULL,
        total_amount REAL NOT NULL,
        paid_amount REAL NOT NULL DEFAULT 0,
        remaining_amount REAL NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS invoice_details (
        id TEXT PRIMARY KEY,
        invoice_id TEXT NOT NULL,
        description TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL,
        amount REAL NOT NULL,
        sort_order INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payments (
        id TEXT PRIMARY KEY,
        payment_number TEXT NOT NULL UNIQUE,
        invoice_id TEXT NOT NULL,
        payment_date TEXT NOT NULL,
        amount REAL NOT NULL,
        payment_method TEXT NOT NULL,
        bank_account TEXT,
        transaction_code TEXT,
        notes TEXT,
        created_at TEXT NOT NULL
    )"#,
];
