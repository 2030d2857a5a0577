// service/fixtures.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::db::DBClient,
    models::{bookingmodel::BookingAddress, usermodel::{Principal, UserType}},
    service::{
        booking_service::{CreateBookingInput, PaymentChoice},
        payment_gateway::RazorpayService,
    },
};

pub const SERVICE_PRICE: i64 = 100_000;

pub fn config() -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: "fixture-secret".to_string(),
        jwt_maxage: 60,
        port: 0,
        db_max_connections: 5,
        log_level: "debug".to_string(),
        cors_origins: Vec::new(),
        redis_url: None,
        razorpay_key_id: "rzp_test_key".to_string(),
        razorpay_key_secret: "test_secret_key".to_string(),
        razorpay_webhook_secret: String::new(),
        // Nothing listens here; flows under test never reach the provider.
        razorpay_base_url: "http://127.0.0.1:9".to_string(),
    }
}

pub fn clients(pool: PgPool) -> (Arc<DBClient>, Arc<RazorpayService>) {
    (Arc::new(DBClient::new(pool)), Arc::new(RazorpayService::new(&config())))
}

pub async fn user(pool: &PgPool, user_type: UserType, balance: i64, limit: i64) -> Principal {
    let phone = format!("9{:09}", Uuid::new_v4().as_u128() % 1_000_000_000);
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (name, phone, user_type, wallet_balance, wallet_limit)
        VALUES ('Fixture', $1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(phone)
    .bind(user_type)
    .bind(balance)
    .bind(limit)
    .fetch_one(pool)
    .await
    .expect("insert user");

    if user_type == UserType::Worker {
        sqlx::query("INSERT INTO workers (user_id) VALUES ($1)")
            .bind(id)
            .execute(pool)
            .await
            .expect("insert worker");
    }
    Principal::new(id, user_type, Vec::new())
}

/// Fixed-price service open 09:00-18:00 in one-hour slots.
pub async fn fixed_service(pool: &PgPool, workers_per_slot: i32) -> Uuid {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO services (name, price_type, price, duration_minutes)
        VALUES ('Deep cleaning', 'fixed', $1, 60)
        RETURNING id
        "#,
    )
    .bind(SERVICE_PRICE)
    .fetch_one(pool)
    .await
    .expect("insert service");

    sqlx::query(
        r#"
        INSERT INTO service_configs
        (service_id, working_start_time, working_end_time, service_duration_minutes,
         buffer_duration_minutes, max_workers_per_slot, advance_booking_days)
        VALUES ($1, '09:00', '18:00', 60, 0, $2, 7)
        "#,
    )
    .bind(id)
    .bind(workers_per_slot)
    .execute(pool)
    .await
    .expect("insert service config");
    id
}

pub async fn inquiry_service(pool: &PgPool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO services (name, price_type) VALUES ('Kitchen remodel', 'inquiry') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .expect("insert inquiry service")
}

pub fn tomorrow() -> NaiveDate {
    (Utc::now() + Duration::days(1)).date_naive()
}

pub fn ten_am() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default()
}

pub fn address() -> BookingAddress {
    BookingAddress {
        address: "12 MG Road".to_string(),
        city: "Bengaluru".to_string(),
        state: "Karnataka".to_string(),
        postal_code: "560001".to_string(),
        ..Default::default()
    }
}

pub fn wallet_booking(service_id: Uuid) -> CreateBookingInput {
    CreateBookingInput {
        service_id,
        scheduled_date: tomorrow(),
        scheduled_time: ten_am(),
        address: address(),
        description: None,
        contact_person: "Asha".to_string(),
        contact_phone: "9876543210".to_string(),
        special_instructions: None,
        payment: PaymentChoice::Wallet,
    }
}

pub async fn wallet_balance(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT wallet_balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("wallet balance")
}

pub async fn slot_available(pool: &PgPool, slot_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT available_workers FROM time_slots WHERE id = $1")
        .bind(slot_id)
        .fetch_one(pool)
        .await
        .expect("slot capacity")
}
