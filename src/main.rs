mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{
    admin_config::AdminConfigService,
    assignment_service::AssignmentService,
    background_jobs,
    booking_service::BookingService,
    buffer_service::BufferService,
    location_service::LocationService,
    payment_gateway::RazorpayService,
    segment_service::SegmentService,
    subscription_service::SubscriptionService,
    timeslot_service::TimeSlotService,
    wallet_service::WalletService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub gateway: Arc<RazorpayService>,
    // Services
    pub booking_service: Arc<BookingService>,
    pub wallet_service: Arc<WalletService>,
    pub slot_service: Arc<TimeSlotService>,
    pub assignment_service: Arc<AssignmentService>,
    pub buffer_service: Arc<BufferService>,
    pub segment_service: Arc<SegmentService>,
    pub location_service: Arc<LocationService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub config_service: AdminConfigService,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);
        let gateway = Arc::new(RazorpayService::new(&config));

        let booking_service = BookingService::new(db_client.clone(), gateway.clone());
        let segment_service = SegmentService::new(db_client.clone(), booking_service.clone());

        Self {
            env: config,
            booking_service: Arc::new(booking_service),
            segment_service: Arc::new(segment_service),
            wallet_service: Arc::new(WalletService::new(db_client.clone(), gateway.clone())),
            slot_service: Arc::new(TimeSlotService::new(db_client.clone())),
            assignment_service: Arc::new(AssignmentService::new(db_client.clone())),
            buffer_service: Arc::new(BufferService::new(db_client.clone())),
            location_service: Arc::new(LocationService::new(db_client.clone())),
            subscription_service: Arc::new(SubscriptionService::new(db_client.clone(), gateway.clone())),
            config_service: AdminConfigService::new(db_client.clone()),
            gateway,
            db_client,
        }
    }
}

fn spawn_background_jobs(app_state: &Arc<AppState>) {
    tokio::spawn(background_jobs::start_hold_expiry_job(app_state.clone()));
    tokio::spawn(background_jobs::start_auto_completion_job(app_state.clone()));
    tokio::spawn(background_jobs::start_refund_reconciliation_job(app_state.clone()));
    tokio::spawn(background_jobs::start_location_purge_job(app_state.clone()));
    tokio::spawn(background_jobs::start_subscription_sweep_job(app_state.clone()));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::DEBUG))
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;
    tracing::info!(max_connections = config.db_max_connections, "Connection to the database is successful");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let db_client = match &config.redis_url {
        Some(redis_url) => DBClient::with_redis(pool, redis_url).await,
        None => {
            tracing::info!("Redis not configured, running without cache (set REDIS_URL to enable)");
            DBClient::new(pool)
        }
    };

    let allowed_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));
    spawn_background_jobs(&app_state);

    let app = create_router(app_state.clone()).layer(ServiceBuilder::new().layer(cors));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    tracing::info!(
        port = config.port,
        cache = app_state.db_client.cache_status(),
        "Server is running"
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
