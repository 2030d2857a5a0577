// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{interval, Duration};
use uuid::Uuid;

use crate::{
    db::{bookingdb::BookingExt, paymentdb::PaymentExt},
    service::wallet_service::RefundDisposition,
    AppState,
};

const SWEEP_BATCH: i64 = 200;
const SWEEP_PARALLELISM: usize = 4;

/// Expires lapsed holds and quotes once a minute.
pub async fn start_hold_expiry_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(60));

    loop {
        interval.tick().await;

        let now = Utc::now();
        let mut ids: Vec<Uuid> = Vec::new();
        match app_state.db_client.expired_hold_ids(now, SWEEP_BATCH).await {
            Ok(found) => ids.extend(found),
            Err(e) => tracing::error!("Hold expiry scan failed: {}", e),
        }
        match app_state.db_client.expired_quote_ids(now, SWEEP_BATCH).await {
            Ok(found) => ids.extend(found),
            Err(e) => tracing::error!("Quote expiry scan failed: {}", e),
        }
        if ids.is_empty() {
            continue;
        }

        tracing::info!("Running hold expiry job for {} bookings", ids.len());
        let bookings = app_state.booking_service.clone();
        stream::iter(ids)
            .for_each_concurrent(Some(SWEEP_PARALLELISM), |booking_id| {
                let bookings = bookings.clone();
                async move {
                    match bookings.expire_if_due(booking_id).await {
                        Ok(true) => tracing::debug!(booking_id = %booking_id, "Expired"),
                        Ok(false) => {}
                        Err(e) => tracing::error!(booking_id = %booking_id, "Failed to expire booking: {}", e),
                    }
                }
            })
            .await;
    }
}

/// Marks in-progress bookings `time_expired` once they overrun the grace window.
pub async fn start_auto_completion_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(300));

    loop {
        interval.tick().await;

        let grace = match app_state.config_service.load().await {
            Ok(config) => config.buffer_grace(),
            Err(e) => {
                tracing::error!("Auto-completion job could not load config: {}", e);
                continue;
            }
        };

        let ids = match app_state
            .db_client
            .overdue_in_progress_ids(Utc::now() - grace, SWEEP_BATCH)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Auto-completion scan failed: {}", e);
                continue;
            }
        };

        let mut completed = 0;
        for booking_id in ids {
            match app_state.assignment_service.auto_complete(booking_id, grace).await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(booking_id = %booking_id, "Auto-completion failed: {}", e),
            }
        }
        if completed > 0 {
            tracing::info!("Auto-completion job completed {} bookings", completed);
        }
    }
}

/// Retries refunds parked as `refund_pending`.
pub async fn start_refund_reconciliation_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(900));

    loop {
        interval.tick().await;

        let max_attempts = match app_state.config_service.load().await {
            Ok(config) => config.refund_retry_limit,
            Err(e) => {
                tracing::error!("Refund reconciliation could not load config: {}", e);
                continue;
            }
        };

        let pending = match app_state
            .db_client
            .refund_pending_payments(max_attempts, SWEEP_BATCH)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("Refund reconciliation scan failed: {}", e);
                continue;
            }
        };
        if pending.is_empty() {
            continue;
        }

        tracing::info!("Running refund reconciliation for {} payments", pending.len());
        for payment in pending {
            match app_state.wallet_service.retry_pending_refund(payment.id).await {
                Ok(RefundDisposition::Credited { amount }) => {
                    tracing::info!(payment_id = %payment.id, amount, "Pending refund settled")
                }
                Ok(RefundDisposition::Deferred { .. }) => {
                    tracing::warn!(payment_id = %payment.id, attempts = payment.refund_attempts + 1, "Refund still pending")
                }
                Ok(RefundDisposition::Nothing) => {}
                Err(e) => tracing::error!(payment_id = %payment.id, "Refund retry failed: {}", e),
            }
        }
    }
}

/// Drops inactive location rows older than the retention window.
pub async fn start_location_purge_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(86400));

    loop {
        interval.tick().await;

        tracing::info!("Running location purge job at {}", Utc::now());
        match app_state.location_service.purge_stale().await {
            Ok(purged) => tracing::info!("Location purge job completed: {} rows removed", purged),
            Err(e) => tracing::error!("Location purge job failed: {}", e),
        }
    }
}

pub async fn start_subscription_sweep_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(86400));

    loop {
        interval.tick().await;

        tracing::info!("Running subscription sweep at {}", Utc::now());
        match app_state.subscription_service.sweep().await {
            Ok(report) => tracing::info!(
                "Subscription sweep completed: {} expired, {} warnings",
                report.expired,
                report.warnings
            ),
            Err(e) => tracing::error!("Subscription sweep failed: {}", e),
        }
    }
}
