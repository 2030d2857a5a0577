// service/admin_config.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use crate::{
    db::{configdb::AdminConfigExt, db::DBClient},
    service::error::ServiceError,
    utils::currency::rupees_to_paise,
};

/// Business knobs read from `admin_configs`. Money in paise.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingConfig {
    pub default_wallet_limit: i64,
    pub min_recharge_amount: i64,
    pub max_recharge_amount: i64,
    pub booking_hold_time_minutes: i64,
    pub quote_default_expiry_days: i64,
    pub inquiry_booking_fee: i64,
    pub buffer_grace_minutes: i64,
    pub post_start_refund_percentage: i64,
    pub refund_retry_limit: i32,
    pub provider_retry_attempts: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            default_wallet_limit: rupees_to_paise(100_000.0),
            min_recharge_amount: rupees_to_paise(100.0),
            max_recharge_amount: rupees_to_paise(50_000.0),
            booking_hold_time_minutes: 15,
            quote_default_expiry_days: 7,
            inquiry_booking_fee: 0,
            buffer_grace_minutes: 15,
            post_start_refund_percentage: 0,
            refund_retry_limit: 5,
            provider_retry_attempts: 3,
        }
    }
}

impl BookingConfig {
    /// Builds a config from raw key/value rows. Missing or malformed values keep their defaults.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values: HashMap<String, String> = pairs.into_iter().collect();
        let defaults = BookingConfig::default();

        let rupees = |key: &str, fallback: i64| -> i64 {
            values
                .get(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(rupees_to_paise)
                .unwrap_or(fallback)
        };
        let int = |key: &str, fallback: i64| -> i64 {
            values
                .get(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|v| *v >= 0)
                .unwrap_or(fallback)
        };

        Self {
            default_wallet_limit: rupees("default_wallet_limit", defaults.default_wallet_limit),
            min_recharge_amount: rupees("min_recharge_amount", defaults.min_recharge_amount),
            max_recharge_amount: rupees("max_recharge_amount", defaults.max_recharge_amount),
            booking_hold_time_minutes: int("booking_hold_time_minutes", defaults.booking_hold_time_minutes).max(1),
            quote_default_expiry_days: int("quote_default_expiry_days", defaults.quote_default_expiry_days).max(1),
            inquiry_booking_fee: rupees("inquiry_booking_fee", defaults.inquiry_booking_fee),
            buffer_grace_minutes: int("buffer_grace_minutes", defaults.buffer_grace_minutes),
            post_start_refund_percentage: int(
                "post_start_refund_percentage",
                defaults.post_start_refund_percentage,
            )
            .min(100),
            refund_retry_limit: int("refund_retry_limit", defaults.refund_retry_limit as i64) as i32,
            provider_retry_attempts: int("provider_retry_attempts", defaults.provider_retry_attempts as i64)
                .clamp(1, 10) as u32,
        }
    }

    pub fn hold_ttl(&self) -> Duration {
        Duration::minutes(self.booking_hold_time_minutes)
    }

    pub fn buffer_grace(&self) -> Duration {
        Duration::minutes(self.buffer_grace_minutes)
    }

    pub fn quote_ttl(&self, expires_in_days: Option<i64>) -> Duration {
        Duration::days(expires_in_days.unwrap_or(self.quote_default_expiry_days))
    }
}

#[derive(Debug, Clone)]
pub struct AdminConfigService {
    db_client: Arc<DBClient>,
}

impl AdminConfigService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Reads the table on every call so admin edits apply without a restart.
    pub async fn load(&self) -> Result<BookingConfig, ServiceError> {
        let pairs = self.db_client.get_admin_configs().await?;
        Ok(BookingConfig::from_pairs(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn empty_table_yields_defaults() {
        let config = BookingConfig::from_pairs(Vec::new());
        assert_eq!(config, BookingConfig::default());
        assert_eq!(config.hold_ttl(), Duration::minutes(15));
        assert_eq!(config.quote_ttl(None), Duration::days(7));
        assert_eq!(config.buffer_grace(), Duration::minutes(15));
    }

    #[test]
    fn rupee_values_are_stored_in_paise() {
        let config = BookingConfig::from_pairs(vec![
            pair("inquiry_booking_fee", "100"),
            pair("min_recharge_amount", "250.50"),
        ]);
        assert_eq!(config.inquiry_booking_fee, 10_000);
        assert_eq!(config.min_recharge_amount, 25_050);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = BookingConfig::from_pairs(vec![
            pair("booking_hold_time_minutes", "soon"),
            pair("max_recharge_amount", "-4"),
            pair("post_start_refund_percentage", "250"),
        ]);
        assert_eq!(config.booking_hold_time_minutes, 15);
        assert_eq!(config.max_recharge_amount, rupees_to_paise(50_000.0));
        assert_eq!(config.post_start_refund_percentage, 100);
    }

    #[test]
    fn explicit_quote_expiry_wins() {
        let config = BookingConfig::default();
        assert_eq!(config.quote_ttl(Some(3)), Duration::days(3));
    }
}
