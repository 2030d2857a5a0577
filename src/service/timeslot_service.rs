// service/timeslot_service.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use uuid::Uuid;

use crate::{
    db::{
        db::{DBClient, PgTx},
        servicedb::ServiceCatalogExt,
        timeslotdb::TimeSlotExt,
    },
    models::{servicemodel::ServiceConfig, timeslotmodel::TimeSlot},
    service::error::ServiceError,
};

fn minutes_from_midnight(t: NaiveTime) -> i64 {
    (t.num_seconds_from_midnight() / 60) as i64
}

fn time_at(minutes: i64) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

/// Daily windows for a service: back to back from the working start, each
/// `duration + buffer` long, none running past the working end.
pub fn generate_slot_windows(config: &ServiceConfig) -> Vec<(NaiveTime, NaiveTime)> {
    let step = (config.service_duration_minutes + config.buffer_duration_minutes) as i64;
    if config.service_duration_minutes <= 0 || step <= 0 {
        return Vec::new();
    }

    let day_end = minutes_from_midnight(config.working_end_time);
    let mut start = minutes_from_midnight(config.working_start_time);
    let mut windows = Vec::new();

    while start + step <= day_end {
        match (time_at(start), time_at(start + step)) {
            (Some(s), Some(e)) => windows.push((s, e)),
            _ => break,
        }
        start += step;
    }

    windows
}

/// `date` must fall in `[today, today + advance_booking_days]`.
pub fn check_booking_window(
    date: NaiveDate,
    today: NaiveDate,
    advance_booking_days: i32,
) -> Result<(), ServiceError> {
    if date < today {
        return Err(ServiceError::InvalidInput("Cannot book a date in the past".to_string()));
    }
    if date > today + Duration::days(advance_booking_days.max(0) as i64) {
        return Err(ServiceError::InvalidInput(format!(
            "Bookings open at most {} days in advance",
            advance_booking_days
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TimeSlotService {
    db_client: Arc<DBClient>,
}

impl TimeSlotService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    async fn active_config(&self, service_id: Uuid) -> Result<ServiceConfig, ServiceError> {
        self.db_client
            .get_service_config(service_id)
            .await?
            .ok_or_else(|| ServiceError::InvalidInput("Service has no booking configuration".to_string()))
    }

    /// Materialises the day's slots on first touch.
    pub async fn ensure_day(&self, service_id: Uuid, date: NaiveDate, today: NaiveDate) -> Result<ServiceConfig, ServiceError> {
        let config = self.active_config(service_id).await?;
        check_booking_window(date, today, config.advance_booking_days)?;

        let windows = generate_slot_windows(&config);
        let inserted = self
            .db_client
            .materialize_slots(
                service_id,
                date,
                &windows,
                config.max_workers_per_slot,
                config.service_duration_minutes,
                config.buffer_duration_minutes,
            )
            .await?;

        if inserted > 0 {
            tracing::debug!(service_id = %service_id, %date, inserted, "Materialised time slots");
        }
        Ok(config)
    }

    pub async fn list_available(
        &self,
        service_id: Uuid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ServiceError> {
        self.ensure_day(service_id, date, today).await?;
        let slots = self.db_client.list_slots(service_id, date).await?;
        Ok(slots.into_iter().filter(|s| s.has_capacity()).collect())
    }

    /// Locks the slot starting at `start_time` and takes one unit of capacity.
    pub async fn reserve_at_tx(
        &self,
        tx: &mut PgTx<'_>,
        service_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<TimeSlot, ServiceError> {
        let slot = self
            .db_client
            .find_slot_tx(tx, service_id, date, start_time)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidInput("Requested time does not match an available slot".to_string())
            })?;

        self.reserve_tx(tx, slot.id).await
    }

    pub async fn reserve_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<TimeSlot, ServiceError> {
        let slot = self
            .db_client
            .lock_slot_tx(tx, slot_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Time slot"))?;

        if !slot.has_capacity() {
            tracing::info!(slot_id = %slot.id, "Slot reservation refused: no capacity");
            return Err(ServiceError::NoCapacity);
        }

        let reserved = self
            .db_client
            .reserve_slot_tx(tx, slot_id)
            .await?
            .ok_or(ServiceError::NoCapacity)?;

        tracing::debug!(slot_id = %slot_id, available = reserved.available_workers, "Slot reserved");
        Ok(reserved)
    }

    /// Returns one unit of capacity; a slot already at `total_workers` is left as is.
    pub async fn release_tx(&self, tx: &mut PgTx<'_>, slot_id: Uuid) -> Result<(), ServiceError> {
        match self.db_client.release_slot_tx(tx, slot_id).await? {
            Some(slot) => {
                tracing::debug!(slot_id = %slot_id, available = slot.available_workers, "Slot released");
            }
            None => {
                tracing::warn!(slot_id = %slot_id, "Slot release skipped: already at full capacity");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(start: (u32, u32), end: (u32, u32), duration: i32, buffer: i32) -> ServiceConfig {
        ServiceConfig {
            id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            working_start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            working_end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            service_duration_minutes: duration,
            buffer_duration_minutes: buffer,
            max_workers_per_slot: 2,
            advance_booking_days: 7,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn windows_step_by_duration_plus_buffer() {
        let windows = generate_slot_windows(&config((9, 0), (12, 0), 60, 15));
        assert_eq!(
            windows,
            vec![(t(9, 0), t(10, 15)), (t(10, 15), t(11, 30))]
        );
    }

    #[test]
    fn window_may_end_exactly_at_close() {
        let windows = generate_slot_windows(&config((10, 0), (11, 15), 60, 15));
        assert_eq!(windows, vec![(t(10, 0), t(11, 15))]);
    }

    #[test]
    fn degenerate_configs_produce_nothing() {
        assert!(generate_slot_windows(&config((10, 0), (10, 30), 60, 0)).is_empty());
        assert!(generate_slot_windows(&config((10, 0), (18, 0), 0, 0)).is_empty());
        assert!(generate_slot_windows(&config((18, 0), (10, 0), 60, 0)).is_empty());
    }

    #[test]
    fn booking_window_bounds() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(check_booking_window(today, today, 7).is_ok());
        assert!(check_booking_window(today + Duration::days(7), today, 7).is_ok());
        assert!(check_booking_window(today + Duration::days(8), today, 7).is_err());
        assert!(check_booking_window(today - Duration::days(1), today, 7).is_err());
    }
}
