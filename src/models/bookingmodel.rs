// models/bookingmodel.rs
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::paymentmodel::PaymentStatus;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "booking_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
    Regular,
    Inquiry,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    TemporaryHold,
    QuoteProvided,
    QuoteAccepted,
    Confirmed,
    Scheduled,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    Expired,
}

impl BookingStatus {
    pub fn to_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::TemporaryHold => "temporary_hold",
            BookingStatus::QuoteProvided => "quote_provided",
            BookingStatus::QuoteAccepted => "quote_accepted",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Assigned => "assigned",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Cancelled
                | BookingStatus::Rejected
                | BookingStatus::Expired
        )
    }

    /// States from which the booking owner may cancel. `InProgress` is admin only.
    pub fn is_customer_cancellable(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending
                | BookingStatus::TemporaryHold
                | BookingStatus::QuoteProvided
                | BookingStatus::QuoteAccepted
                | BookingStatus::Confirmed
                | BookingStatus::Scheduled
                | BookingStatus::Assigned
        )
    }

    pub fn is_assignable(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Scheduled)
    }

    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, to) {
            (_, Cancelled) => true,
            (Pending, QuoteProvided) | (Pending, Rejected) | (Pending, Expired) => true,
            (Pending, TemporaryHold) => true,
            (TemporaryHold, Confirmed) | (TemporaryHold, Expired) => true,
            (QuoteProvided, QuoteAccepted) | (QuoteProvided, Rejected) | (QuoteProvided, Expired) => true,
            (QuoteAccepted, Confirmed) => true,
            (Confirmed, Scheduled) | (Confirmed, Assigned) => true,
            (Scheduled, Assigned) => true,
            (Assigned, Scheduled) | (Assigned, InProgress) => true,
            (InProgress, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "completion_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompletionType {
    Manual,
    TimeExpired,
    AdminForced,
}

/// Structured service address stored as JSONB on the booking row.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BookingAddress {
    pub name: Option<String>,
    pub address: String,
    pub house_number: Option<String>,
    pub landmark: Option<String>,
    pub city: String,
    pub state: String,
    pub country: Option<String>,
    pub postal_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub booking_reference: String,
    pub user_id: Uuid,
    pub service_id: Uuid,
    pub time_slot_id: Option<Uuid>,
    pub booking_type: BookingType,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub actual_start_time: Option<DateTime<Utc>>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i32>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub address: Json<BookingAddress>,
    pub description: Option<String>,
    pub contact_person: String,
    pub contact_phone: String,
    pub special_instructions: Option<String>,
    pub quote_amount: Option<i64>,
    pub quote_notes: Option<String>,
    pub quote_provided_by: Option<Uuid>,
    pub quote_provided_at: Option<DateTime<Utc>>,
    pub quote_accepted_at: Option<DateTime<Utc>>,
    pub quote_expires_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completion_type: Option<CompletionType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_inquiry(&self) -> bool {
        self.booking_type == BookingType::Inquiry
    }

    pub fn quote_is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::QuoteProvided
            && self.quote_expires_at.map(|at| at < now).unwrap_or(false)
    }

    pub fn hold_is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::TemporaryHold)
            && self.hold_expires_at.map(|at| at < now).unwrap_or(false)
    }
}

/// Combines a scheduled date and wall-clock time into a UTC instant.
pub fn scheduled_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    date.and_time(time).and_utc()
}

/// `scheduled_time + service_duration + buffer_duration`.
pub fn compute_scheduled_end(
    scheduled_time: DateTime<Utc>,
    service_duration_minutes: i32,
    buffer_duration_minutes: i32,
) -> DateTime<Utc> {
    scheduled_time
        + Duration::minutes(service_duration_minutes as i64)
        + Duration::minutes(buffer_duration_minutes as i64)
}

/// Whole minutes between start and end, never negative.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    (end - start).num_minutes().max(0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    const ALL: [BookingStatus; 12] = [
        Pending, TemporaryHold, QuoteProvided, QuoteAccepted, Confirmed, Scheduled,
        Assigned, InProgress, Completed, Cancelled, Rejected, Expired,
    ];

    #[test]
    fn terminal_states_accept_no_writes() {
        for from in [Completed, Cancelled, Rejected, Expired] {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{:?} -> {:?} must be refused", from, to);
            }
        }
    }

    #[test]
    fn main_line_transitions() {
        assert!(Pending.can_transition_to(QuoteProvided));
        assert!(QuoteProvided.can_transition_to(QuoteAccepted));
        assert!(QuoteAccepted.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Assigned));
        assert!(Scheduled.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(TemporaryHold.can_transition_to(Confirmed));
        assert!(TemporaryHold.can_transition_to(Expired));
    }

    #[test]
    fn skipping_states_is_refused() {
        assert!(!Pending.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(InProgress));
        assert!(!Confirmed.can_transition_to(Completed));
        assert!(!QuoteAccepted.can_transition_to(Assigned));
        assert!(!InProgress.can_transition_to(Scheduled));
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for from in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(Cancelled));
        }
        assert!(!InProgress.is_customer_cancellable());
        assert!(Assigned.is_customer_cancellable());
    }

    #[test]
    fn scheduled_end_adds_duration_and_buffer() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let start = scheduled_instant(date, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let end = compute_scheduled_end(start, 60, 15);
        assert_eq!(end, scheduled_instant(date, NaiveTime::from_hms_opt(11, 15, 0).unwrap()));
    }

    #[test]
    fn actual_duration_in_minutes() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let start = scheduled_instant(date, NaiveTime::from_hms_opt(10, 5, 0).unwrap());
        let end = scheduled_instant(date, NaiveTime::from_hms_opt(11, 2, 0).unwrap());
        assert_eq!(duration_minutes(start, end), 57);
        assert_eq!(duration_minutes(end, start), 0);
    }
}
