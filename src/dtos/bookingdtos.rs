// dtos/bookingdtos.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{payment_choice, PaymentMethodDto, PaymentProofDto};
use crate::{
    error::HttpError,
    models::{
        assignmentmodel::{BufferRequest, WorkerAssignment},
        bookingmodel::{Booking, BookingAddress, BookingStatus, BookingType, CompletionType},
        paymentmodel::{Payment, PaymentMethod, PaymentSegment, PaymentStatus, PaymentType, SegmentStatus},
        timeslotmodel::TimeSlot,
    },
    service::{
        booking_service::{
            BookingDetail, BookingOutcome, CreateBookingInput, CreateInquiryInput, PaymentChoice, ScheduleInput,
        },
        payment_gateway::ProviderOrder,
        location_service::check_coordinates,
        segment_service::{SegmentInput, SegmentProgress},
    },
    utils::currency::{paise_to_rupees, positive_rupees_to_paise},
};

pub fn amount_to_paise(amount: f64) -> Result<i64, HttpError> {
    positive_rupees_to_paise(amount).map_err(HttpError::bad_request)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, HttpError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HttpError::bad_request("Dates must use the YYYY-MM-DD format"))
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, HttpError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| HttpError::bad_request("Times must use the HH:MM format"))
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct AddressDto {
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Address is required"))]
    pub address: String,
    #[validate(length(max = 50))]
    pub house_number: Option<String>,
    #[validate(length(max = 255))]
    pub landmark: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(max = 100))]
    pub country: Option<String>,
    #[validate(length(min = 3, max = 12, message = "Postal code must be between 3-12 characters"))]
    pub postal_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl AddressDto {
    pub fn into_address(self) -> Result<BookingAddress, HttpError> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => check_coordinates(lat, lng, None)?,
            (None, None) => {}
            _ => return Err(HttpError::bad_request("latitude and longitude must be sent together")),
        }
        Ok(BookingAddress {
            name: self.name,
            address: self.address.trim().to_string(),
            house_number: self.house_number,
            landmark: self.landmark,
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            country: self.country,
            postal_code: self.postal_code.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingDto {
    pub service_id: Uuid,
    #[validate(length(min = 10, max = 10, message = "scheduled_date must be YYYY-MM-DD"))]
    pub scheduled_date: String,
    #[validate(length(min = 5, max = 5, message = "scheduled_time must be HH:MM"))]
    pub scheduled_time: String,
    #[validate]
    pub address: AddressDto,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Contact person is required"))]
    pub contact_person: String,
    #[validate(length(min = 10, max = 15, message = "Contact phone must be between 10-15 characters"))]
    pub contact_phone: String,
    #[validate(length(max = 1000))]
    pub special_instructions: Option<String>,
    pub payment_method: PaymentMethodDto,
    #[serde(flatten)]
    #[validate]
    pub proof: PaymentProofDto,
}

impl CreateBookingDto {
    pub fn into_input(self) -> Result<CreateBookingInput, HttpError> {
        Ok(CreateBookingInput {
            service_id: self.service_id,
            scheduled_date: parse_date(&self.scheduled_date)?,
            scheduled_time: parse_time(&self.scheduled_time)?,
            payment: payment_choice(self.payment_method, self.proof)?,
            address: self.address.into_address()?,
            description: self.description,
            contact_person: self.contact_person.trim().to_string(),
            contact_phone: self.contact_phone.trim().to_string(),
            special_instructions: self.special_instructions,
        })
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateInquiryDto {
    pub service_id: Uuid,
    #[validate]
    pub address: AddressDto,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Contact person is required"))]
    pub contact_person: String,
    #[validate(length(min = 10, max = 15, message = "Contact phone must be between 10-15 characters"))]
    pub contact_phone: String,
    #[validate(length(max = 1000))]
    pub special_instructions: Option<String>,
    pub payment_method: PaymentMethodDto,
    #[serde(flatten)]
    #[validate]
    pub proof: PaymentProofDto,
}

impl CreateInquiryDto {
    pub fn into_input(self) -> Result<CreateInquiryInput, HttpError> {
        Ok(CreateInquiryInput {
            service_id: self.service_id,
            payment: payment_choice(self.payment_method, self.proof)?,
            address: self.address.into_address()?,
            description: self.description,
            contact_person: self.contact_person.trim().to_string(),
            contact_phone: self.contact_phone.trim().to_string(),
            special_instructions: self.special_instructions,
        })
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentDto {
    #[validate(length(min = 1, message = "razorpay_order_id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpay_payment_id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpay_signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ReasonDto {
    #[validate(length(min = 1, max = 500, message = "Reason is required"))]
    pub reason: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ProvideQuoteDto {
    #[validate(range(min = 0.01, message = "Quote amount must be positive"))]
    pub amount: f64,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(range(min = 1, max = 90))]
    pub expires_in_days: Option<i64>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct UpdateQuoteDto {
    #[validate(range(min = 0.01, message = "Quote amount must be positive"))]
    pub amount: Option<f64>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(range(min = 1, max = 90))]
    pub expires_in_days: Option<i64>,
}

/// Shared by quote acceptance and scheduling. Date and time go together.
#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleDto {
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub payment_method: Option<PaymentMethodDto>,
    #[serde(flatten)]
    #[validate]
    pub proof: PaymentProofDto,
}

impl ScheduleDto {
    fn payment(&mut self) -> Result<Option<PaymentChoice>, HttpError> {
        let proof = std::mem::take(&mut self.proof);
        match self.payment_method {
            Some(method) => payment_choice(method, proof).map(Some),
            None if proof.into_proof()?.is_some() => Err(HttpError::bad_request(
                "payment_method is required with gateway payment details",
            )),
            None => Ok(None),
        }
    }

    /// `None` when neither date nor time was sent.
    pub fn into_schedule(mut self) -> Result<Option<ScheduleInput>, HttpError> {
        let payment = self.payment()?;
        match (self.scheduled_date.as_deref(), self.scheduled_time.as_deref()) {
            (Some(date), Some(time)) => Ok(Some(ScheduleInput {
                date: parse_date(date)?,
                time: parse_time(time)?,
                payment,
            })),
            (None, None) if payment.is_none() => Ok(None),
            (None, None) => Err(HttpError::bad_request(
                "A payment can only be made together with a schedule",
            )),
            _ => Err(HttpError::bad_request(
                "scheduled_date and scheduled_time must be sent together",
            )),
        }
    }
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentOrderDto {
    #[validate(range(min = 1))]
    pub segment_number: Option<i32>,
}

#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingListQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
    pub status: Option<BookingStatus>,
    pub booking_type: Option<BookingType>,
    pub service_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQueryDto {
    pub date: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct SegmentItemDto {
    #[validate(range(min = 0.01, message = "Segment amount must be positive"))]
    pub amount: f64,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegmentsDto {
    #[validate(length(min = 1, max = 24, message = "Between 1 and 24 segments are allowed"))]
    pub segments: Vec<SegmentItemDto>,
}

impl CreateSegmentsDto {
    /// Validates the envelope and then every item.
    pub fn validate_all(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()?;
        self.segments.iter().try_for_each(|item| item.validate())
    }

    pub fn into_inputs(self) -> Result<Vec<SegmentInput>, HttpError> {
        self.segments
            .into_iter()
            .map(|item| {
                Ok(SegmentInput {
                    amount: amount_to_paise(item.amount)?,
                    due_date: item.due_date,
                    notes: item.notes,
                })
            })
            .collect()
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct PaySegmentDto {
    pub payment_method: PaymentMethodDto,
    #[serde(flatten)]
    #[validate]
    pub proof: PaymentProofDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponseDto {
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
    pub address: BookingAddress,
    pub description: Option<String>,
    pub contact_person: String,
    pub contact_phone: String,
    pub special_instructions: Option<String>,
    pub quote_amount: Option<f64>,
    pub quote_notes: Option<String>,
    pub quote_provided_at: Option<DateTime<Utc>>,
    pub quote_accepted_at: Option<DateTime<Utc>>,
    pub quote_expires_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completion_type: Option<CompletionType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponseDto {
    fn from(b: Booking) -> Self {
        BookingResponseDto {
            id: b.id,
            booking_reference: b.booking_reference,
            user_id: b.user_id,
            service_id: b.service_id,
            time_slot_id: b.time_slot_id,
            booking_type: b.booking_type,
            status: b.status,
            payment_status: b.payment_status,
            scheduled_date: b.scheduled_date,
            scheduled_time: b.scheduled_time,
            scheduled_end_time: b.scheduled_end_time,
            actual_start_time: b.actual_start_time,
            actual_end_time: b.actual_end_time,
            actual_duration_minutes: b.actual_duration_minutes,
            hold_expires_at: b.hold_expires_at,
            address: b.address.0,
            description: b.description,
            contact_person: b.contact_person,
            contact_phone: b.contact_phone,
            special_instructions: b.special_instructions,
            quote_amount: b.quote_amount.map(paise_to_rupees),
            quote_notes: b.quote_notes,
            quote_provided_at: b.quote_provided_at,
            quote_accepted_at: b.quote_accepted_at,
            quote_expires_at: b.quote_expires_at,
            rejection_reason: b.rejection_reason,
            cancellation_reason: b.cancellation_reason,
            cancelled_at: b.cancelled_at,
            completion_type: b.completion_type,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponseDto {
    pub id: Uuid,
    pub payment_reference: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub razorpay_order_id: Option<String>,
    pub refunded_amount: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponseDto {
    fn from(p: Payment) -> Self {
        PaymentResponseDto {
            id: p.id,
            payment_reference: p.payment_reference,
            amount: paise_to_rupees(p.amount),
            currency: p.currency,
            status: p.status,
            payment_type: p.payment_type,
            method: p.method,
            razorpay_order_id: p.razorpay_order_id,
            refunded_amount: paise_to_rupees(p.refunded_amount),
            completed_at: p.completed_at,
            created_at: p.created_at,
        }
    }
}

/// What the client needs to open the gateway checkout.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderOrderDto {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub key_id: String,
}

impl ProviderOrderDto {
    pub fn new(order: ProviderOrder, key_id: &str) -> Self {
        ProviderOrderDto {
            order_id: order.id,
            amount: paise_to_rupees(order.amount),
            currency: order.currency,
            key_id: key_id.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingCreatedDto {
    pub booking: BookingResponseDto,
    pub payment: Option<PaymentResponseDto>,
    pub order: Option<ProviderOrderDto>,
}

impl BookingCreatedDto {
    pub fn new(outcome: BookingOutcome, key_id: &str) -> Self {
        BookingCreatedDto {
            booking: outcome.booking.into(),
            payment: outcome.payment.map(Into::into),
            order: outcome.order.map(|o| ProviderOrderDto::new(o, key_id)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentOrderResponseDto {
    pub payment: PaymentResponseDto,
    pub order: ProviderOrderDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentDto {
    pub id: Uuid,
    pub segment_number: i32,
    pub amount: f64,
    pub due_date: Option<DateTime<Utc>>,
    pub status: SegmentStatus,
    pub payment_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl SegmentDto {
    /// Overdue is derived at `now`.
    pub fn at(segment: PaymentSegment, now: DateTime<Utc>) -> Self {
        SegmentDto {
            status: segment.effective_status(now),
            id: segment.id,
            segment_number: segment.segment_number,
            amount: paise_to_rupees(segment.amount),
            due_date: segment.due_date,
            payment_id: segment.payment_id,
            paid_at: segment.paid_at,
            notes: segment.notes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentProgressDto {
    pub total_amount: f64,
    pub paid_amount: f64,
    pub remaining_amount: f64,
    pub total_segments: usize,
    pub paid_segments: usize,
    pub percentage: f64,
    pub segments: Vec<SegmentDto>,
}

impl From<SegmentProgress> for SegmentProgressDto {
    fn from(p: SegmentProgress) -> Self {
        let now = Utc::now();
        SegmentProgressDto {
            total_amount: paise_to_rupees(p.total_amount),
            paid_amount: paise_to_rupees(p.paid_amount),
            remaining_amount: paise_to_rupees(p.remaining_amount),
            total_segments: p.total_segments,
            paid_segments: p.paid_segments,
            percentage: p.percentage,
            segments: p.segments.into_iter().map(|s| SegmentDto::at(s, now)).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingDetailDto {
    pub booking: BookingResponseDto,
    pub service_name: Option<String>,
    pub assignment: Option<WorkerAssignment>,
    pub segments: Vec<SegmentDto>,
    pub buffer_requests: Vec<BufferRequest>,
}

impl From<BookingDetail> for BookingDetailDto {
    fn from(d: BookingDetail) -> Self {
        let now = Utc::now();
        BookingDetailDto {
            booking: d.booking.into(),
            service_name: d.service.map(|s| s.name),
            assignment: d.assignment,
            segments: d.segments.into_iter().map(|s| SegmentDto::at(s, now)).collect(),
            buffer_requests: d.buffer_requests,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeSlotDto {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub available_workers: i32,
    pub total_workers: i32,
}

impl From<TimeSlot> for TimeSlotDto {
    fn from(s: TimeSlot) -> Self {
        TimeSlotDto {
            id: s.id,
            date: s.date,
            start_time: s.start_time.format("%H:%M").to_string(),
            end_time: s.end_time.format("%H:%M").to_string(),
            available_workers: s.available_workers,
            total_workers: s.total_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_dates_and_times() {
        assert_eq!(parse_date("2025-06-01").unwrap(), NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(parse_time("10:00").unwrap(), NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert!(parse_date("01-06-2025").is_err());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("10:00:00").is_err());
    }

    #[test]
    fn schedule_needs_date_and_time_together() {
        let none = ScheduleDto::default();
        assert!(none.into_schedule().unwrap().is_none());

        let half = ScheduleDto {
            scheduled_date: Some("2025-06-01".to_string()),
            ..Default::default()
        };
        assert!(half.into_schedule().is_err());

        let full = ScheduleDto {
            scheduled_date: Some("2025-06-01".to_string()),
            scheduled_time: Some("14:30".to_string()),
            payment_method: Some(PaymentMethodDto::Wallet),
            ..Default::default()
        };
        let schedule = full.into_schedule().unwrap().unwrap();
        assert_eq!(schedule.time, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert!(matches!(schedule.payment, Some(PaymentChoice::Wallet)));

        let payment_only = ScheduleDto {
            payment_method: Some(PaymentMethodDto::Wallet),
            ..Default::default()
        };
        assert!(payment_only.into_schedule().is_err());
    }

    #[test]
    fn segment_amounts_become_paise() {
        let dto = CreateSegmentsDto {
            segments: vec![
                SegmentItemDto { amount: 1500.5, due_date: None, notes: None },
                SegmentItemDto { amount: 499.5, due_date: None, notes: None },
            ],
        };
        assert!(dto.validate_all().is_ok());
        let inputs = dto.into_inputs().unwrap();
        assert_eq!(inputs[0].amount, 150_050);
        assert_eq!(inputs[1].amount, 49_950);
    }

    #[test]
    fn create_booking_body_validates() {
        let body: CreateBookingDto = serde_json::from_value(serde_json::json!({
            "service_id": Uuid::new_v4(),
            "scheduled_date": "2025-06-01",
            "scheduled_time": "10:00",
            "address": {
                "address": "12 MG Road",
                "city": "Bengaluru",
                "state": "Karnataka",
                "postal_code": "560001"
            },
            "contact_person": "Asha",
            "contact_phone": "9876543210",
            "payment_method": "wallet"
        }))
        .unwrap();
        assert!(body.validate().is_ok());
        assert!(body.proof.razorpay_order_id.is_none());

        let mut bad = body.clone();
        bad.address.city = String::new();
        assert!(bad.validate().is_err());
    }
}
