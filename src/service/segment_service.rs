// service/segment_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{
        bookingdb::BookingExt,
        db::DBClient,
        paymentdb::PaymentExt,
        segmentdb::SegmentExt,
        servicedb::ServiceCatalogExt,
    },
    models::{
        bookingmodel::BookingStatus,
        paymentmodel::{
            Payment, PaymentMetadata, PaymentSegment, PaymentStatus, PaymentType, RelatedEntity,
            SegmentStatus,
        },
        usermodel::Principal,
    },
    service::{
        booking_service::{payable_amount, BookingService, PaymentChoice},
        error::ServiceError,
    },
};

#[derive(Debug, Clone)]
pub struct SegmentInput {
    pub amount: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentProgress {
    pub total_amount: i64,
    pub paid_amount: i64,
    pub remaining_amount: i64,
    pub total_segments: usize,
    pub paid_segments: usize,
    pub percentage: f64,
    pub segments: Vec<PaymentSegment>,
}

/// Segments must be non-empty, positive, and add up to the payable amount.
pub fn validate_segments(segments: &[SegmentInput], payable: i64) -> Result<(), ServiceError> {
    if segments.is_empty() {
        return Err(ServiceError::InvalidInput("At least one segment is required".to_string()));
    }
    if segments.iter().any(|s| s.amount <= 0) {
        return Err(ServiceError::InvalidInput("Segment amounts must be positive".to_string()));
    }
    let total = segments
        .iter()
        .try_fold(0i64, |acc, s| acc.checked_add(s.amount))
        .ok_or_else(|| ServiceError::InvalidInput("Segment total is too large".to_string()))?;
    if total != payable {
        return Err(ServiceError::InvalidInput(format!(
            "Segments add up to {} paise but the booking is worth {} paise",
            total, payable
        )));
    }
    Ok(())
}

/// Installments can be set up while the booking is quoted or confirmed but not yet paid.
pub fn segments_allowed(status: BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::QuoteProvided | BookingStatus::QuoteAccepted | BookingStatus::Confirmed
    )
}

/// An open provider order for the whole quote would double-charge once segments exist.
pub fn ensure_no_open_order(payments: &[Payment]) -> Result<(), ServiceError> {
    let open = payments
        .iter()
        .any(|p| p.status == PaymentStatus::Pending && p.payment_type == PaymentType::Quote);
    if open {
        return Err(ServiceError::Conflict(
            "Booking has an open payment order for the full quote".to_string(),
        ));
    }
    Ok(())
}

/// Progress over the booking's segments with overdue derived at `now`.
pub fn compute_progress(segments: Vec<PaymentSegment>, now: DateTime<Utc>) -> SegmentProgress {
    let segments: Vec<PaymentSegment> = segments
        .into_iter()
        .map(|mut s| {
            s.status = s.effective_status(now);
            s
        })
        .collect();

    let total_amount: i64 = segments.iter().map(|s| s.amount).sum();
    let paid: Vec<&PaymentSegment> = segments
        .iter()
        .filter(|s| s.status == SegmentStatus::Paid)
        .collect();
    let paid_amount: i64 = paid.iter().map(|s| s.amount).sum();
    let percentage = if total_amount > 0 {
        ((paid_amount as f64 / total_amount as f64) * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    SegmentProgress {
        total_amount,
        paid_amount,
        remaining_amount: total_amount - paid_amount,
        total_segments: segments.len(),
        paid_segments: paid.len(),
        percentage,
        segments,
    }
}

#[derive(Debug, Clone)]
pub struct SegmentService {
    db_client: Arc<DBClient>,
    bookings: BookingService,
}

impl SegmentService {
    pub fn new(db_client: Arc<DBClient>, bookings: BookingService) -> Self {
        Self { db_client, bookings }
    }

    pub async fn create_segments(
        &self,
        admin: &Principal,
        booking_id: Uuid,
        inputs: Vec<SegmentInput>,
    ) -> Result<Vec<PaymentSegment>, ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let booking = self
            .db_client
            .lock_booking_tx(&mut tx, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        if !segments_allowed(booking.status) {
            return Err(ServiceError::stale(format!(
                "Segments cannot be set up for a {} booking",
                booking.status.to_str()
            )));
        }
        if booking.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::stale("Booking is already paid in full"));
        }
        if self.db_client.count_segments_tx(&mut tx, booking.id).await? > 0 {
            return Err(ServiceError::Conflict("Booking already has payment segments".to_string()));
        }
        let payments = self
            .db_client
            .payments_for_entity_tx(&mut tx, RelatedEntity::Booking, booking.id)
            .await?;
        ensure_no_open_order(&payments)?;

        let service = self
            .db_client
            .get_service(booking.service_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Service"))?;
        let payable = payable_amount(&booking, &service)
            .ok_or_else(|| ServiceError::stale("Booking has no payable amount yet"))?;
        validate_segments(&inputs, payable)?;

        let mut created = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let segment = self
                .db_client
                .insert_segment_tx(
                    &mut tx,
                    booking.id,
                    index as i32 + 1,
                    input.amount,
                    input.due_date,
                    input.notes,
                )
                .await?;
            created.push(segment);
        }
        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            segments = created.len(),
            payable,
            admin_id = %admin.user_id,
            "Payment segments created"
        );
        Ok(created)
    }

    pub async fn pay_segment(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        segment_number: i32,
        payment: PaymentChoice,
    ) -> Result<SegmentProgress, ServiceError> {
        self.bookings.verify_proof(&payment)?;

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self
            .db_client
            .lock_booking_tx(&mut tx, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        BookingService::ensure_owner_or_admin(principal, &booking)?;
        if booking.status.is_terminal() {
            return Err(ServiceError::stale("Booking is already closed"));
        }

        let segment = self
            .db_client
            .lock_segment_tx(&mut tx, booking.id, segment_number)
            .await?
            .ok_or_else(|| ServiceError::not_found("Payment segment"))?;
        if !segment.is_payable() {
            return Err(ServiceError::stale("Segment is not payable"));
        }

        let paid_with = self
            .bookings
            .collect_payment_tx(
                &mut tx,
                &booking,
                segment.amount,
                &payment,
                PaymentType::SegmentPay,
                PaymentMetadata {
                    description: Some(format!("Segment {} payment", segment_number)),
                    booking_reference: Some(booking.booking_reference.clone()),
                    segment_number: Some(segment_number),
                    ..Default::default()
                },
            )
            .await?;
        self.db_client
            .mark_segment_paid_tx(&mut tx, segment.id, paid_with.id)
            .await?;

        let segments = self.db_client.segments_for_booking_tx(&mut tx, booking.id).await?;
        let all_paid = segments.iter().all(|s| s.status == SegmentStatus::Paid);
        if all_paid && booking.payment_status != PaymentStatus::Completed {
            let mut settled = booking.clone();
            settled.payment_status = PaymentStatus::Completed;
            self.db_client
                .update_booking_tx(&mut tx, &settled, booking.status)
                .await?
                .ok_or_else(|| ServiceError::stale("Booking was changed by another request"))?;
        }
        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            segment_number,
            amount = segment.amount,
            all_paid,
            "Segment paid"
        );
        Ok(compute_progress(segments, Utc::now()))
    }

    pub async fn progress(&self, principal: &Principal, booking_id: Uuid) -> Result<SegmentProgress, ServiceError> {
        let booking = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        BookingService::ensure_owner_or_admin(principal, &booking)?;

        let segments = self.db_client.segments_for_booking(booking.id).await?;
        Ok(compute_progress(segments, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input(amount: i64) -> SegmentInput {
        SegmentInput {
            amount,
            due_date: None,
            notes: None,
        }
    }

    fn segment(number: i32, amount: i64, status: SegmentStatus, due: Option<DateTime<Utc>>) -> PaymentSegment {
        let now = Utc::now();
        PaymentSegment {
            id: Uuid::new_v4(),
            booking_id: Uuid::nil(),
            segment_number: number,
            amount,
            due_date: due,
            status,
            payment_id: None,
            paid_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn segments_must_sum_to_payable() {
        assert!(validate_segments(&[input(200_000), input(300_000)], 500_000).is_ok());
        assert!(validate_segments(&[input(200_000), input(200_000)], 500_000).is_err());
        assert!(validate_segments(&[], 500_000).is_err());
        assert!(validate_segments(&[input(600_000), input(-100_000)], 500_000).is_err());
    }

    #[test]
    fn progress_counts_paid_segments() {
        let now = Utc::now();
        let progress = compute_progress(
            vec![
                segment(1, 200_000, SegmentStatus::Paid, None),
                segment(2, 300_000, SegmentStatus::Pending, Some(now - Duration::days(1))),
            ],
            now,
        );

        assert_eq!(progress.total_amount, 500_000);
        assert_eq!(progress.paid_amount, 200_000);
        assert_eq!(progress.remaining_amount, 300_000);
        assert_eq!(progress.paid_segments, 1);
        assert_eq!(progress.total_segments, 2);
        assert_eq!(progress.percentage, 40.0);
        assert_eq!(progress.segments[1].status, SegmentStatus::Overdue);
    }

    fn payment(status: PaymentStatus, payment_type: PaymentType) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            payment_reference: "PAY20250601100000AB12CD".to_string(),
            user_id: Uuid::new_v4(),
            amount: 500_000,
            currency: "INR".to_string(),
            status,
            payment_type,
            method: crate::models::paymentmodel::PaymentMethod::Razorpay,
            related_entity_type: Some("booking".to_string()),
            related_entity_id: Some(Uuid::new_v4()),
            razorpay_order_id: Some("order_1".to_string()),
            razorpay_payment_id: None,
            razorpay_signature: None,
            balance_after: None,
            refunded_amount: 0,
            refund_attempts: 0,
            refund_reason: None,
            metadata: None,
            initiated_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn segments_only_before_work_is_underway() {
        assert!(segments_allowed(BookingStatus::QuoteProvided));
        assert!(segments_allowed(BookingStatus::QuoteAccepted));
        assert!(segments_allowed(BookingStatus::Confirmed));

        assert!(!segments_allowed(BookingStatus::Pending));
        assert!(!segments_allowed(BookingStatus::TemporaryHold));
        assert!(!segments_allowed(BookingStatus::InProgress));
        assert!(!segments_allowed(BookingStatus::Cancelled));
    }

    #[test]
    fn open_full_amount_order_blocks_segments() {
        assert!(ensure_no_open_order(&[]).is_ok());
        assert!(ensure_no_open_order(&[payment(PaymentStatus::Hold, PaymentType::Booking)]).is_ok());
        assert!(ensure_no_open_order(&[payment(PaymentStatus::Pending, PaymentType::Booking)]).is_ok());
        assert!(ensure_no_open_order(&[payment(PaymentStatus::Expired, PaymentType::Quote)]).is_ok());
        assert!(matches!(
            ensure_no_open_order(&[payment(PaymentStatus::Pending, PaymentType::Quote)]),
            Err(ServiceError::Conflict(_))
        ));
    }

    #[test]
    fn empty_progress_is_zero() {
        let progress = compute_progress(Vec::new(), Utc::now());
        assert_eq!(progress.percentage, 0.0);
        assert_eq!(progress.remaining_amount, 0);
    }
}
