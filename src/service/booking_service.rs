// service/booking_service.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    db::{
        assignmentdb::AssignmentExt,
        bookingdb::{BookingExt, BookingFilter, NewBooking},
        bufferdb::BufferRequestExt,
        db::{DBClient, PgTx},
        locationdb::LocationExt,
        paymentdb::{NewPayment, PaymentExt},
        segmentdb::SegmentExt,
        servicedb::ServiceCatalogExt,
    },
    models::{
        assignmentmodel::{AssignmentStatus, BufferRequest, LocationStatus, WorkerAssignment},
        bookingmodel::{
            compute_scheduled_end, scheduled_instant, Booking, BookingAddress, BookingStatus,
            BookingType, CompletionType,
        },
        paymentmodel::{
            Payment, PaymentMetadata, PaymentMethod, PaymentSegment, PaymentStatus, PaymentType,
            RelatedEntity, WalletTransactionType,
        },
        servicemodel::Service,
        usermodel::{mask_phone, Principal},
    },
    service::{
        admin_config::{AdminConfigService, BookingConfig},
        error::ServiceError,
        payment_gateway::{ProviderOrder, RazorpayService},
        timeslot_service::TimeSlotService,
        wallet_service::{DebitPurpose, RefundDisposition, WalletService},
    },
    utils::{currency::percentage_of, reference::{booking_reference, payment_reference}},
};

#[derive(Debug, Clone)]
pub struct GatewayProof {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub enum PaymentChoice {
    Wallet,
    Gateway(GatewayProof),
    Deferred,
}

#[derive(Debug, Clone)]
pub struct CreateBookingInput {
    pub service_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub address: BookingAddress,
    pub description: Option<String>,
    pub contact_person: String,
    pub contact_phone: String,
    pub special_instructions: Option<String>,
    pub payment: PaymentChoice,
}

#[derive(Debug, Clone)]
pub struct CreateInquiryInput {
    pub service_id: Uuid,
    pub address: BookingAddress,
    pub description: Option<String>,
    pub contact_person: String,
    pub contact_phone: String,
    pub special_instructions: Option<String>,
    pub payment: PaymentChoice,
}

#[derive(Debug, Clone)]
pub struct ScheduleInput {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub payment: Option<PaymentChoice>,
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub payment: Option<Payment>,
    pub order: Option<ProviderOrder>,
}

#[derive(Debug, Clone)]
pub struct BookingDetail {
    pub booking: Booking,
    pub service: Option<Service>,
    pub assignment: Option<WorkerAssignment>,
    pub segments: Vec<PaymentSegment>,
    pub buffer_requests: Vec<BufferRequest>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefundSummary {
    pub credited: i64,
    pub deferred: i64,
    pub settled_payments: usize,
}

impl RefundSummary {
    pub fn payment_status(&self, current: PaymentStatus, unpaid: PaymentStatus) -> PaymentStatus {
        if self.deferred > 0 {
            PaymentStatus::RefundPending
        } else if self.credited > 0 {
            PaymentStatus::Refunded
        } else if self.settled_payments == 0 {
            unpaid
        } else {
            current
        }
    }
}

pub fn payable_amount(booking: &Booking, service: &Service) -> Option<i64> {
    match booking.booking_type {
        BookingType::Inquiry => booking.quote_amount,
        BookingType::Regular => service.price,
    }
}

/// Refund owed on cancellation: everything before the work starts, the
/// configured share afterwards.
pub fn cancellation_refund(refundable: i64, post_start_percentage: Option<i64>) -> i64 {
    match post_start_percentage {
        Some(pct) => percentage_of(refundable, pct),
        None => refundable,
    }
}

pub fn ensure_quote_amount_editable(existing_segments: i64) -> Result<(), ServiceError> {
    if existing_segments > 0 {
        Err(ServiceError::stale(
            "Quote amount cannot change once payment segments exist",
        ))
    } else {
        Ok(())
    }
}

fn awaits_order_capture(booking: &Booking, payment: &Payment) -> bool {
    payment.status == PaymentStatus::Pending
        && (booking.status == BookingStatus::TemporaryHold
            || (booking.status == BookingStatus::Pending && booking.is_inquiry()))
}

fn is_late_capture(booking: &Booking, payment: &Payment) -> bool {
    payment.razorpay_payment_id.is_none()
        && (booking.status.is_terminal()
            || matches!(
                payment.status,
                PaymentStatus::Expired
                    | PaymentStatus::Cancelled
                    | PaymentStatus::Abandoned
                    | PaymentStatus::Failed
            ))
}

pub fn ensure_transition(from: BookingStatus, to: BookingStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::stale(format!(
            "Booking cannot move from {} to {}",
            from.to_str(),
            to.to_str()
        )))
    }
}

#[derive(Debug, Clone)]
pub struct BookingService {
    db_client: Arc<DBClient>,
    gateway: Arc<RazorpayService>,
    wallet: WalletService,
    slots: TimeSlotService,
    config_service: AdminConfigService,
}

impl BookingService {
    pub fn new(db_client: Arc<DBClient>, gateway: Arc<RazorpayService>) -> Self {
        Self {
            wallet: WalletService::new(db_client.clone(), gateway.clone()),
            slots: TimeSlotService::new(db_client.clone()),
            config_service: AdminConfigService::new(db_client.clone()),
            db_client,
            gateway,
        }
    }

    async fn active_service(&self, service_id: Uuid) -> Result<Service, ServiceError> {
        let service = self
            .db_client
            .get_service(service_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Service"))?;
        if !service.is_active {
            return Err(ServiceError::InvalidInput("Service is not currently offered".to_string()));
        }
        Ok(service)
    }

    async fn check_area(&self, service_id: Uuid, address: &BookingAddress) -> Result<(), ServiceError> {
        if !self
            .db_client
            .is_service_available_in_area(service_id, &address.city, &address.state)
            .await?
        {
            return Err(ServiceError::InvalidInput(format!(
                "Service is not available in {}, {}",
                address.city, address.state
            )));
        }
        Ok(())
    }

    pub fn verify_proof(&self, choice: &PaymentChoice) -> Result<(), ServiceError> {
        if let PaymentChoice::Gateway(proof) = choice {
            if !self
                .gateway
                .verify_signature(&proof.order_id, &proof.payment_id, &proof.signature)
            {
                tracing::warn!(order_id = %proof.order_id, "Payment signature rejected");
                return Err(ServiceError::SignatureInvalid);
            }
        }
        Ok(())
    }

    async fn lock_booking(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<Booking, ServiceError> {
        self.db_client
            .lock_booking_tx(tx, booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))
    }

    async fn save(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<Booking, ServiceError> {
        self.db_client
            .update_booking_tx(tx, booking, expected)
            .await?
            .ok_or_else(|| ServiceError::stale("Booking was changed by another request"))
    }

    pub fn ensure_owner_or_admin(principal: &Principal, booking: &Booking) -> Result<(), ServiceError> {
        if principal.is_admin() || booking.user_id == principal.user_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("You do not have access to this booking".to_string()))
        }
    }

    /// Collects `amount` for `booking` with a wallet debit or a verified
    /// gateway payment. Signatures are checked before the transaction opens.
    pub async fn collect_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        amount: i64,
        choice: &PaymentChoice,
        payment_type: PaymentType,
        metadata: PaymentMetadata,
    ) -> Result<Payment, ServiceError> {
        match choice {
            PaymentChoice::Wallet => {
                let (payment, _) = self
                    .wallet
                    .debit_tx(
                        tx,
                        booking.user_id,
                        amount,
                        DebitPurpose {
                            transaction_type: WalletTransactionType::ServicePayment,
                            payment_type,
                            related: Some((RelatedEntity::Booking, booking.id)),
                            booking_id: Some(booking.id),
                            description: format!("Payment for booking {}", booking.booking_reference),
                            metadata,
                        },
                    )
                    .await?;
                Ok(payment)
            }
            PaymentChoice::Gateway(proof) => {
                match self.db_client.find_payment_by_order_tx(tx, &proof.order_id).await? {
                    Some(existing) => {
                        let belongs = existing.user_id == booking.user_id
                            && existing.related_entity_id == Some(booking.id);
                        if !belongs {
                            return Err(ServiceError::not_found("Payment order"));
                        }
                        if existing.status != PaymentStatus::Pending {
                            return Err(ServiceError::Conflict(
                                "Payment order has already been used".to_string(),
                            ));
                        }
                        if existing.amount != amount {
                            return Err(ServiceError::InvalidInput(
                                "Payment order amount does not match the amount due".to_string(),
                            ));
                        }
                        Ok(self
                            .db_client
                            .complete_payment_tx(
                                tx,
                                existing.id,
                                Some(&proof.payment_id),
                                Some(&proof.signature),
                                None,
                            )
                            .await?)
                    }
                    None => Ok(self
                        .db_client
                        .insert_payment_tx(
                            tx,
                            NewPayment {
                                payment_reference: payment_reference(),
                                user_id: booking.user_id,
                                amount,
                                status: PaymentStatus::Completed,
                                payment_type,
                                method: PaymentMethod::Razorpay,
                                related_entity: Some((RelatedEntity::Booking, booking.id)),
                                razorpay_order_id: Some(proof.order_id.clone()),
                                razorpay_payment_id: Some(proof.payment_id.clone()),
                                razorpay_signature: Some(proof.signature.clone()),
                                balance_after: None,
                                metadata,
                            },
                        )
                        .await?),
                }
            }
            PaymentChoice::Deferred => Err(ServiceError::InvalidInput(
                "A completed payment is required for this step".to_string(),
            )),
        }
    }

    async fn pending_order_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        amount: i64,
        order: &ProviderOrder,
        reference: String,
        payment_type: PaymentType,
        metadata: PaymentMetadata,
    ) -> Result<Payment, ServiceError> {
        Ok(self
            .db_client
            .insert_payment_tx(
                tx,
                NewPayment {
                    payment_reference: reference,
                    user_id: booking.user_id,
                    amount,
                    status: PaymentStatus::Pending,
                    payment_type,
                    method: PaymentMethod::Razorpay,
                    related_entity: Some((RelatedEntity::Booking, booking.id)),
                    razorpay_order_id: Some(order.id.clone()),
                    razorpay_payment_id: None,
                    razorpay_signature: None,
                    balance_after: None,
                    metadata,
                },
            )
            .await?)
    }

    async fn open_order(
        &self,
        amount: i64,
        reference: &str,
        purpose: &str,
        config: &BookingConfig,
    ) -> Result<ProviderOrder, ServiceError> {
        self.gateway
            .create_order(
                amount,
                "INR",
                reference,
                serde_json::json!({ "purpose": purpose }),
                config.provider_retry_attempts,
            )
            .await
    }

    pub async fn create_booking(
        &self,
        principal: &Principal,
        input: CreateBookingInput,
    ) -> Result<BookingOutcome, ServiceError> {
        let service = self.active_service(input.service_id).await?;
        if !service.is_fixed() {
            return Err(ServiceError::InvalidInput(
                "Inquiry services must be booked through the inquiry flow".to_string(),
            ));
        }
        let price = service
            .price
            .filter(|p| *p > 0)
            .ok_or_else(|| ServiceError::InvalidInput("Service has no price".to_string()))?;

        self.check_area(service.id, &input.address).await?;

        let now = Utc::now();
        let scheduled_time = scheduled_instant(input.scheduled_date, input.scheduled_time);
        if scheduled_time <= now {
            return Err(ServiceError::InvalidInput("Scheduled time must be in the future".to_string()));
        }

        self.slots
            .ensure_day(service.id, input.scheduled_date, now.date_naive())
            .await?;
        self.verify_proof(&input.payment)?;

        let config = self.config_service.load().await?;
        let reference = booking_reference();
        let order = match input.payment {
            PaymentChoice::Deferred => Some(self.open_order(price, &reference, "booking", &config).await?),
            _ => None,
        };

        let mut tx = self.db_client.begin_tx().await?;

        let slot = self
            .slots
            .reserve_at_tx(&mut tx, service.id, input.scheduled_date, input.scheduled_time)
            .await?;
        let scheduled_end_time = compute_scheduled_end(
            scheduled_time,
            slot.service_duration_minutes,
            slot.buffer_duration_minutes,
        );

        let (status, payment_status, hold_expires_at) = match input.payment {
            PaymentChoice::Deferred => (
                BookingStatus::TemporaryHold,
                PaymentStatus::Pending,
                Some(now + config.hold_ttl()),
            ),
            _ => (BookingStatus::Confirmed, PaymentStatus::Completed, None),
        };

        let booking = self
            .db_client
            .insert_booking_tx(
                &mut tx,
                NewBooking {
                    booking_reference: reference.clone(),
                    user_id: principal.user_id,
                    service_id: service.id,
                    time_slot_id: Some(slot.id),
                    booking_type: BookingType::Regular,
                    status,
                    payment_status,
                    scheduled_date: Some(input.scheduled_date),
                    scheduled_time: Some(scheduled_time),
                    scheduled_end_time: Some(scheduled_end_time),
                    hold_expires_at,
                    address: input.address,
                    description: input.description,
                    contact_person: input.contact_person,
                    contact_phone: input.contact_phone,
                    special_instructions: input.special_instructions,
                },
            )
            .await?;

        let metadata = PaymentMetadata {
            description: Some(format!("Booking {}", reference)),
            booking_reference: Some(reference.clone()),
            ..Default::default()
        };
        let payment = match &order {
            Some(order) => {
                self.pending_order_payment_tx(
                    &mut tx,
                    &booking,
                    price,
                    order,
                    payment_reference(),
                    PaymentType::Booking,
                    metadata,
                )
                .await?
            }
            None => {
                self.collect_payment_tx(&mut tx, &booking, price, &input.payment, PaymentType::Booking, metadata)
                    .await?
            }
        };

        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            reference = %booking.booking_reference,
            slot_id = %slot.id,
            status = booking.status.to_str(),
            "Booking created"
        );
        Ok(BookingOutcome {
            booking,
            payment: Some(payment),
            order,
        })
    }

    pub async fn create_inquiry(
        &self,
        principal: &Principal,
        input: CreateInquiryInput,
    ) -> Result<BookingOutcome, ServiceError> {
        let service = self.active_service(input.service_id).await?;
        if !service.is_inquiry() {
            return Err(ServiceError::InvalidInput(
                "Fixed-price services must be booked with a date and time".to_string(),
            ));
        }
        self.check_area(service.id, &input.address).await?;
        self.verify_proof(&input.payment)?;

        let config = self.config_service.load().await?;
        let fee = config.inquiry_booking_fee;
        let now = Utc::now();
        let reference = booking_reference();

        let order = match (&input.payment, fee > 0) {
            (PaymentChoice::Deferred, true) => {
                Some(self.open_order(fee, &reference, "inquiry_fee", &config).await?)
            }
            _ => None,
        };
        let payment_status = if fee > 0 && order.is_none() {
            PaymentStatus::Hold
        } else {
            PaymentStatus::Pending
        };

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self
            .db_client
            .insert_booking_tx(
                &mut tx,
                NewBooking {
                    booking_reference: reference.clone(),
                    user_id: principal.user_id,
                    service_id: service.id,
                    time_slot_id: None,
                    booking_type: BookingType::Inquiry,
                    status: BookingStatus::Pending,
                    payment_status,
                    scheduled_date: None,
                    scheduled_time: None,
                    scheduled_end_time: None,
                    hold_expires_at: Some(now + config.hold_ttl()),
                    address: input.address,
                    description: input.description,
                    contact_person: input.contact_person,
                    contact_phone: input.contact_phone,
                    special_instructions: input.special_instructions,
                },
            )
            .await?;

        let metadata = PaymentMetadata {
            description: Some("Inquiry fee".to_string()),
            booking_reference: Some(reference.clone()),
            ..Default::default()
        };
        let payment = if fee <= 0 {
            None
        } else if let Some(order) = &order {
            Some(
                self.pending_order_payment_tx(
                    &mut tx,
                    &booking,
                    fee,
                    order,
                    payment_reference(),
                    PaymentType::Booking,
                    metadata,
                )
                .await?,
            )
        } else {
            let paid = self
                .collect_payment_tx(&mut tx, &booking, fee, &input.payment, PaymentType::Booking, metadata)
                .await?;
            Some(
                self.db_client
                    .set_payment_status_tx(&mut tx, paid.id, PaymentStatus::Hold)
                    .await?,
            )
        };

        tx.commit().await?;

        tracing::info!(booking_id = %booking.id, reference = %booking.booking_reference, fee, "Inquiry booking created");
        Ok(BookingOutcome { booking, payment, order })
    }

    /// Confirms a gateway payment for a booking. Replays with the same
    /// provider ids return the current state unchanged.
    pub async fn verify_payment(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        proof: GatewayProof,
    ) -> Result<Booking, ServiceError> {
        self.verify_proof(&PaymentChoice::Gateway(proof.clone()))?;

        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, booking_id).await?;
        Self::ensure_owner_or_admin(principal, &booking)?;

        self.confirm_order_tx(tx, booking, &proof.order_id, &proof.payment_id, Some(&proof.signature))
            .await
    }

    pub async fn confirm_captured_order(&self, order_id: &str, payment_id: &str) -> Result<Option<Booking>, ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let payment = match self.db_client.find_payment_by_order_tx(&mut tx, order_id).await? {
            Some(p) if p.related_entity_type.as_deref() == Some(RelatedEntity::Booking.to_str()) => p,
            _ => return Ok(None),
        };
        let booking_id = match payment.related_entity_id {
            Some(id) => id,
            None => return Ok(None),
        };
        let booking = self.lock_booking(&mut tx, booking_id).await?;
        self.confirm_order_tx(tx, booking, order_id, payment_id, None).await.map(Some)
    }

    async fn confirm_order_tx(
        &self,
        mut tx: PgTx<'static>,
        booking: Booking,
        order_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<Booking, ServiceError> {
        let payment = self.order_payment_tx(&mut tx, &booking, order_id).await?;

        if matches!(payment.status, PaymentStatus::Completed | PaymentStatus::Hold) {
            if payment.razorpay_payment_id.as_deref() == Some(payment_id) {
                return Ok(booking);
            }
            return Err(ServiceError::Conflict(
                "Payment order was already settled by a different payment".to_string(),
            ));
        }

        // Lapsed holds are closed first so a late capture lands on an expired booking.
        let booking = match self.expire_if_lapsed_tx(&mut tx, &booking, Utc::now()).await? {
            Some(expired) => expired,
            None => booking,
        };
        let payment = self.order_payment_tx(&mut tx, &booking, order_id).await?;

        if !awaits_order_capture(&booking, &payment) {
            if !is_late_capture(&booking, &payment) {
                tx.commit().await?;
                return Err(ServiceError::stale("Payment order is no longer payable"));
            }
            let disposition = self
                .refund_late_capture_tx(&mut tx, &booking, &payment, payment_id, signature)
                .await?;
            if booking.status.is_terminal() {
                let mut settled = booking.clone();
                settled.payment_status = match disposition {
                    RefundDisposition::Credited { .. } => PaymentStatus::Refunded,
                    RefundDisposition::Deferred { .. } => PaymentStatus::RefundPending,
                    RefundDisposition::Nothing => booking.payment_status,
                };
                self.save(&mut tx, &settled, booking.status).await?;
            }
            tx.commit().await?;
            return Err(ServiceError::stale(match disposition {
                RefundDisposition::Deferred { .. } => {
                    "Payment arrived after the booking closed; the refund is queued"
                }
                _ => "Payment arrived after the booking closed and was refunded to the wallet",
            }));
        }

        let mut updated = booking.clone();
        match booking.status {
            BookingStatus::TemporaryHold => {
                ensure_transition(booking.status, BookingStatus::Confirmed)?;
                self.db_client
                    .complete_payment_tx(&mut tx, payment.id, Some(payment_id), signature, None)
                    .await?;
                updated.status = BookingStatus::Confirmed;
                updated.payment_status = PaymentStatus::Completed;
                updated.hold_expires_at = None;
            }
            BookingStatus::Pending if booking.is_inquiry() => {
                self.db_client
                    .complete_payment_tx(&mut tx, payment.id, Some(payment_id), signature, None)
                    .await?;
                self.db_client
                    .set_payment_status_tx(&mut tx, payment.id, PaymentStatus::Hold)
                    .await?;
                updated.payment_status = PaymentStatus::Hold;
            }
            status => {
                return Err(ServiceError::stale(format!(
                    "Booking in {} is not awaiting a gateway payment",
                    status.to_str()
                )))
            }
        }

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, order_id, "Gateway payment confirmed");
        Ok(saved)
    }

    async fn order_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        order_id: &str,
    ) -> Result<Payment, ServiceError> {
        self.db_client
            .find_payment_by_order_tx(tx, order_id)
            .await?
            .filter(|p| p.related_entity_id == Some(booking.id))
            .ok_or_else(|| ServiceError::not_found("Payment order"))
    }

    async fn refund_late_capture_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        payment: &Payment,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<RefundDisposition, ServiceError> {
        let captured = self
            .db_client
            .complete_payment_tx(tx, payment.id, Some(payment_id), signature, None)
            .await?;
        let disposition = self
            .wallet
            .refund_payment_tx(
                tx,
                &captured,
                captured.amount,
                Some(booking.id),
                "Payment captured after the booking closed",
                PaymentStatus::Cancelled,
            )
            .await?;

        tracing::warn!(
            booking_id = %booking.id,
            payment_id = %captured.id,
            status = booking.status.to_str(),
            disposition = ?disposition,
            "Late capture refunded"
        );
        Ok(disposition)
    }

    pub async fn create_payment_order(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        segment_number: Option<i32>,
    ) -> Result<(Payment, ProviderOrder), ServiceError> {
        let booking = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        Self::ensure_owner_or_admin(principal, &booking)?;

        let (amount, payment_type, metadata) = match segment_number {
            Some(number) => {
                let segment = self
                    .db_client
                    .segments_for_booking(booking.id)
                    .await?
                    .into_iter()
                    .find(|s| s.segment_number == number)
                    .ok_or_else(|| ServiceError::not_found("Payment segment"))?;
                if !segment.is_payable() {
                    return Err(ServiceError::stale("Segment is not payable"));
                }
                (
                    segment.amount,
                    PaymentType::SegmentPay,
                    PaymentMetadata {
                        segment_number: Some(number),
                        booking_reference: Some(booking.booking_reference.clone()),
                        ..Default::default()
                    },
                )
            }
            None => {
                if !matches!(booking.status, BookingStatus::QuoteProvided | BookingStatus::QuoteAccepted) {
                    return Err(ServiceError::stale("Booking has no quote awaiting payment"));
                }
                let amount = booking
                    .quote_amount
                    .ok_or_else(|| ServiceError::stale("Booking has no quote"))?;
                (
                    amount,
                    PaymentType::Quote,
                    PaymentMetadata {
                        description: Some("Quote payment".to_string()),
                        booking_reference: Some(booking.booking_reference.clone()),
                        ..Default::default()
                    },
                )
            }
        };

        let config = self.config_service.load().await?;
        let reference = payment_reference();
        let order = self.open_order(amount, &reference, "booking_payment", &config).await?;

        let mut tx = self.db_client.begin_tx().await?;
        let payment = self
            .pending_order_payment_tx(&mut tx, &booking, amount, &order, reference, payment_type, metadata)
            .await?;
        tx.commit().await?;

        Ok((payment, order))
    }

    /// Expires the locked booking if its hold or quote window has lapsed.
    /// Returns the saved booking when it moved.
    async fn expire_if_lapsed_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, ServiceError> {
        if !(booking.hold_is_expired(now) || booking.quote_is_expired(now)) {
            return Ok(None);
        }

        let summary = self
            .refund_booking_payments_tx(tx, booking, None, "Booking expired", PaymentStatus::Expired)
            .await?;
        if let Some(slot_id) = booking.time_slot_id {
            self.slots.release_tx(tx, slot_id).await?;
        }
        self.db_client.cancel_unpaid_segments_tx(tx, booking.id).await?;

        let mut expired = booking.clone();
        expired.status = BookingStatus::Expired;
        expired.payment_status = summary.payment_status(booking.payment_status, PaymentStatus::Expired);
        expired.hold_expires_at = None;

        let saved = self.db_client.update_booking_tx(tx, &expired, booking.status).await?;
        if let Some(saved) = &saved {
            tracing::info!(
                booking_id = %saved.id,
                from = booking.status.to_str(),
                refunded = summary.credited,
                deferred = summary.deferred,
                "Booking expired"
            );
        }
        Ok(saved)
    }

    pub async fn expire_if_due(&self, booking_id: Uuid) -> Result<bool, ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let booking = match self.db_client.lock_booking_tx(&mut tx, booking_id).await? {
            Some(b) => b,
            None => return Ok(false),
        };

        let moved = self.expire_if_lapsed_tx(&mut tx, &booking, Utc::now()).await?.is_some();
        tx.commit().await?;
        Ok(moved)
    }

    /// Locks the booking and applies lazy expiry. A lapsed booking is
    /// committed as expired and reported as stale.
    async fn lock_live(&self, booking_id: Uuid) -> Result<(PgTx<'static>, Booking), ServiceError> {
        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, booking_id).await?;

        if self.expire_if_lapsed_tx(&mut tx, &booking, Utc::now()).await?.is_some() {
            tx.commit().await?;
            return Err(ServiceError::stale("Booking has expired"));
        }
        Ok((tx, booking))
    }

    /// Refunds every settled payment of the booking to the wallet.
    /// `post_start_share` is set once the work has started.
    async fn refund_booking_payments_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &Booking,
        post_start_share: Option<i64>,
        reason: &str,
        unsettled_status: PaymentStatus,
    ) -> Result<RefundSummary, ServiceError> {
        let payments = self
            .db_client
            .payments_for_entity_tx(tx, RelatedEntity::Booking, booking.id)
            .await?;

        let mut summary = RefundSummary::default();
        for payment in payments {
            if payment.is_settled() {
                summary.settled_payments += 1;
            }
            let amount = cancellation_refund(payment.refundable_amount(), post_start_share);
            if amount <= 0 && payment.status != PaymentStatus::Pending {
                continue;
            }

            match self
                .wallet
                .refund_payment_tx(tx, &payment, amount, Some(booking.id), reason, unsettled_status)
                .await?
            {
                RefundDisposition::Credited { amount } => summary.credited += amount,
                RefundDisposition::Deferred { amount } => summary.deferred += amount,
                RefundDisposition::Nothing => {}
            }
        }
        Ok(summary)
    }

    async fn capture_held_payments_tx(&self, tx: &mut PgTx<'_>, booking_id: Uuid) -> Result<(), ServiceError> {
        let payments = self
            .db_client
            .payments_for_entity_tx(tx, RelatedEntity::Booking, booking_id)
            .await?;
        for payment in payments.into_iter().filter(|p| p.status == PaymentStatus::Hold) {
            self.db_client
                .set_payment_status_tx(tx, payment.id, PaymentStatus::Completed)
                .await?;
        }
        Ok(())
    }

    pub async fn provide_quote(
        &self,
        admin: &Principal,
        booking_id: Uuid,
        amount: i64,
        notes: Option<String>,
        expires_in_days: Option<i64>,
    ) -> Result<Booking, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::InvalidInput("Quote amount must be positive".to_string()));
        }
        let config = self.config_service.load().await?;
        let (mut tx, booking) = self.lock_live(booking_id).await?;

        if !booking.is_inquiry() {
            return Err(ServiceError::InvalidInput("Only inquiry bookings take quotes".to_string()));
        }
        if booking.status == BookingStatus::QuoteProvided {
            return Err(ServiceError::Conflict(
                "A quote was already provided; update it instead".to_string(),
            ));
        }
        ensure_transition(booking.status, BookingStatus::QuoteProvided)?;

        let now = Utc::now();
        let mut updated = booking.clone();
        updated.status = BookingStatus::QuoteProvided;
        updated.quote_amount = Some(amount);
        updated.quote_notes = notes;
        updated.quote_provided_by = Some(admin.user_id);
        updated.quote_provided_at = Some(now);
        updated.quote_expires_at = Some(now + config.quote_ttl(expires_in_days));
        updated.hold_expires_at = None;

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, amount, admin_id = %admin.user_id, "Quote provided");
        Ok(saved)
    }

    pub async fn update_quote(
        &self,
        admin: &Principal,
        booking_id: Uuid,
        amount: Option<i64>,
        notes: Option<String>,
        expires_in_days: Option<i64>,
    ) -> Result<Booking, ServiceError> {
        if amount.map(|a| a <= 0).unwrap_or(false) {
            return Err(ServiceError::InvalidInput("Quote amount must be positive".to_string()));
        }
        let (mut tx, booking) = self.lock_live(booking_id).await?;
        if booking.status != BookingStatus::QuoteProvided {
            return Err(ServiceError::stale("Only an unaccepted quote can be updated"));
        }
        if amount.is_some_and(|a| Some(a) != booking.quote_amount) {
            ensure_quote_amount_editable(self.db_client.count_segments_tx(&mut tx, booking.id).await?)?;
        }

        let now = Utc::now();
        let mut updated = booking.clone();
        if let Some(amount) = amount {
            updated.quote_amount = Some(amount);
        }
        if notes.is_some() {
            updated.quote_notes = notes;
        }
        if let Some(days) = expires_in_days {
            updated.quote_expires_at = Some(now + chrono::Duration::days(days));
        }
        updated.quote_provided_by = Some(admin.user_id);
        updated.quote_provided_at = Some(now);

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, admin_id = %admin.user_id, "Quote updated");
        Ok(saved)
    }

    async fn apply_schedule_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &mut Booking,
        schedule: &ScheduleInput,
    ) -> Result<(), ServiceError> {
        let scheduled_time = scheduled_instant(schedule.date, schedule.time);
        if scheduled_time <= Utc::now() {
            return Err(ServiceError::InvalidInput("Scheduled time must be in the future".to_string()));
        }
        let slot = self
            .slots
            .reserve_at_tx(tx, booking.service_id, schedule.date, schedule.time)
            .await?;

        booking.time_slot_id = Some(slot.id);
        booking.scheduled_date = Some(schedule.date);
        booking.scheduled_time = Some(scheduled_time);
        booking.scheduled_end_time = Some(compute_scheduled_end(
            scheduled_time,
            slot.service_duration_minutes,
            slot.buffer_duration_minutes,
        ));
        Ok(())
    }

    async fn confirm_quote_tx(
        &self,
        tx: &mut PgTx<'_>,
        booking: &mut Booking,
        payment: Option<&PaymentChoice>,
    ) -> Result<(), ServiceError> {
        let segments = self.db_client.count_segments_tx(tx, booking.id).await?;
        if segments == 0 {
            let choice = payment.ok_or_else(|| {
                ServiceError::InvalidInput("Payment is required to confirm the quote".to_string())
            })?;
            let amount = booking
                .quote_amount
                .ok_or_else(|| ServiceError::stale("Booking has no quote"))?;
            self.collect_payment_tx(
                tx,
                booking,
                amount,
                choice,
                PaymentType::Quote,
                PaymentMetadata {
                    description: Some("Quote payment".to_string()),
                    booking_reference: Some(booking.booking_reference.clone()),
                    ..Default::default()
                },
            )
            .await?;
            booking.payment_status = PaymentStatus::Completed;
        }
        self.capture_held_payments_tx(tx, booking.id).await?;

        ensure_transition(booking.status, BookingStatus::Confirmed)?;
        booking.status = BookingStatus::Confirmed;
        Ok(())
    }

    /// Accepts a quote. With a schedule and payment the booking goes straight
    /// to `confirmed`; otherwise it waits in `quote_accepted`.
    pub async fn accept_quote(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        schedule: Option<ScheduleInput>,
    ) -> Result<Booking, ServiceError> {
        if let Some(schedule) = &schedule {
            if let Some(choice) = &schedule.payment {
                self.verify_proof(choice)?;
            }
            let booking = self
                .db_client
                .get_booking(booking_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Booking"))?;
            self.slots
                .ensure_day(booking.service_id, schedule.date, Utc::now().date_naive())
                .await?;
        }

        let (mut tx, booking) = self.lock_live(booking_id).await?;
        Self::ensure_owner_or_admin(principal, &booking)?;
        if booking.status != BookingStatus::QuoteProvided {
            return Err(ServiceError::stale("There is no open quote to accept"));
        }
        ensure_transition(booking.status, BookingStatus::QuoteAccepted)?;

        let mut updated = booking.clone();
        updated.status = BookingStatus::QuoteAccepted;
        updated.quote_accepted_at = Some(Utc::now());

        if let Some(schedule) = &schedule {
            self.apply_schedule_tx(&mut tx, &mut updated, schedule).await?;
            self.confirm_quote_tx(&mut tx, &mut updated, schedule.payment.as_ref())
                .await?;
        }

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, status = saved.status.to_str(), "Quote accepted");
        Ok(saved)
    }

    pub async fn schedule_booking(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        schedule: ScheduleInput,
    ) -> Result<Booking, ServiceError> {
        if let Some(choice) = &schedule.payment {
            self.verify_proof(choice)?;
        }
        let current = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        self.slots
            .ensure_day(current.service_id, schedule.date, Utc::now().date_naive())
            .await?;

        let (mut tx, booking) = self.lock_live(booking_id).await?;
        Self::ensure_owner_or_admin(principal, &booking)?;
        if booking.status != BookingStatus::QuoteAccepted {
            return Err(ServiceError::stale("Only an accepted quote can be scheduled"));
        }

        let mut updated = booking.clone();
        self.apply_schedule_tx(&mut tx, &mut updated, &schedule).await?;
        self.confirm_quote_tx(&mut tx, &mut updated, schedule.payment.as_ref())
            .await?;

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, slot_id = ?saved.time_slot_id, "Quote scheduled");
        Ok(saved)
    }

    async fn reject_tx(
        &self,
        mut tx: PgTx<'static>,
        booking: Booking,
        reason: String,
    ) -> Result<Booking, ServiceError> {
        ensure_transition(booking.status, BookingStatus::Rejected)?;

        let summary = self
            .refund_booking_payments_tx(&mut tx, &booking, None, "Inquiry rejected", PaymentStatus::Cancelled)
            .await?;
        self.db_client.cancel_unpaid_segments_tx(&mut tx, booking.id).await?;

        let mut updated = booking.clone();
        updated.status = BookingStatus::Rejected;
        updated.rejection_reason = Some(reason);
        updated.hold_expires_at = None;
        updated.payment_status = summary.payment_status(booking.payment_status, PaymentStatus::Cancelled);

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(booking_id = %saved.id, refunded = summary.credited, "Booking rejected");
        Ok(saved)
    }

    pub async fn reject_quote(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        reason: String,
    ) -> Result<Booking, ServiceError> {
        let (tx, booking) = self.lock_live(booking_id).await?;
        Self::ensure_owner_or_admin(principal, &booking)?;
        if booking.status != BookingStatus::QuoteProvided {
            return Err(ServiceError::stale("There is no open quote to reject"));
        }
        self.reject_tx(tx, booking, reason).await
    }

    pub async fn reject_inquiry(
        &self,
        _admin: &Principal,
        booking_id: Uuid,
        reason: String,
    ) -> Result<Booking, ServiceError> {
        let (tx, booking) = self.lock_live(booking_id).await?;
        if !booking.is_inquiry() || booking.status != BookingStatus::Pending {
            return Err(ServiceError::stale("Only a pending inquiry can be declined"));
        }
        self.reject_tx(tx, booking, reason).await
    }

    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        booking_id: Uuid,
        reason: String,
    ) -> Result<Booking, ServiceError> {
        let config = self.config_service.load().await?;
        let mut tx = self.db_client.begin_tx().await?;
        let booking = self.lock_booking(&mut tx, booking_id).await?;
        Self::ensure_owner_or_admin(principal, &booking)?;

        if booking.status.is_terminal() {
            return Err(ServiceError::stale(format!(
                "A {} booking cannot be cancelled",
                booking.status.to_str()
            )));
        }
        if !principal.is_admin() && !booking.status.is_customer_cancellable() {
            return Err(ServiceError::Forbidden(
                "Only an admin can cancel a booking in progress".to_string(),
            ));
        }
        let started = booking.status == BookingStatus::InProgress;
        ensure_transition(booking.status, BookingStatus::Cancelled)?;

        let share = if started {
            Some(config.post_start_refund_percentage)
        } else {
            None
        };
        let summary = self
            .refund_booking_payments_tx(&mut tx, &booking, share, &format!("Booking cancelled: {}", reason), PaymentStatus::Cancelled)
            .await?;

        if let Some(slot_id) = booking.time_slot_id {
            self.slots.release_tx(&mut tx, slot_id).await?;
        }
        self.db_client.cancel_unpaid_segments_tx(&mut tx, booking.id).await?;
        self.db_client.cancel_pending_buffer_requests_tx(&mut tx, booking.id).await?;
        if let Some(assignment) = self
            .db_client
            .live_assignment_for_booking_tx(&mut tx, booking.id)
            .await?
        {
            self.db_client
                .close_active_locations_tx(&mut tx, assignment.id, LocationStatus::Stopped)
                .await?;
            let mut closed = assignment.clone();
            closed.status = AssignmentStatus::Cancelled;
            self.db_client
                .update_assignment_tx(&mut tx, &closed, assignment.status)
                .await?
                .ok_or_else(|| ServiceError::stale("Assignment was changed by another request"))?;
        }

        let now = Utc::now();
        let mut updated = booking.clone();
        updated.status = BookingStatus::Cancelled;
        updated.cancellation_reason = Some(reason);
        updated.cancelled_by = Some(principal.user_id);
        updated.cancelled_at = Some(now);
        updated.hold_expires_at = None;
        updated.payment_status = summary.payment_status(booking.payment_status, PaymentStatus::Cancelled);
        if started {
            updated.completion_type = Some(CompletionType::AdminForced);
            updated.actual_end_time = Some(now);
        }

        let saved = self.save(&mut tx, &updated, booking.status).await?;
        tx.commit().await?;

        tracing::info!(
            booking_id = %saved.id,
            cancelled_by = %principal.user_id,
            refunded = summary.credited,
            deferred = summary.deferred,
            "Booking cancelled"
        );
        Ok(saved)
    }

    /// Role-aware detail view. Workers see only bookings assigned to them,
    /// with the customer's phone masked.
    pub async fn get_booking_detail(
        &self,
        principal: &Principal,
        booking_id: Uuid,
    ) -> Result<BookingDetail, ServiceError> {
        let mut booking = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;

        let now = Utc::now();
        if booking.hold_is_expired(now) || booking.quote_is_expired(now) {
            self.expire_if_due(booking.id).await?;
            booking = self
                .db_client
                .get_booking(booking_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Booking"))?;
        }

        let assignment = self.db_client.live_assignment_for_booking(booking.id).await?;

        let is_owner = booking.user_id == principal.user_id;
        let is_assigned_worker = principal.is_worker()
            && assignment
                .as_ref()
                .map(|a| a.worker_id == principal.user_id)
                .unwrap_or(false);

        if !(principal.is_admin() || is_owner || is_assigned_worker) {
            return Err(ServiceError::not_found("Booking"));
        }
        if is_assigned_worker && !is_owner {
            booking.contact_phone = mask_phone(&booking.contact_phone);
        }

        let service = self.db_client.get_service(booking.service_id).await?;
        let segments = self.db_client.segments_for_booking(booking.id).await?;
        let buffer_requests = self.db_client.buffer_requests_for_booking(booking.id).await?;

        Ok(BookingDetail {
            booking,
            service,
            assignment,
            segments,
            buffer_requests,
        })
    }

    pub async fn list_bookings(
        &self,
        principal: &Principal,
        mut filter: BookingFilter,
        page: u32,
        limit: usize,
    ) -> Result<(Vec<Booking>, i64), ServiceError> {
        if !principal.is_admin() {
            filter.user_id = Some(principal.user_id);
        }
        Ok(self.db_client.list_bookings(&filter, page, limit).await?)
    }

    pub async fn soft_delete(&self, booking_id: Uuid) -> Result<(), ServiceError> {
        let booking = self
            .db_client
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking"))?;
        if !booking.status.is_terminal() {
            return Err(ServiceError::stale("Only finished bookings can be deleted"));
        }
        if !self.db_client.soft_delete_booking(booking_id).await? {
            return Err(ServiceError::stale("Booking was changed by another request"));
        }
        tracing::info!(booking_id = %booking_id, "Booking soft-deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::usermodel::UserType,
        service::{assignment_service::AssignmentService, fixtures, location_service::LocationService},
    };
    use sqlx::{types::Json, PgPool};

    fn booking(booking_type: BookingType, quote_amount: Option<i64>) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            booking_reference: "BK20250601100000ABC123".to_string(),
            user_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            time_slot_id: None,
            booking_type,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            scheduled_date: None,
            scheduled_time: None,
            scheduled_end_time: None,
            actual_start_time: None,
            actual_end_time: None,
            actual_duration_minutes: None,
            hold_expires_at: None,
            address: Json(BookingAddress::default()),
            description: None,
            contact_person: "Asha".to_string(),
            contact_phone: "9876543210".to_string(),
            special_instructions: None,
            quote_amount,
            quote_notes: None,
            quote_provided_by: None,
            quote_provided_at: None,
            quote_accepted_at: None,
            quote_expires_at: None,
            rejection_reason: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            completion_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(price: Option<i64>) -> Service {
        Service {
            id: Uuid::new_v4(),
            name: "Deep cleaning".to_string(),
            description: None,
            price_type: if price.is_some() {
                crate::models::servicemodel::PriceType::Fixed
            } else {
                crate::models::servicemodel::PriceType::Inquiry
            },
            price,
            duration_minutes: Some(60),
            category_id: None,
            subcategory_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn payable_amount_follows_booking_type() {
        assert_eq!(
            payable_amount(&booking(BookingType::Regular, None), &service(Some(100_000))),
            Some(100_000)
        );
        assert_eq!(
            payable_amount(&booking(BookingType::Inquiry, Some(500_000)), &service(None)),
            Some(500_000)
        );
        assert_eq!(payable_amount(&booking(BookingType::Inquiry, None), &service(None)), None);
    }

    #[test]
    fn refunds_are_full_before_start() {
        assert_eq!(cancellation_refund(100_000, None), 100_000);
        assert_eq!(cancellation_refund(100_000, Some(0)), 0);
        assert_eq!(cancellation_refund(100_000, Some(40)), 40_000);
    }

    #[test]
    fn quote_amount_is_frozen_by_segments() {
        assert!(ensure_quote_amount_editable(0).is_ok());
        let err = ensure_quote_amount_editable(2).unwrap_err();
        assert_eq!(err.code(), "stale_state");
    }

    #[test]
    fn refund_summary_drives_payment_status() {
        let none = RefundSummary::default();
        assert_eq!(
            none.payment_status(PaymentStatus::Pending, PaymentStatus::Cancelled),
            PaymentStatus::Cancelled
        );

        let credited = RefundSummary { credited: 10_000, deferred: 0, settled_payments: 1 };
        assert_eq!(
            credited.payment_status(PaymentStatus::Hold, PaymentStatus::Expired),
            PaymentStatus::Refunded
        );

        let deferred = RefundSummary { credited: 10_000, deferred: 5_000, settled_payments: 2 };
        assert_eq!(
            deferred.payment_status(PaymentStatus::Completed, PaymentStatus::Cancelled),
            PaymentStatus::RefundPending
        );

        let kept = RefundSummary { credited: 0, deferred: 0, settled_payments: 1 };
        assert_eq!(
            kept.payment_status(PaymentStatus::Completed, PaymentStatus::Cancelled),
            PaymentStatus::Completed
        );
    }

    #[test]
    fn transition_guard_reports_stale_state() {
        assert!(ensure_transition(BookingStatus::QuoteProvided, BookingStatus::QuoteAccepted).is_ok());
        let err = ensure_transition(BookingStatus::Completed, BookingStatus::Cancelled).unwrap_err();
        assert_eq!(err.code(), "stale_state");
    }

    fn booking_service(pool: PgPool) -> BookingService {
        let (db_client, gateway) = fixtures::clients(pool);
        BookingService::new(db_client, gateway)
    }

    async fn booking_row(pool: &PgPool, booking_id: Uuid) -> Booking {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn wallet_booking_takes_slot_and_balance(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 2).await;
        let customer = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let bookings = booking_service(pool.clone());

        let outcome = bookings
            .create_booking(&customer, fixtures::wallet_booking(service_id))
            .await
            .unwrap();

        assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Completed);
        assert_eq!(outcome.payment.map(|p| p.amount), Some(fixtures::SERVICE_PRICE));
        let slot_id = outcome.booking.time_slot_id.unwrap();
        assert_eq!(fixtures::slot_available(&pool, slot_id).await, 1);
        assert_eq!(fixtures::wallet_balance(&pool, customer.user_id).await, 400_000);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn last_seat_goes_to_exactly_one_booking(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 1).await;
        let first = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let second = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let bookings = booking_service(pool.clone());
        bookings
            .slots
            .ensure_day(service_id, fixtures::tomorrow(), Utc::now().date_naive())
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            bookings.create_booking(&first, fixtures::wallet_booking(service_id)),
            bookings.create_booking(&second, fixtures::wallet_booking(service_id)),
        );
        let results = [a, b];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(ServiceError::NoCapacity))));
        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        let slot_id = winner.booking.time_slot_id.unwrap();
        assert_eq!(fixtures::slot_available(&pool, slot_id).await, 0);

        let total = fixtures::wallet_balance(&pool, first.user_id).await
            + fixtures::wallet_balance(&pool, second.user_id).await;
        assert_eq!(total, 1_000_000 - fixtures::SERVICE_PRICE);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn cancelling_refunds_wallet_and_frees_slot(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 2).await;
        let customer = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let bookings = booking_service(pool.clone());
        let booking = bookings
            .create_booking(&customer, fixtures::wallet_booking(service_id))
            .await
            .unwrap()
            .booking;

        let cancelled = bookings
            .cancel_booking(&customer, booking.id, "Plans changed".to_string())
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
        assert_eq!(fixtures::slot_available(&pool, booking.time_slot_id.unwrap()).await, 2);
        assert_eq!(fixtures::wallet_balance(&pool, customer.user_id).await, 500_000);

        let again = bookings
            .cancel_booking(&customer, booking.id, "Twice".to_string())
            .await;
        assert!(matches!(again, Err(ServiceError::StaleState(_))));
        assert_eq!(fixtures::slot_available(&pool, booking.time_slot_id.unwrap()).await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn refund_waits_when_wallet_is_full(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 2).await;
        let customer = fixtures::user(&pool, UserType::Normal, 100_000, 100_000).await;
        let bookings = booking_service(pool.clone());
        let booking = bookings
            .create_booking(&customer, fixtures::wallet_booking(service_id))
            .await
            .unwrap()
            .booking;
        sqlx::query("UPDATE users SET wallet_balance = wallet_limit WHERE id = $1")
            .bind(customer.user_id)
            .execute(&pool)
            .await
            .unwrap();

        let cancelled = bookings
            .cancel_booking(&customer, booking.id, "Plans changed".to_string())
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.payment_status, PaymentStatus::RefundPending);
        assert_eq!(fixtures::wallet_balance(&pool, customer.user_id).await, 100_000);
        let parked: PaymentStatus = sqlx::query_scalar(
            "SELECT status FROM payments WHERE related_entity_id = $1 AND payment_type = 'booking'",
        )
        .bind(booking.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(parked, PaymentStatus::RefundPending);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn cancellation_closes_the_assignment(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 1).await;
        let customer = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let admin = fixtures::user(&pool, UserType::Admin, 0, 10_000_000).await;
        let worker = fixtures::user(&pool, UserType::Worker, 0, 10_000_000).await;
        let (db_client, gateway) = fixtures::clients(pool.clone());
        let bookings = BookingService::new(db_client.clone(), gateway);
        let assignments = AssignmentService::new(db_client.clone());
        let locations = LocationService::new(db_client);

        let booking = bookings
            .create_booking(&customer, fixtures::wallet_booking(service_id))
            .await
            .unwrap()
            .booking;
        let assignment = assignments
            .assign_worker(&admin, booking.id, worker.user_id, None)
            .await
            .unwrap();
        assignments.accept(&worker, assignment.id, None).await.unwrap();

        bookings
            .cancel_booking(&customer, booking.id, "No longer needed".to_string())
            .await
            .unwrap();

        let status: AssignmentStatus =
            sqlx::query_scalar("SELECT status FROM worker_assignments WHERE id = $1")
                .bind(assignment.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, AssignmentStatus::Cancelled);
        assert!(matches!(
            assignments.start(&worker, assignment.id, None).await,
            Err(ServiceError::StaleState(_))
        ));
        assert!(matches!(
            locations.update_location(&worker, assignment.id, 12.97, 77.59, None).await,
            Err(ServiceError::StaleState(_))
        ));

        // A row left behind in an open state still cannot act on the closed booking.
        sqlx::query("UPDATE worker_assignments SET status = 'accepted' WHERE id = $1")
            .bind(assignment.id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            assignments.start(&worker, assignment.id, None).await,
            Err(ServiceError::StaleState(_))
        ));
        assert!(matches!(
            locations.update_location(&worker, assignment.id, 12.97, 77.59, None).await,
            Err(ServiceError::StaleState(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn customers_cannot_cancel_started_work(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 1).await;
        let customer = fixtures::user(&pool, UserType::Normal, 500_000, 10_000_000).await;
        let admin = fixtures::user(&pool, UserType::Admin, 0, 10_000_000).await;
        let worker = fixtures::user(&pool, UserType::Worker, 0, 10_000_000).await;
        let (db_client, gateway) = fixtures::clients(pool.clone());
        let bookings = BookingService::new(db_client.clone(), gateway);
        let assignments = AssignmentService::new(db_client);

        let booking = bookings
            .create_booking(&customer, fixtures::wallet_booking(service_id))
            .await
            .unwrap()
            .booking;
        let assignment = assignments
            .assign_worker(&admin, booking.id, worker.user_id, None)
            .await
            .unwrap();
        assignments.accept(&worker, assignment.id, None).await.unwrap();
        assignments.start(&worker, assignment.id, None).await.unwrap();

        assert!(matches!(
            bookings
                .cancel_booking(&customer, booking.id, "Changed my mind".to_string())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
        let status: BookingStatus = sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
            .bind(booking.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, BookingStatus::InProgress);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn quote_amount_is_locked_after_segments(pool: PgPool) {
        let service_id = fixtures::inquiry_service(&pool).await;
        let customer = fixtures::user(&pool, UserType::Normal, 0, 10_000_000).await;
        let admin = fixtures::user(&pool, UserType::Admin, 0, 10_000_000).await;
        let bookings = booking_service(pool.clone());

        let booking_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO bookings
            (booking_reference, user_id, service_id, booking_type, status, address,
             contact_person, contact_phone, quote_amount, quote_provided_at, quote_expires_at)
            VALUES ('BK20250601100000QTE001', $1, $2, 'inquiry', 'quote_provided', $3,
                    'Asha', '9876543210', 500000, NOW(), NOW() + INTERVAL '7 days')
            RETURNING id
            "#,
        )
        .bind(customer.user_id)
        .bind(service_id)
        .bind(Json(fixtures::address()))
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO payment_segments (booking_id, segment_number, amount) VALUES ($1, 1, 200000), ($1, 2, 300000)",
        )
        .bind(booking_id)
        .execute(&pool)
        .await
        .unwrap();

        let refused = bookings
            .update_quote(&admin, booking_id, Some(600_000), None, None)
            .await;
        assert!(matches!(refused, Err(ServiceError::StaleState(_))));
        assert_eq!(booking_row(&pool, booking_id).await.quote_amount, Some(500_000));

        let noted = bookings
            .update_quote(&admin, booking_id, None, Some("Includes materials".to_string()), None)
            .await
            .unwrap();
        assert_eq!(noted.quote_amount, Some(500_000));
        assert_eq!(noted.quote_notes.as_deref(), Some("Includes materials"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn capture_after_hold_lapsed_is_refunded(pool: PgPool) {
        let service_id = fixtures::fixed_service(&pool, 1).await;
        let customer = fixtures::user(&pool, UserType::Normal, 0, 10_000_000).await;
        let bookings = booking_service(pool.clone());

        let booking_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO bookings
            (booking_reference, user_id, service_id, booking_type, status, payment_status,
             hold_expires_at, address, contact_person, contact_phone)
            VALUES ('BK20250601100000HLD001', $1, $2, 'regular', 'temporary_hold', 'pending',
                    NOW() - INTERVAL '1 minute', $3, 'Asha', '9876543210')
            RETURNING id
            "#,
        )
        .bind(customer.user_id)
        .bind(service_id)
        .bind(Json(fixtures::address()))
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO payments
            (payment_reference, user_id, amount, status, payment_type, method,
             related_entity_type, related_entity_id, razorpay_order_id)
            VALUES ('PAY20250601100000LT001', $1, $2, 'pending', 'booking', 'razorpay',
                    'booking', $3, 'order_late_1')
            "#,
        )
        .bind(customer.user_id)
        .bind(fixtures::SERVICE_PRICE)
        .bind(booking_id)
        .execute(&pool)
        .await
        .unwrap();

        let late = bookings.confirm_captured_order("order_late_1", "pay_late_1").await;
        assert!(matches!(late, Err(ServiceError::StaleState(_))));

        let booking = booking_row(&pool, booking_id).await;
        assert_eq!(booking.status, BookingStatus::Expired);
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        let (status, provider_id, refunded): (PaymentStatus, Option<String>, i64) = sqlx::query_as(
            "SELECT status, razorpay_payment_id, refunded_amount FROM payments WHERE razorpay_order_id = 'order_late_1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, PaymentStatus::Refunded);
        assert_eq!(provider_id.as_deref(), Some("pay_late_1"));
        assert_eq!(refunded, fixtures::SERVICE_PRICE);
        assert_eq!(fixtures::wallet_balance(&pool, customer.user_id).await, fixtures::SERVICE_PRICE);

        let replay = bookings.confirm_captured_order("order_late_1", "pay_late_1").await;
        assert!(matches!(replay, Err(ServiceError::StaleState(_))));
        assert_eq!(fixtures::wallet_balance(&pool, customer.user_id).await, fixtures::SERVICE_PRICE);
    }
}
