use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::customers::Customer;
use crate::models::extraction::ExtractedPayment;
use crate::models::{businesses::Business, notifications, payments};
use crate::repositories::businesses::BusinessRepository;
use crate::repositories::customers::CustomerRepository;
use crate::repositories::extraction::ExtractionRepository;
use crate::repositories::notifications::NotificationRepository;
use crate::repositories::payments::PaymentRepository;
use crate::repositories::whatsapp::{format_colones, Feedback, WhatsappRepository};

pub enum IngestionRequest {
    /// One inbound chat event. Addresses arrive already stripped of the
    /// `whatsapp:` prefix.
    InboundMessage {
        sender_phone: String,
        recipient_number: String,
        media_url: Option<String>,
        response: oneshot::Sender<IngestionOutcome>,
    },
}

/// How the pipeline classified an event. Every outcome acknowledges the
/// event; the gateway is never asked to redeliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    /// No receipt attached, or the destination number is not registered.
    Ignored,
    ExtractionFailed,
    Duplicate,
    Recorded,
    /// A storage failure mid-pipeline, absorbed and logged.
    Failed,
}

#[derive(Clone)]
pub struct IngestionRequestHandler {
    businesses: BusinessRepository,
    customers: CustomerRepository,
    payments: PaymentRepository,
    notifications: NotificationRepository,
    extraction: Arc<ExtractionRepository>,
    whatsapp: Arc<WhatsappRepository>,
    grace_days: u32,
}

impl IngestionRequestHandler {
    pub fn new(
        sql_conn: PgPool,
        extraction: Arc<ExtractionRepository>,
        whatsapp: Arc<WhatsappRepository>,
        grace_days: u32,
    ) -> Self {
        IngestionRequestHandler {
            businesses: BusinessRepository::new(sql_conn.clone()),
            customers: CustomerRepository::new(sql_conn.clone()),
            payments: PaymentRepository::new(sql_conn.clone()),
            notifications: NotificationRepository::new(sql_conn),
            extraction,
            whatsapp,
            grace_days,
        }
    }

    async fn process_message(
        &self,
        sender_phone: &str,
        recipient_number: &str,
        media_url: Option<&str>,
    ) -> Result<IngestionOutcome, ServiceError> {
        // Messages without a receipt image are not business input.
        let media_url = match media_url {
            Some(url) => url,
            None => return Ok(IngestionOutcome::Ignored),
        };

        // Unregistered destinations are dropped silently; the gateway may
        // deliver to numbers that have not been onboarded yet.
        let business = match self
            .businesses
            .find_by_whatsapp_number(recipient_number)
            .await
            .map_err(|e| ServiceError::Repository("Business".to_string(), e.to_string()))?
        {
            Some(business) => business,
            None => {
                log::info!("No business registered for {}", recipient_number);
                return Ok(IngestionOutcome::Ignored);
            }
        };

        log::info!(
            "Processing payment from {} for business {}",
            sender_phone,
            business.business_name
        );

        // Extraction failure is terminal for the event, not for the service.
        let extracted = match self.extraction.extract(media_url).await {
            Ok(extracted) => extracted,
            Err(e) => {
                log::error!("Failed to extract payment data: {}", e);
                self.send_feedback(sender_phone, Feedback::ProcessingError).await;
                return Ok(IngestionOutcome::ExtractionFailed);
            }
        };

        let duplicate = self
            .payments
            .find_by_sinpe_reference(&business.id, &extracted.sinpe_reference)
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        if duplicate.is_some() {
            return self
                .record_duplicate(&business, &extracted, sender_phone, media_url)
                .await;
        }

        let customer = self.resolve_customer(&business, &extracted).await?;

        let mismatch = business.is_membership()
            && amount_mismatch(customer.monthly_fee_in_cents, extracted.amount_in_cents);
        let (period_month, period_year) = if business.is_membership() {
            let (month, year) = payment_period(&extracted.payment_date);
            (Some(month), Some(year))
        } else {
            (None, None)
        };

        let payment = self
            .payments
            .insert(payments::NewPayment {
                business_id: business.id.clone(),
                customer_id: Some(customer.id.clone()),
                amount_in_cents: extracted.amount_in_cents,
                payment_date: extracted.payment_date,
                sinpe_reference: Some(extracted.sinpe_reference.clone()),
                sender_name: extracted.sender_name.clone(),
                sender_phone: Some(extracted.sender_phone.clone()),
                image_url: Some(media_url.to_string()),
                payment_period_month: period_month,
                payment_period_year: period_year,
                is_duplicate_flag: false,
                amount_mismatch_flag: mismatch,
                status: payments::STATUS_CONFIRMED.to_string(),
            })
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        log::info!("Payment created: {}", payment.id);

        self.update_metrics(&business, &customer, &extracted, &payment.id)
            .await?;

        if mismatch {
            let monthly_fee = customer.monthly_fee_in_cents.unwrap_or_default();
            self.notify(
                &business.id,
                Some(&payment.id),
                notifications::TYPE_AMOUNT_MISMATCH,
                &format!(
                    "Monto incorrecto: {} pagó ₡{}, se esperaba ₡{}",
                    customer.full_name,
                    format_colones(extracted.amount_in_cents),
                    format_colones(monthly_fee)
                ),
            )
            .await;

            self.send_feedback(
                sender_phone,
                Feedback::AmountMismatch {
                    amount_in_cents: extracted.amount_in_cents,
                    monthly_fee_in_cents: monthly_fee,
                },
            )
            .await;
        }

        // Clean payments produce no reply to the sender.
        Ok(IngestionOutcome::Recorded)
    }

    /// Records the repeat as a flagged pending row with no customer link.
    /// History is preserved; metrics are never touched on this path.
    async fn record_duplicate(
        &self,
        business: &Business,
        extracted: &ExtractedPayment,
        sender_phone: &str,
        media_url: &str,
    ) -> Result<IngestionOutcome, ServiceError> {
        log::info!("Duplicate payment detected: {}", extracted.sinpe_reference);

        self.payments
            .insert(payments::NewPayment {
                business_id: business.id.clone(),
                customer_id: None,
                amount_in_cents: extracted.amount_in_cents,
                payment_date: extracted.payment_date,
                sinpe_reference: Some(extracted.sinpe_reference.clone()),
                sender_name: extracted.sender_name.clone(),
                sender_phone: Some(extracted.sender_phone.clone()),
                image_url: Some(media_url.to_string()),
                payment_period_month: None,
                payment_period_year: None,
                is_duplicate_flag: true,
                amount_mismatch_flag: false,
                status: payments::STATUS_PENDING.to_string(),
            })
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        self.notify(
            &business.id,
            None,
            notifications::TYPE_DUPLICATE_PAYMENT,
            &format!(
                "Pago duplicado detectado. Referencia SINPE: {}, Monto: ₡{}",
                extracted.sinpe_reference,
                format_colones(extracted.amount_in_cents)
            ),
        )
        .await;

        self.send_feedback(sender_phone, Feedback::DuplicatePayment).await;

        Ok(IngestionOutcome::Duplicate)
    }

    async fn resolve_customer(
        &self,
        business: &Business,
        extracted: &ExtractedPayment,
    ) -> Result<Customer, ServiceError> {
        let existing = self
            .customers
            .find_by_phone(&business.id, &extracted.sender_phone)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

        if let Some(customer) = existing {
            return Ok(customer);
        }

        log::info!("Creating new customer: {}", extracted.sender_phone);

        let full_name = extracted.sender_name.as_deref().unwrap_or("Unknown");
        let customer = self
            .customers
            .insert_from_payment(&business.id, &extracted.sender_phone, full_name)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

        self.notify(
            &business.id,
            None,
            notifications::TYPE_NEW_CUSTOMER,
            &format!("Nuevo cliente creado: {} ({})", full_name, extracted.sender_phone),
        )
        .await;

        Ok(customer)
    }

    async fn update_metrics(
        &self,
        business: &Business,
        customer: &Customer,
        extracted: &ExtractedPayment,
        payment_id: &str,
    ) -> Result<(), ServiceError> {
        if business.is_product_sales() {
            self.customers
                .record_product_sale(
                    &customer.id,
                    extracted.amount_in_cents,
                    extracted.payment_date,
                )
                .await
                .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;
        } else if business.is_membership() {
            let on_time = is_on_time(
                &extracted.payment_date,
                customer.payment_due_day,
                self.grace_days,
            );

            self.customers
                .record_membership_payment(&customer.id, on_time)
                .await
                .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

            self.notify(
                &business.id,
                Some(payment_id),
                notifications::TYPE_PAYMENT_RECEIVED,
                &format!(
                    "Pago recibido: {} - ₡{} ({})",
                    customer.full_name,
                    format_colones(extracted.amount_in_cents),
                    if on_time { "A tiempo" } else { "Tardío" }
                ),
            )
            .await;
        }

        Ok(())
    }

    /// Best effort: the payment is already recorded, a lost alert is logged
    /// and the event still completes.
    async fn notify(
        &self,
        business_id: &str,
        payment_id: Option<&str>,
        notification_type: &str,
        message: &str,
    ) {
        if let Err(e) = self
            .notifications
            .insert(business_id, payment_id, notification_type, message)
            .await
        {
            log::error!("Failed to write {} notification: {}", notification_type, e);
        }
    }

    async fn send_feedback(&self, to: &str, feedback: Feedback) {
        if let Err(e) = self.whatsapp.send_feedback(to, feedback).await {
            log::error!("Failed to send feedback to {}: {}", to, e);
        }
    }
}

#[async_trait]
impl RequestHandler<IngestionRequest> for IngestionRequestHandler {
    async fn handle_request(&self, request: IngestionRequest) {
        match request {
            IngestionRequest::InboundMessage {
                sender_phone,
                recipient_number,
                media_url,
                response,
            } => {
                let outcome = match self
                    .process_message(&sender_phone, &recipient_number, media_url.as_deref())
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::error!("Ingestion pipeline error: {}", e);
                        IngestionOutcome::Failed
                    }
                };

                let _ = response.send(outcome);
            }
        }
    }
}

/// Calendar month and year the payment covers, for membership businesses.
pub fn payment_period(payment_date: &DateTime<Utc>) -> (i32, i32) {
    (payment_date.month() as i32, payment_date.year())
}

/// A payment is on time while the day of month is within the due day plus
/// the grace window. Customers without a due day fall back to the 1st.
pub fn is_on_time(payment_date: &DateTime<Utc>, due_day: Option<i32>, grace_days: u32) -> bool {
    let due_day = due_day.unwrap_or(1);
    payment_date.day() as i32 <= due_day + grace_days as i32
}

/// Exact céntimo comparison, no tolerance band. Customers without a
/// configured fee never mismatch.
pub fn amount_mismatch(monthly_fee_in_cents: Option<i64>, amount_in_cents: i64) -> bool {
    match monthly_fee_in_cents {
        Some(fee) => fee != amount_in_cents,
        None => false,
    }
}

pub struct IngestionService;

impl IngestionService {
    pub fn new() -> Self {
        IngestionService {}
    }
}

#[async_trait]
impl Service<IngestionRequest, IngestionRequestHandler> for IngestionService {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 14, 10, 0).unwrap()
    }

    #[test]
    fn grace_window_bounds() {
        // Due on the 15th with five days of grace: the 20th is the last
        // on-time day.
        assert!(is_on_time(&date(2026, 2, 20), Some(15), 5));
        assert!(!is_on_time(&date(2026, 2, 21), Some(15), 5));
    }

    #[test]
    fn missing_due_day_defaults_to_first() {
        assert!(is_on_time(&date(2026, 2, 6), None, 5));
        assert!(!is_on_time(&date(2026, 2, 7), None, 5));
    }

    #[test]
    fn on_time_within_period() {
        assert!(is_on_time(&date(2026, 3, 12), Some(10), 5));
        assert!(is_on_time(&date(2026, 3, 1), Some(10), 5));
    }

    #[test]
    fn period_is_calendar_month_and_year() {
        assert_eq!(payment_period(&date(2026, 2, 1)), (2, 2026));
        assert_eq!(payment_period(&date(2025, 12, 31)), (12, 2025));
    }

    #[test]
    fn mismatch_is_exact() {
        assert!(!amount_mismatch(Some(1_000_000), 1_000_000));
        assert!(amount_mismatch(Some(1_000_000), 1_200_000));
        assert!(amount_mismatch(Some(1_000_000), 1_000_001));
        assert!(!amount_mismatch(None, 1_200_000));
    }
}
