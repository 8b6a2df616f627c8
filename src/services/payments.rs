use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::ingestion::{amount_mismatch, is_on_time, payment_period};
use super::{RequestHandler, Service, ServiceError};
use crate::models::businesses::Business;
use crate::models::customers::Customer;
use crate::models::payments::{self, ImagePayment, ManualPayment, NewPayment, Payment};
use crate::repositories::businesses::BusinessRepository;
use crate::repositories::customers::CustomerRepository;
use crate::repositories::extraction::ExtractionRepository;
use crate::repositories::payments::PaymentRepository;

/// Operator-entered paths. Unlike the webhook pipeline, invalid input here is
/// rejected synchronously with a structured reason.
pub enum PaymentRequest {
    ManualEntry {
        user_id: String,
        payment: ManualPayment,
        response: oneshot::Sender<Result<Payment, ServiceError>>,
    },
    FromImage {
        user_id: String,
        request: ImagePayment,
        response: oneshot::Sender<Result<Payment, ServiceError>>,
    },
    UpdateStatus {
        user_id: String,
        payment_id: String,
        status: String,
        response: oneshot::Sender<Result<Payment, ServiceError>>,
    },
    ListForBusiness {
        user_id: String,
        business_id: String,
        response: oneshot::Sender<Result<Vec<Payment>, ServiceError>>,
    },
    Get {
        user_id: String,
        payment_id: String,
        response: oneshot::Sender<Result<Payment, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct PaymentRequestHandler {
    businesses: BusinessRepository,
    customers: CustomerRepository,
    payments: PaymentRepository,
    extraction: Arc<ExtractionRepository>,
    grace_days: u32,
}

impl PaymentRequestHandler {
    pub fn new(sql_conn: PgPool, extraction: Arc<ExtractionRepository>, grace_days: u32) -> Self {
        PaymentRequestHandler {
            businesses: BusinessRepository::new(sql_conn.clone()),
            customers: CustomerRepository::new(sql_conn.clone()),
            payments: PaymentRepository::new(sql_conn),
            extraction,
            grace_days,
        }
    }

    async fn owned_business(
        &self,
        business_id: &str,
        user_id: &str,
    ) -> Result<Business, ServiceError> {
        let business = self
            .businesses
            .find_by_id(business_id)
            .await
            .map_err(|e| ServiceError::Repository("Business".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Business".to_string()))?;

        if business.user_id != user_id {
            return Err(ServiceError::AccessDenied);
        }

        Ok(business)
    }

    async fn manual_entry(
        &self,
        user_id: &str,
        manual: ManualPayment,
    ) -> Result<Payment, ServiceError> {
        let business = self.owned_business(&manual.business_id, user_id).await?;

        if let Some(reference) = manual.sinpe_reference.as_deref() {
            let duplicate = self
                .payments
                .find_by_sinpe_reference(&business.id, reference)
                .await
                .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

            if duplicate.is_some() {
                return Err(ServiceError::Validation(
                    "Payment with this SINPE reference already exists".to_string(),
                ));
            }
        }

        let customer = match manual.customer_id.as_deref() {
            Some(customer_id) => {
                let customer = self
                    .customers
                    .find_by_id(customer_id)
                    .await
                    .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

                match customer {
                    Some(customer) if customer.business_id == business.id => Some(customer),
                    _ => {
                        return Err(ServiceError::Validation(
                            "Invalid customer for this business".to_string(),
                        ))
                    }
                }
            }
            None => None,
        };

        let (period_month, period_year) = membership_period(&business, &manual.payment_date);

        let payment = self
            .payments
            .insert(NewPayment {
                business_id: business.id.clone(),
                customer_id: customer.as_ref().map(|c| c.id.clone()),
                amount_in_cents: manual.amount_in_cents,
                payment_date: manual.payment_date,
                sinpe_reference: manual.sinpe_reference.clone(),
                sender_name: manual.sender_name.clone(),
                sender_phone: manual.sender_phone.clone(),
                image_url: None,
                payment_period_month: period_month,
                payment_period_year: period_year,
                is_duplicate_flag: false,
                amount_mismatch_flag: false,
                status: payments::STATUS_CONFIRMED.to_string(),
            })
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        if let Some(customer) = customer {
            self.apply_metrics(&business, &customer, manual.amount_in_cents, manual.payment_date)
                .await?;
        }

        Ok(payment)
    }

    async fn from_image(
        &self,
        user_id: &str,
        request: ImagePayment,
    ) -> Result<Payment, ServiceError> {
        let business = self.owned_business(&request.business_id, user_id).await?;

        let extracted = self.extraction.extract(&request.image_url).await.map_err(|e| {
            ServiceError::ExternalService(
                "Payment".to_string(),
                "Extraction".to_string(),
                e.to_string(),
            )
        })?;

        let duplicate = self
            .payments
            .find_by_sinpe_reference(&business.id, &extracted.sinpe_reference)
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        if duplicate.is_some() {
            return Err(ServiceError::Validation(
                "Duplicate payment detected".to_string(),
            ));
        }

        let customer = match self
            .customers
            .find_by_phone(&business.id, &extracted.sender_phone)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?
        {
            Some(customer) => customer,
            None => self
                .customers
                .insert_from_payment(
                    &business.id,
                    &extracted.sender_phone,
                    extracted.sender_name.as_deref().unwrap_or("Unknown"),
                )
                .await
                .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?,
        };

        let mismatch = business.is_membership()
            && amount_mismatch(customer.monthly_fee_in_cents, extracted.amount_in_cents);
        let (period_month, period_year) = membership_period(&business, &extracted.payment_date);

        let payment = self
            .payments
            .insert(NewPayment {
                business_id: business.id.clone(),
                customer_id: Some(customer.id.clone()),
                amount_in_cents: extracted.amount_in_cents,
                payment_date: extracted.payment_date,
                sinpe_reference: Some(extracted.sinpe_reference.clone()),
                sender_name: extracted.sender_name.clone(),
                sender_phone: Some(extracted.sender_phone.clone()),
                image_url: Some(request.image_url.clone()),
                payment_period_month: period_month,
                payment_period_year: period_year,
                is_duplicate_flag: false,
                amount_mismatch_flag: mismatch,
                status: payments::STATUS_CONFIRMED.to_string(),
            })
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?;

        self.apply_metrics(&business, &customer, extracted.amount_in_cents, extracted.payment_date)
            .await?;

        Ok(payment)
    }

    async fn apply_metrics(
        &self,
        business: &Business,
        customer: &Customer,
        amount_in_cents: i64,
        payment_date: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if business.is_product_sales() {
            self.customers
                .record_product_sale(&customer.id, amount_in_cents, payment_date)
                .await
                .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;
        } else if business.is_membership() {
            let on_time = is_on_time(&payment_date, customer.payment_due_day, self.grace_days);
            self.customers
                .record_membership_payment(&customer.id, on_time)
                .await
                .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;
        }

        Ok(())
    }

    async fn update_status(
        &self,
        user_id: &str,
        payment_id: &str,
        status: &str,
    ) -> Result<Payment, ServiceError> {
        if !payments::is_valid_status(status) {
            return Err(ServiceError::Validation("Invalid status".to_string()));
        }

        let payment = self.get(user_id, payment_id).await?;

        self.payments
            .update_status(&payment.id, status)
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))
    }

    async fn list_for_business(
        &self,
        user_id: &str,
        business_id: &str,
    ) -> Result<Vec<Payment>, ServiceError> {
        self.owned_business(business_id, user_id).await?;

        self.payments
            .list_for_business(business_id)
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))
    }

    async fn get(&self, user_id: &str, payment_id: &str) -> Result<Payment, ServiceError> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await
            .map_err(|e| ServiceError::Repository("Payment".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Payment".to_string()))?;

        self.owned_business(&payment.business_id, user_id).await?;

        Ok(payment)
    }
}

fn membership_period(
    business: &Business,
    payment_date: &DateTime<Utc>,
) -> (Option<i32>, Option<i32>) {
    if business.is_membership() {
        let (month, year) = payment_period(payment_date);
        (Some(month), Some(year))
    } else {
        (None, None)
    }
}

#[async_trait]
impl RequestHandler<PaymentRequest> for PaymentRequestHandler {
    async fn handle_request(&self, request: PaymentRequest) {
        match request {
            PaymentRequest::ManualEntry {
                user_id,
                payment,
                response,
            } => {
                let result = self.manual_entry(&user_id, payment).await;
                let _ = response.send(result);
            }
            PaymentRequest::FromImage {
                user_id,
                request,
                response,
            } => {
                let result = self.from_image(&user_id, request).await;
                let _ = response.send(result);
            }
            PaymentRequest::UpdateStatus {
                user_id,
                payment_id,
                status,
                response,
            } => {
                let result = self.update_status(&user_id, &payment_id, &status).await;
                let _ = response.send(result);
            }
            PaymentRequest::ListForBusiness {
                user_id,
                business_id,
                response,
            } => {
                let result = self.list_for_business(&user_id, &business_id).await;
                let _ = response.send(result);
            }
            PaymentRequest::Get {
                user_id,
                payment_id,
                response,
            } => {
                let result = self.get(&user_id, &payment_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct PaymentService;

impl PaymentService {
    pub fn new() -> Self {
        PaymentService {}
    }
}

#[async_trait]
impl Service<PaymentRequest, PaymentRequestHandler> for PaymentService {}
