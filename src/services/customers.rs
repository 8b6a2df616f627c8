use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::businesses::Business;
use crate::models::customers::{Customer, RegisterCustomer, UpdateCustomer};
use crate::repositories::businesses::BusinessRepository;
use crate::repositories::customers::CustomerRepository;

pub enum CustomerRequest {
    Register {
        user_id: String,
        request: RegisterCustomer,
        response: oneshot::Sender<Result<Customer, ServiceError>>,
    },
    List {
        user_id: String,
        business_id: String,
        response: oneshot::Sender<Result<Vec<Customer>, ServiceError>>,
    },
    Get {
        user_id: String,
        customer_id: String,
        response: oneshot::Sender<Result<Customer, ServiceError>>,
    },
    Update {
        user_id: String,
        customer_id: String,
        update: UpdateCustomer,
        response: oneshot::Sender<Result<Customer, ServiceError>>,
    },
    Delete {
        user_id: String,
        customer_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Clone)]
pub struct CustomerRequestHandler {
    businesses: BusinessRepository,
    customers: CustomerRepository,
}

impl CustomerRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        CustomerRequestHandler {
            businesses: BusinessRepository::new(sql_conn.clone()),
            customers: CustomerRepository::new(sql_conn),
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

    async fn owned_customer(
        &self,
        customer_id: &str,
        user_id: &str,
    ) -> Result<Customer, ServiceError> {
        let customer = self
            .customers
            .find_by_id(customer_id)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Customer".to_string()))?;

        self.owned_business(&customer.business_id, user_id).await?;

        Ok(customer)
    }

    /// Owner-registered customers are verified from the start and, for
    /// membership businesses, must arrive with the membership fields set.
    async fn register(
        &self,
        user_id: &str,
        request: RegisterCustomer,
    ) -> Result<Customer, ServiceError> {
        let business = self.owned_business(&request.business_id, user_id).await?;

        let existing = self
            .customers
            .find_by_phone(&business.id, &request.phone)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))?;

        if existing.is_some() {
            return Err(ServiceError::Validation(
                "Customer already exists with this phone number".to_string(),
            ));
        }

        if business.is_membership() && missing_membership_fields(&request) {
            return Err(ServiceError::Validation(
                "payment_due_day, monthly_fee_in_cents, and membership_start_date are required for membership businesses".to_string(),
            ));
        }

        self.customers
            .insert_registered(&request)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))
    }

    async fn list(&self, user_id: &str, business_id: &str) -> Result<Vec<Customer>, ServiceError> {
        self.owned_business(business_id, user_id).await?;

        self.customers
            .list_for_business(business_id)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))
    }

    async fn update(
        &self,
        user_id: &str,
        customer_id: &str,
        update: UpdateCustomer,
    ) -> Result<Customer, ServiceError> {
        let customer = self.owned_customer(customer_id, user_id).await?;

        self.customers
            .update_profile(&customer.id, &update)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))
    }

    async fn delete(&self, user_id: &str, customer_id: &str) -> Result<(), ServiceError> {
        let customer = self.owned_customer(customer_id, user_id).await?;

        self.customers
            .delete(&customer.id)
            .await
            .map_err(|e| ServiceError::Repository("Customer".to_string(), e.to_string()))
    }
}

fn missing_membership_fields(request: &RegisterCustomer) -> bool {
    request.payment_due_day.is_none()
        || request.monthly_fee_in_cents.is_none()
        || request.membership_start_date.is_none()
}

#[async_trait]
impl RequestHandler<CustomerRequest> for CustomerRequestHandler {
    async fn handle_request(&self, request: CustomerRequest) {
        match request {
            CustomerRequest::Register {
                user_id,
                request,
                response,
            } => {
                let result = self.register(&user_id, request).await;
                let _ = response.send(result);
            }
            CustomerRequest::List {
                user_id,
                business_id,
                response,
            } => {
                let result = self.list(&user_id, &business_id).await;
                let _ = response.send(result);
            }
            CustomerRequest::Get {
                user_id,
                customer_id,
                response,
            } => {
                let result = self.owned_customer(&customer_id, &user_id).await;
                let _ = response.send(result);
            }
            CustomerRequest::Update {
                user_id,
                customer_id,
                update,
                response,
            } => {
                let result = self.update(&user_id, &customer_id, update).await;
                let _ = response.send(result);
            }
            CustomerRequest::Delete {
                user_id,
                customer_id,
                response,
            } => {
                let result = self.delete(&user_id, &customer_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct CustomerService;

impl CustomerService {
    pub fn new() -> Self {
        CustomerService {}
    }
}

#[async_trait]
impl Service<CustomerRequest, CustomerRequestHandler> for CustomerService {}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        due_day: Option<i32>,
        fee: Option<i64>,
        start: Option<&str>,
    ) -> RegisterCustomer {
        RegisterCustomer {
            business_id: "b1".to_string(),
            phone: "+50688887777".to_string(),
            full_name: "Ana Mora".to_string(),
            payment_due_day: due_day,
            monthly_fee_in_cents: fee,
            membership_start_date: start.map(|s| s.parse().unwrap()),
        }
    }

    #[test]
    fn membership_fields_must_all_be_present() {
        assert!(!missing_membership_fields(&request(
            Some(10),
            Some(1_000_000),
            Some("2026-01-01")
        )));
        assert!(missing_membership_fields(&request(None, Some(1_000_000), Some("2026-01-01"))));
        assert!(missing_membership_fields(&request(Some(10), None, Some("2026-01-01"))));
        assert!(missing_membership_fields(&request(Some(10), Some(1_000_000), None)));
    }
}
