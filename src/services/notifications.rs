use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::notifications::Notification;
use crate::repositories::businesses::BusinessRepository;
use crate::repositories::notifications::NotificationRepository;

pub enum NotificationRequest {
    ListForBusiness {
        user_id: String,
        business_id: String,
        is_read: Option<bool>,
        response: oneshot::Sender<Result<Vec<Notification>, ServiceError>>,
    },
    MarkRead {
        user_id: String,
        notification_id: String,
        response: oneshot::Sender<Result<Notification, ServiceError>>,
    },
    MarkAllRead {
        user_id: String,
        business_id: String,
        response: oneshot::Sender<Result<u64, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct NotificationRequestHandler {
    businesses: BusinessRepository,
    notifications: NotificationRepository,
}

impl NotificationRequestHandler {
    pub fn new(sql_conn: PgPool) -> Self {
        NotificationRequestHandler {
            businesses: BusinessRepository::new(sql_conn.clone()),
            notifications: NotificationRepository::new(sql_conn),
        }
    }

    async fn ensure_owned(&self, business_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let business = self
            .businesses
            .find_by_id(business_id)
            .await
            .map_err(|e| ServiceError::Repository("Business".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Business".to_string()))?;

        if business.user_id != user_id {
            return Err(ServiceError::AccessDenied);
        }

        Ok(())
    }

    async fn list(
        &self,
        user_id: &str,
        business_id: &str,
        is_read: Option<bool>,
    ) -> Result<Vec<Notification>, ServiceError> {
        self.ensure_owned(business_id, user_id).await?;

        self.notifications
            .list_for_business(business_id, is_read)
            .await
            .map_err(|e| ServiceError::Repository("Notification".to_string(), e.to_string()))
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<Notification, ServiceError> {
        let notification = self
            .notifications
            .find_by_id(notification_id)
            .await
            .map_err(|e| ServiceError::Repository("Notification".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("Notification".to_string()))?;

        self.ensure_owned(&notification.business_id, user_id).await?;

        self.notifications
            .mark_read(&notification.id)
            .await
            .map_err(|e| ServiceError::Repository("Notification".to_string(), e.to_string()))
    }

    async fn mark_all_read(&self, user_id: &str, business_id: &str) -> Result<u64, ServiceError> {
        self.ensure_owned(business_id, user_id).await?;

        self.notifications
            .mark_all_read(business_id)
            .await
            .map_err(|e| ServiceError::Repository("Notification".to_string(), e.to_string()))
    }
}

#[async_trait]
impl RequestHandler<NotificationRequest> for NotificationRequestHandler {
    async fn handle_request(&self, request: NotificationRequest) {
        match request {
            NotificationRequest::ListForBusiness {
                user_id,
                business_id,
                is_read,
                response,
            } => {
                let result = self.list(&user_id, &business_id, is_read).await;
                let _ = response.send(result);
            }
            NotificationRequest::MarkRead {
                user_id,
                notification_id,
                response,
            } => {
                let result = self.mark_read(&user_id, &notification_id).await;
                let _ = response.send(result);
            }
            NotificationRequest::MarkAllRead {
                user_id,
                business_id,
                response,
            } => {
                let result = self.mark_all_read(&user_id, &business_id).await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        NotificationService {}
    }
}

#[async_trait]
impl Service<NotificationRequest, NotificationRequestHandler> for NotificationService {}
