use crate::models::notifications::Notification;

use sqlx::PgPool;
use uuid::Uuid;

/// Owner-facing alert feed. Append-only except for the read flag.
#[derive(Clone)]
pub struct NotificationRepository {
    conn: PgPool,
}

impl NotificationRepository {
    pub fn new(conn: PgPool) -> Self {
        NotificationRepository { conn }
    }

    pub async fn insert(
        &self,
        business_id: &str,
        payment_id: Option<&str>,
        notification_type: &str,
        message: &str,
    ) -> Result<Notification, anyhow::Error> {
        let notification_id = Uuid::new_v4().hyphenated().to_string();

        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, business_id, payment_id, notification_type, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&notification_id)
        .bind(business_id)
        .bind(payment_id)
        .bind(notification_type)
        .bind(message)
        .fetch_one(&self.conn)
        .await?;

        Ok(notification)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Notification>, anyhow::Error> {
        let notification =
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.conn)
                .await?;

        Ok(notification)
    }

    pub async fn list_for_business(
        &self,
        business_id: &str,
        is_read: Option<bool>,
    ) -> Result<Vec<Notification>, anyhow::Error> {
        let notifications = match is_read {
            Some(is_read) => {
                sqlx::query_as::<_, Notification>(
                    "SELECT * FROM notifications WHERE business_id = $1 AND is_read = $2 ORDER BY created_at DESC",
                )
                .bind(business_id)
                .bind(is_read)
                .fetch_all(&self.conn)
                .await?
            }
            None => {
                sqlx::query_as::<_, Notification>(
                    "SELECT * FROM notifications WHERE business_id = $1 ORDER BY created_at DESC",
                )
                .bind(business_id)
                .fetch_all(&self.conn)
                .await?
            }
        };

        Ok(notifications)
    }

    pub async fn mark_read(&self, id: &str) -> Result<Notification, anyhow::Error> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.conn)
        .await?;

        Ok(notification)
    }

    pub async fn mark_all_read(&self, business_id: &str) -> Result<u64, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE business_id = $1 AND is_read = FALSE",
        )
        .bind(business_id)
        .execute(&self.conn)
        .await?;

        Ok(result.rows_affected())
    }
}
