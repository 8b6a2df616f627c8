use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TYPE_DUPLICATE_PAYMENT: &str = "duplicate_payment";
pub const TYPE_NEW_CUSTOMER: &str = "new_customer";
pub const TYPE_PAYMENT_RECEIVED: &str = "payment_received";
pub const TYPE_AMOUNT_MISMATCH: &str = "amount_mismatch";
pub const TYPE_OVERDUE_PAYMENT: &str = "overdue_payment";

#[derive(Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub business_id: String,
    pub payment_id: Option<String>,
    pub notification_type: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
