use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_REJECTED: &str = "rejected";

pub fn is_valid_status(status: &str) -> bool {
    matches!(status, STATUS_CONFIRMED | STATUS_PENDING | STATUS_REJECTED)
}

#[derive(Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: String,
    pub business_id: String,
    pub customer_id: Option<String>,
    pub amount_in_cents: i64,
    pub payment_date: DateTime<Utc>,
    pub sinpe_reference: Option<String>,
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub image_url: Option<String>,
    pub payment_period_month: Option<i32>,
    pub payment_period_year: Option<i32>,
    pub is_duplicate_flag: bool,
    pub amount_mismatch_flag: bool,
    pub status: String,
}

/// Insert parameters for a payment row. Rows are immutable once written
/// except for status transitions.
pub struct NewPayment {
    pub business_id: String,
    pub customer_id: Option<String>,
    pub amount_in_cents: i64,
    pub payment_date: DateTime<Utc>,
    pub sinpe_reference: Option<String>,
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub image_url: Option<String>,
    pub payment_period_month: Option<i32>,
    pub payment_period_year: Option<i32>,
    pub is_duplicate_flag: bool,
    pub amount_mismatch_flag: bool,
    pub status: String,
}

#[derive(Deserialize)]
pub struct ManualPayment {
    pub business_id: String,
    pub customer_id: Option<String>,
    pub amount_in_cents: i64,
    pub payment_date: DateTime<Utc>,
    pub sinpe_reference: Option<String>,
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
}

#[derive(Deserialize)]
pub struct ImagePayment {
    pub business_id: String,
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_values() {
        assert!(is_valid_status("confirmed"));
        assert!(is_valid_status("pending"));
        assert!(is_valid_status("rejected"));
        assert!(!is_valid_status("paid"));
        assert!(!is_valid_status(""));
    }
}
