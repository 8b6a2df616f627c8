use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub business_id: String,
    pub phone: String,
    pub full_name: String,
    pub is_verified: bool,
    pub payment_due_day: Option<i32>,
    pub monthly_fee_in_cents: Option<i64>,
    pub membership_start_date: Option<NaiveDate>,
    pub total_purchases: i32,
    pub total_spent_in_cents: i64,
    pub last_purchase_date: Option<DateTime<Utc>>,
    pub on_time_payment_count: i32,
    pub late_payment_count: i32,
    pub is_overdue: bool,
    pub good_standing: bool,
    pub frequent_buyer: bool,
}

#[derive(Deserialize)]
pub struct RegisterCustomer {
    pub business_id: String,
    pub phone: String,
    pub full_name: String,
    pub payment_due_day: Option<i32>,
    pub monthly_fee_in_cents: Option<i64>,
    pub membership_start_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct UpdateCustomer {
    pub full_name: Option<String>,
    pub is_verified: Option<bool>,
    pub payment_due_day: Option<i32>,
    pub monthly_fee_in_cents: Option<i64>,
}

/// Row shape returned by the overdue scan query.
#[derive(Clone, sqlx::FromRow)]
pub struct OverdueCandidate {
    pub id: String,
    pub business_id: String,
    pub phone: String,
    pub full_name: String,
}
