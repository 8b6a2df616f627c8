use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw JSON shape the extraction model is instructed to return. Everything is
/// optional here; required-field validation happens in the repository.
#[derive(Debug, Deserialize)]
pub struct ReceiptFields {
    pub amount: Option<f64>,
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sinpe_reference: Option<String>,
    pub payment_date: Option<String>,
}

/// A validated payment observation handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct ExtractedPayment {
    pub amount_in_cents: i64,
    pub sender_name: Option<String>,
    pub sender_phone: String,
    pub sinpe_reference: String,
    pub payment_date: DateTime<Utc>,
}
