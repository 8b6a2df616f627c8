use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize)]
pub struct Webhook {
    pub verify_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Twilio {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Anthropic {
    pub api_key: String,
    #[serde(default = "default_anthropic_url")]
    pub url: String,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jobs {
    /// Costa Rica runs at UTC-6 year round.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    #[serde(default)]
    pub overdue_hour: u32,
    #[serde(default = "default_metrics_hour")]
    pub metrics_hour: u32,
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,
    #[serde(default = "default_frequent_buyer_min_purchases")]
    pub frequent_buyer_min_purchases: i32,
    #[serde(default = "default_frequent_buyer_window_days")]
    pub frequent_buyer_window_days: i64,
}

impl Default for Jobs {
    fn default() -> Self {
        Jobs {
            utc_offset_hours: default_utc_offset(),
            overdue_hour: 0,
            metrics_hour: default_metrics_hour(),
            grace_days: default_grace_days(),
            frequent_buyer_min_purchases: default_frequent_buyer_min_purchases(),
            frequent_buyer_window_days: default_frequent_buyer_window_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Messages {
    #[serde(default = "default_duplicate_message")]
    pub duplicate_payment: String,
    /// `{amount}` and `{monthly_fee}` are interpolated before sending.
    #[serde(default = "default_mismatch_message")]
    pub amount_mismatch: String,
    #[serde(default = "default_processing_error_message")]
    pub processing_error: String,
    #[serde(default = "default_fallback_message")]
    pub fallback: String,
}

impl Default for Messages {
    fn default() -> Self {
        Messages {
            duplicate_payment: default_duplicate_message(),
            amount_mismatch: default_mismatch_message(),
            processing_error: default_processing_error_message(),
            fallback: default_fallback_message(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub http: Http,
    pub webhook: Webhook,
    pub twilio: Twilio,
    pub anthropic: Anthropic,
    #[serde(default)]
    pub jobs: Jobs,
    #[serde(default)]
    pub messages: Messages,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        config.try_deserialize()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_extraction_timeout() -> u64 {
    30
}

fn default_utc_offset() -> i32 {
    -6
}

fn default_metrics_hour() -> u32 {
    1
}

fn default_grace_days() -> u32 {
    5
}

fn default_frequent_buyer_min_purchases() -> i32 {
    5
}

fn default_frequent_buyer_window_days() -> i64 {
    30
}

fn default_duplicate_message() -> String {
    "Este pago ya fue registrado. Por favor contacte al negocio.".to_string()
}

fn default_mismatch_message() -> String {
    "El monto recibido (₡{amount}) no coincide con su cuota mensual (₡{monthly_fee}). Por favor contacte al negocio.".to_string()
}

fn default_processing_error_message() -> String {
    "No pudimos procesar su pago. Por favor contacte al negocio.".to_string()
}

fn default_fallback_message() -> String {
    "Hubo un problema procesando su pago. Por favor contacte al negocio.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_defaults_match_costa_rica_schedule() {
        let jobs = Jobs::default();
        assert_eq!(jobs.utc_offset_hours, -6);
        assert_eq!(jobs.overdue_hour, 0);
        assert_eq!(jobs.metrics_hour, 1);
        assert_eq!(jobs.grace_days, 5);
    }

    #[test]
    fn mismatch_template_carries_both_placeholders() {
        let messages = Messages::default();
        assert!(messages.amount_mismatch.contains("{amount}"));
        assert!(messages.amount_mismatch.contains("{monthly_fee}"));
    }
}
