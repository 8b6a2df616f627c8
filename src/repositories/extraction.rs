use crate::models::extraction::{ExtractedPayment, ReceiptFields};
use crate::settings;

use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

mod anthropic;

/// Wraps the receipt-understanding call. The pipeline only ever sees one
/// opaque failure out of this; the sub-cause lands in the logs.
pub struct ExtractionRepository {
    api: anthropic::AnthropicApi,
    twilio_account_sid: String,
    twilio_auth_token: String,
    client: reqwest::Client,
}

impl ExtractionRepository {
    pub fn new(anthropic: settings::Anthropic, twilio: settings::Twilio) -> Self {
        let timeout = std::time::Duration::from_secs(anthropic.timeout_secs);
        let api = anthropic::AnthropicApi::new(
            anthropic.api_key,
            anthropic.url,
            anthropic.model,
            timeout,
        );

        ExtractionRepository {
            api,
            twilio_account_sid: twilio.account_sid,
            twilio_auth_token: twilio.auth_token,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn extract(&self, image_url: &str) -> Result<ExtractedPayment, anyhow::Error> {
        let (image_base64, media_type) = self.download_image(image_url).await?;
        let response_text = self.api.read_receipt(&image_base64, &media_type).await?;

        log::debug!("Extraction model response: {}", response_text);

        let json = find_json_object(&response_text)
            .ok_or_else(|| anyhow!("No JSON object in extraction response"))?;
        let fields: ReceiptFields = serde_json::from_str(json)?;

        validate_fields(fields)
    }

    /// Twilio media URLs require account credentials.
    async fn download_image(&self, url: &str) -> Result<(String, String), anyhow::Error> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.twilio_account_sid, Some(&self.twilio_auth_token))
            .send()
            .await?
            .error_for_status()?;

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response.bytes().await?;

        Ok((BASE64.encode(&bytes), media_type))
    }
}

fn validate_fields(fields: ReceiptFields) -> Result<ExtractedPayment, anyhow::Error> {
    let amount = match fields.amount {
        Some(amount) if amount > 0.0 => amount,
        _ => bail!("Missing required payment field: amount"),
    };

    let sinpe_reference = match fields.sinpe_reference {
        Some(reference) if !reference.trim().is_empty() => reference.trim().to_string(),
        _ => bail!("Missing required payment field: sinpe_reference"),
    };

    let sender_phone = match fields.sender_phone.as_deref().map(normalize_phone) {
        Some(Some(phone)) => phone,
        _ => bail!("Missing required payment field: sender_phone"),
    };

    // A receipt with an unreadable date is still a payment; fall back to the
    // time of processing.
    let payment_date = fields
        .payment_date
        .as_deref()
        .and_then(parse_payment_date)
        .unwrap_or_else(Utc::now);

    Ok(ExtractedPayment {
        amount_in_cents: colones_to_cents(amount),
        sender_name: fields.sender_name.filter(|name| !name.trim().is_empty()),
        sender_phone,
        sinpe_reference,
        payment_date,
    })
}

fn parse_payment_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

/// Converts a decimal colón amount to integer céntimos.
fn colones_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Canonical form is `+506XXXXXXXX`. Receipts print local numbers with
/// dashes and without the country code.
fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        8 => Some(format!("+506{}", digits)),
        11 if digits.starts_with("506") => Some(format!("+{}", digits)),
        _ => None,
    }
}

/// Locates the first balanced JSON object in free-form model output,
/// honoring string literals and escapes.
fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::extraction::ReceiptFields;

    fn fields(
        amount: Option<f64>,
        phone: Option<&str>,
        reference: Option<&str>,
    ) -> ReceiptFields {
        ReceiptFields {
            amount,
            sender_name: Some("MARIA PEREZ".to_string()),
            sender_phone: phone.map(String::from),
            sinpe_reference: reference.map(String::from),
            payment_date: Some("2026-02-01T14:10:00Z".to_string()),
        }
    }

    #[test]
    fn finds_json_embedded_in_prose() {
        let text = "Here is the extraction:\n{\"amount\": 3000.0, \"note\": \"{nested} braces\"}\nDone.";
        let json = find_json_object(text).unwrap();
        assert_eq!(json, "{\"amount\": 3000.0, \"note\": \"{nested} braces\"}");
    }

    #[test]
    fn finds_nested_objects() {
        let text = "x {\"a\": {\"b\": 1}} trailing {\"c\": 2}";
        assert_eq!(find_json_object(text).unwrap(), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn no_object_means_none() {
        assert!(find_json_object("no json here").is_none());
        assert!(find_json_object("{unclosed").is_none());
    }

    #[test]
    fn normalizes_local_numbers() {
        assert_eq!(normalize_phone("8674-1687").unwrap(), "+50686741687");
        assert_eq!(normalize_phone("86741687").unwrap(), "+50686741687");
        assert_eq!(normalize_phone("+506 8674 1687").unwrap(), "+50686741687");
        assert_eq!(normalize_phone("50686741687").unwrap(), "+50686741687");
    }

    #[test]
    fn rejects_unusable_numbers() {
        assert!(normalize_phone("123").is_none());
        assert!(normalize_phone("").is_none());
    }

    #[test]
    fn converts_colones_to_centimos() {
        assert_eq!(colones_to_cents(3000.0), 300_000);
        assert_eq!(colones_to_cents(10000.50), 1_000_050);
        assert_eq!(colones_to_cents(0.1), 10);
    }

    #[test]
    fn validation_requires_amount_reference_and_phone() {
        assert!(validate_fields(fields(None, Some("86741687"), Some("REF1"))).is_err());
        assert!(validate_fields(fields(Some(3000.0), None, Some("REF1"))).is_err());
        assert!(validate_fields(fields(Some(3000.0), Some("86741687"), None)).is_err());

        let extracted = validate_fields(fields(Some(3000.0), Some("86741687"), Some("REF1"))).unwrap();
        assert_eq!(extracted.amount_in_cents, 300_000);
        assert_eq!(extracted.sender_phone, "+50686741687");
        assert_eq!(extracted.sinpe_reference, "REF1");
    }

    #[test]
    fn unparsable_date_falls_back_to_now() {
        let mut f = fields(Some(3000.0), Some("86741687"), Some("REF1"));
        f.payment_date = Some("01 de febrero".to_string());
        let extracted = validate_fields(f).unwrap();
        assert!(extracted.payment_date <= Utc::now());
    }
}
