use anyhow::bail;
use serde_json::json;

const API_VERSION: &str = "2023-06-01";

const EXTRACTION_PROMPT: &str = r#"Extract payment information from this Costa Rican SINPE mobile transfer receipt (Comprobante de Transferencia SINPE Móvil).

Look for these fields:
- Monto transferido or Monto debitado: The transfer amount
- Cuenta origen or SINPE Móvil destino: The sender's name and phone number (format: NAME followed by phone like "8674-1687")
- Referencia or Documento: The transaction reference number
- Date at top right (format: "01 de febrero, 2026 14:10")

Return ONLY a JSON object:
{
  "amount": number (extract from "Monto transferido", remove ₡ and commas, example: 3000.00),
  "sender_name": string (extract from "Cuenta origen" line, the name part),
  "sender_phone": string (extract the phone number, add +506 prefix if only 8 digits, example: "+50686741687"),
  "sinpe_reference": string (the full Referencia number),
  "payment_date": string (convert to ISO 8601 format like "2026-02-01T14:10:00Z")
}

Important:
- For phone numbers with format "8674-1687", remove dashes and add +506 prefix to get "+50686741687"
- Amount should be a number without ₡ symbol or commas
- Do not include any explanation, only the JSON."#;

pub struct AnthropicApi {
    api_key: String,
    url: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicApi {
    pub fn new(api_key: String, url: String, model: String, timeout: std::time::Duration) -> Self {
        Self {
            api_key,
            url,
            model,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Sends the receipt image with the fixed extraction instruction and
    /// returns the model's raw text reply.
    pub async fn read_receipt(
        &self,
        image_base64: &str,
        media_type: &str,
    ) -> Result<String, anyhow::Error> {
        let payload = json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": image_base64,
                        },
                    },
                    {
                        "type": "text",
                        "text": EXTRACTION_PROMPT,
                    },
                ],
            }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?
            .text()
            .await?;

        let response_json: serde_json::Value = serde_json::from_str(&response)?;
        match response_json["content"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => bail!("Anthropic: Bad response format."),
        }
    }
}
