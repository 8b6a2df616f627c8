use serde::Deserialize;

/// Twilio delivers inbound WhatsApp messages as form-encoded posts with
/// `whatsapp:`-prefixed addresses.
#[derive(Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
    #[serde(rename = "Body", default)]
    pub body: Option<String>,
}

pub fn strip_channel_prefix(address: &str) -> &str {
    address.strip_prefix("whatsapp:").unwrap_or(address)
}

#[derive(Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whatsapp_prefix() {
        assert_eq!(strip_channel_prefix("whatsapp:+50688887777"), "+50688887777");
        assert_eq!(strip_channel_prefix("+50688887777"), "+50688887777");
    }
}
