use anyhow::bail;

pub struct TwilioApi {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioApi {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send_message(&self, to: &str, body: &str) -> Result<(), anyhow::Error> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let params = [
            ("From", format!("whatsapp:{}", self.from_number)),
            ("To", format!("whatsapp:{}", to)),
            ("Body", body.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            bail!("Twilio: send failed with {}: {}", status, detail);
        }

        log::info!("WhatsApp message sent to {}", to);
        Ok(())
    }
}
