use crate::settings;

mod twilio;

/// Sender feedback templates. Only problem paths message the sender; a clean
/// payment produces no reply.
#[derive(Debug, Clone)]
pub enum Feedback {
    DuplicatePayment,
    AmountMismatch {
        amount_in_cents: i64,
        monthly_fee_in_cents: i64,
    },
    ProcessingError,
    Fallback,
}

pub struct WhatsappRepository {
    api: twilio::TwilioApi,
    templates: settings::Messages,
}

impl WhatsappRepository {
    pub fn new(twilio: settings::Twilio, templates: settings::Messages) -> Self {
        let api = twilio::TwilioApi::new(
            twilio.account_sid,
            twilio.auth_token,
            twilio.whatsapp_number,
        );

        WhatsappRepository { api, templates }
    }

    pub async fn send_feedback(&self, to: &str, feedback: Feedback) -> Result<(), anyhow::Error> {
        let body = render_feedback(&self.templates, &feedback);
        self.api.send_message(to, &body).await
    }
}

fn render_feedback(templates: &settings::Messages, feedback: &Feedback) -> String {
    match feedback {
        Feedback::DuplicatePayment => templates.duplicate_payment.clone(),
        Feedback::AmountMismatch {
            amount_in_cents,
            monthly_fee_in_cents,
        } => templates
            .amount_mismatch
            .replace("{amount}", &format_colones(*amount_in_cents))
            .replace("{monthly_fee}", &format_colones(*monthly_fee_in_cents)),
        Feedback::ProcessingError => templates.processing_error.clone(),
        Feedback::Fallback => templates.fallback.clone(),
    }
}

/// Céntimos to a display amount: whole colones unless the amount carries
/// céntimos.
pub fn format_colones(amount_in_cents: i64) -> String {
    if amount_in_cents % 100 == 0 {
        format!("{}", amount_in_cents / 100)
    } else {
        format!("{}.{:02}", amount_in_cents / 100, (amount_in_cents % 100).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_and_fractional_amounts() {
        assert_eq!(format_colones(1_000_000), "10000");
        assert_eq!(format_colones(1_000_050), "10000.50");
        assert_eq!(format_colones(5), "0.05");
    }

    #[test]
    fn mismatch_template_interpolates_both_figures() {
        let templates = settings::Messages::default();
        let body = render_feedback(
            &templates,
            &Feedback::AmountMismatch {
                amount_in_cents: 1_200_000,
                monthly_fee_in_cents: 1_000_000,
            },
        );

        assert!(body.contains("12000"));
        assert!(body.contains("10000"));
        assert!(!body.contains("{amount}"));
        assert!(!body.contains("{monthly_fee}"));
    }

    #[test]
    fn fixed_templates_pass_through() {
        let templates = settings::Messages::default();
        assert_eq!(
            render_feedback(&templates, &Feedback::DuplicatePayment),
            templates.duplicate_payment
        );
        assert_eq!(
            render_feedback(&templates, &Feedback::ProcessingError),
            templates.processing_error
        );
    }
}
