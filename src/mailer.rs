use axum::async_trait;
use serde_json::json;
use tracing::debug;

/// Outbound mail contract. Delivery is fire-and-forget from the core's
/// perspective: callers spawn sends and only log failures, so a mail outage
/// never rolls back token issuance or account creation.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, html_body: &str)
        -> anyhow::Result<()>;
}

/// SendGrid v3 API client.
pub struct SendgridMailer {
    client: reqwest::Client,
    api_key: String,
}

impl SendgridMailer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl MailSender for SendgridMailer {
    async fn send(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": from },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html_body }],
        });
        let resp = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("sendgrid responded {}", resp.status());
        }
        debug!(%to, %subject, "mail sent");
        Ok(())
    }
}

/// Sender that drops mail on the floor. Used in tests and when no API key is
/// configured.
pub struct NullMailer;

#[async_trait]
impl MailSender for NullMailer {
    async fn send(
        &self,
        _from: &str,
        to: &str,
        subject: &str,
        _html_body: &str,
    ) -> anyhow::Result<()> {
        debug!(%to, %subject, "mail suppressed (null mailer)");
        Ok(())
    }
}
