use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use super::{AlertEmail, MailTransport, NotifyError};

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Transactional email over an HTTP API (`POST {base}/emails`, bearer auth).
pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailTransport {
    pub fn new(api_base_url: &str, api_key: String, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/emails", api_base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, email: &AlertEmail) -> Result<(), NotifyError> {
        let body = SendEmailRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("mail API returned {status}: {detail}")));
        }
        Ok(())
    }
}
