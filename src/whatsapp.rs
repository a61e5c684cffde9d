use crate::config::Config;
use crate::retry::{with_retry_if, RetryPolicy};
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Fields of a Twilio incoming-message webhook that the relay reads.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "NumMedia", default)]
    pub num_media: Option<String>,
}

impl IncomingForm {
    pub fn has_media(&self) -> bool {
        self.num_media
            .as_deref()
            .and_then(|n| n.parse::<u32>().ok())
            .is_some_and(|n| n > 0)
    }
}

/// Sends WhatsApp messages through the Twilio REST API.
pub struct TwilioClient {
    http: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    retry: RetryPolicy,
}

impl TwilioClient {
    pub fn new(config: &Config) -> Self {
        Self::with_credentials(
            &config.twilio_api_url,
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_number,
        )
    }

    pub fn with_credentials(
        api_url: &str,
        account_sid: &str,
        auth_token: &str,
        from_number: &str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
            retry: RetryPolicy::delivery(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send `body` to the member with identity `to`.
    ///
    /// Rate limiting (429) and server errors are retried; other client errors
    /// fail immediately.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<()> {
        with_retry_if(
            &self.retry,
            &format!("Send to {}", to),
            || self.send_once(to, body),
            is_retryable_error,
        )
        .await
    }

    async fn send_once(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.account_sid
        );
        let from = format!("whatsapp:{}", self.from_number);
        let to = format!("whatsapp:{}", to);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", from.as_str()),
                ("To", to.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .context("Failed to send request to Twilio API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Twilio API error ({}): {}", status, body);
        }

        debug!("✓ Twilio accepted message to {}", to);
        Ok(())
    }
}

/// Retry 429 and 5xx Twilio responses and transport failures.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string();

    // Format: "Twilio API error (400 Bad Request): ..."
    if let Some(rest) = error_str.strip_prefix("Twilio API error (") {
        if let Some(status) = rest
            .split_whitespace()
            .next()
            .and_then(|s| s.trim_end_matches(')').parse::<u16>().ok())
        {
            return status == 429 || status >= 500;
        }
    }

    true
}

/// Render a TwiML reply. `None` produces an empty response, which Twilio
/// treats as "send nothing back".
pub fn twiml_reply(message: Option<&str>) -> String {
    match message {
        Some(text) if !text.is_empty() => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            escape_xml(text)
        ),
        _ => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
