use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Default seconds before a single translation mirror request times out
const DEFAULT_TRANSLATION_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    // Twilio
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    /// Number the bot sends from, without the `whatsapp:` prefix
    pub twilio_number: String,
    pub twilio_api_url: String,

    // LibreTranslate
    /// Mirror base URLs in the order they should be tried
    pub translation_mirrors: Vec<String>,
    pub translation_api_key: Option<String>,
    pub translation_timeout: Duration,

    // Roster persistence
    pub store_path: String,

    // Bootstrap super-admin, used only when the roster file is empty
    pub super_admin_number: Option<String>,
    pub super_admin_lang: String,
    pub super_admin_name: String,

    // Server
    pub webhook_secret: Option<String>,
    pub port: u16,
    pub delivery_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mirrors = std::env::var("LIBRETRANSLATE").context("LIBRETRANSLATE not set")?;

        Ok(Self {
            // Twilio
            twilio_account_sid: std::env::var("TWILIO_ACCOUNT_SID")
                .context("TWILIO_ACCOUNT_SID not set")?,
            twilio_auth_token: std::env::var("TWILIO_AUTH_TOKEN")
                .context("TWILIO_AUTH_TOKEN not set")?,
            twilio_number: std::env::var("TWILIO_NUMBER")
                .context("TWILIO_NUMBER not set")?
                .trim_start_matches("whatsapp:")
                .to_string(),
            twilio_api_url: std::env::var("TWILIO_API_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),

            // LibreTranslate
            translation_mirrors: parse_mirrors(&mirrors)?,
            translation_api_key: non_empty_var("LIBRETRANSLATE_API_KEY"),
            translation_timeout: Duration::from_secs(
                std::env::var("TRANSLATION_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TRANSLATION_TIMEOUT_SECS),
            ),

            // Roster persistence
            store_path: std::env::var("STORE_PATH")
                .unwrap_or_else(|_| "data/roster.json".to_string()),

            // Bootstrap super-admin
            super_admin_number: non_empty_var("SUPER_ADMIN_NUMBER"),
            super_admin_lang: std::env::var("SUPER_ADMIN_LANG")
                .unwrap_or_else(|_| "en".to_string()),
            super_admin_name: std::env::var("SUPER_ADMIN_NAME")
                .unwrap_or_else(|_| "admin".to_string()),

            // Server
            webhook_secret: non_empty_var("WEBHOOK_SECRET"),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            delivery_delay: Duration::from_millis(
                std::env::var("DELIVERY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            ),
        })
    }
}

/// Split a whitespace-separated list of mirror base URLs, normalizing each to
/// end with a single `/` so endpoint paths can be appended.
fn parse_mirrors(raw: &str) -> Result<Vec<String>> {
    let mirrors: Vec<String> = raw
        .split_whitespace()
        .map(|url| format!("{}/", url.trim_end_matches('/')))
        .collect();

    if mirrors.is_empty() {
        bail!("LIBRETRANSLATE must list at least one mirror URL");
    }

    Ok(mirrors)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
