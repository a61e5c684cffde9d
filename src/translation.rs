//! LibreTranslate client with ordered mirror failover.
//!
//! Each translate call walks the configured mirrors in order and stops at the
//! first success. Every mirror attempt is bounded by the configured timeout,
//! so one slow mirror delays a call by at most that long before the next one
//! is tried. Calls are side-effect free apart from the request itself and may
//! run concurrently.

use crate::config::Config;
use crate::error::{RelayError, RelayResult};
use crate::i18n::{Language, LanguageRegistry, TranslationMetrics};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    /// Language code, or "auto" to let the mirror detect it
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
    #[serde(default)]
    detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
struct DetectedLanguage {
    language: String,
    #[serde(default)]
    confidence: f64,
}

/// Entry of a mirror's `/languages` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLanguage {
    pub code: String,
    pub name: String,
}

pub struct TranslationClient {
    http: reqwest::Client,
    /// Base URLs ending in `/`, tried in order
    mirrors: Vec<String>,
    api_key: Option<String>,
    timeout: Duration,
    metrics: TranslationMetrics,
}

impl TranslationClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_mirrors(
            config.translation_mirrors.clone(),
            config.translation_api_key.clone(),
            config.translation_timeout,
        )
    }

    pub fn with_mirrors(
        mirrors: Vec<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if mirrors.is_empty() {
            bail!("At least one translation mirror is required");
        }

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("Failed to build translation HTTP client")?;

        Ok(Self {
            http,
            mirrors: mirrors
                .into_iter()
                .map(|url| format!("{}/", url.trim_end_matches('/')))
                .collect(),
            api_key,
            timeout,
            metrics: TranslationMetrics::new(),
        })
    }

    pub fn metrics(&self) -> &TranslationMetrics {
        &self.metrics
    }

    /// Translate `text` into `target`.
    ///
    /// `source = None` asks the mirror to auto-detect the language. Very short
    /// texts often fail detection; that surfaces as `TranslationUnavailable`
    /// like any other failure rather than passing the text through.
    ///
    /// Empty text, or a source equal to the target, returns the input without
    /// a request.
    pub async fn translate(
        &self,
        text: &str,
        source: Option<Language>,
        target: Language,
    ) -> RelayResult<String> {
        if text.trim().is_empty() || source == Some(target) {
            return Ok(text.to_string());
        }

        let request = TranslateRequest {
            q: text,
            source: source.map(|l| l.code()).unwrap_or("auto"),
            target: target.code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let mut last_error = None;
        for (idx, mirror) in self.mirrors.iter().enumerate() {
            self.metrics.record_api_call();
            match self.translate_on(mirror, &request).await {
                Ok(translated) => {
                    if idx > 0 {
                        info!("Translation to {} succeeded on mirror {}", target, mirror);
                    }
                    return Ok(translated);
                }
                Err(e) => {
                    warn!("Translation mirror {} failed: {:#}", mirror, e);
                    if idx + 1 < self.mirrors.len() {
                        self.metrics.record_failover();
                    }
                    last_error = Some(e);
                }
            }
        }

        self.metrics.record_api_failure();
        let reason = last_error
            .map(|e| format!("{:#}", e))
            .unwrap_or_else(|| "no mirrors configured".to_string());
        Err(RelayError::TranslationUnavailable(format!(
            "all {} mirrors failed translating to {}; last error: {}",
            self.mirrors.len(),
            target,
            reason
        )))
    }

    async fn translate_on(&self, mirror: &str, request: &TranslateRequest<'_>) -> Result<String> {
        debug!(
            "Translating {} chars {} -> {} via {}",
            request.q.chars().count(),
            request.source,
            request.target,
            mirror
        );

        let response = self
            .http
            .post(format!("{}translate", mirror))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .context("Failed to send request to translation mirror")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            bail!("Translation mirror error ({}): {}", status, body);
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .context("Failed to parse translation response")?;

        if let Some(detected) = &parsed.detected_language {
            debug!(
                "Mirror detected source language {} ({:.0}% confidence)",
                detected.language, detected.confidence
            );
        }

        if parsed.translated_text.trim().is_empty() {
            bail!("Translation mirror returned empty text");
        }

        Ok(parsed.translated_text)
    }

    /// Fetch the language list from the first mirror that answers.
    pub async fn languages(&self) -> Result<Vec<RemoteLanguage>> {
        for mirror in &self.mirrors {
            let result = async {
                let response = self
                    .http
                    .get(format!("{}languages", mirror))
                    .timeout(self.timeout)
                    .send()
                    .await
                    .context("Failed to reach translation mirror")?
                    .error_for_status()
                    .context("Translation mirror rejected /languages")?;
                response
                    .json::<Vec<RemoteLanguage>>()
                    .await
                    .context("Failed to parse /languages response")
            }
            .await;

            match result {
                Ok(languages) => return Ok(languages),
                Err(e) => warn!("Mirror {} /languages failed: {:#}", mirror, e),
            }
        }

        bail!("No translation mirror returned a language list")
    }

    /// Log which registry languages the mirrors cannot translate. Mirrors that
    /// cannot be reached are reported but not fatal.
    pub async fn check_mirrors(&self) {
        match self.languages().await {
            Ok(remote) => {
                let missing: Vec<&str> = LanguageRegistry::get()
                    .list_all()
                    .into_iter()
                    .map(|lang| lang.code)
                    .filter(|code| !remote.iter().any(|r| r.code == *code))
                    .collect();
                if missing.is_empty() {
                    info!("✓ Translation mirrors support all {} languages", remote.len());
                } else {
                    warn!("Translation mirrors do not list: {}", missing.join(", "));
                }
            }
            Err(e) => warn!("Could not verify translation mirrors: {:#}", e),
        }
    }
}
