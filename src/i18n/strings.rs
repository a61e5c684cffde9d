//! Reply templates and their localization.
//!
//! Templates are authored in the canonical language and carry no
//! placeholders; dynamic values (names, numbers, examples) are appended by
//! the caller so a translation can never mangle them. Translations are
//! produced on first use per language and cached for the process lifetime.
//! When the mirrors are unavailable the English text is returned and not
//! cached, so a later request can still pick up the translation.

use crate::i18n::Language;
use crate::translation::TranslationClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// A user-facing reply fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Text {
    // ==================== Generic ====================
    Example,
    Usage,
    UnknownCommand,
    NotAllowed,
    NotMember,
    SaveFailed,
    Commands,

    // ==================== Languages and Roles ====================
    LanguageError,
    Languages,
    RoleError,

    // ==================== /add ====================
    PhoneError,
    NameError,
    Exists,
    SuperOnly,
    Added,

    // ==================== /remove ====================
    NotFound,
    RemoveSelf,
    RemoveSuper,
    RemoveLastSuper,
    Removed,

    // ==================== /stats and /lastpost ====================
    StatsError,
    NoPosts,
    StatsHeaders,
    LastPostHeaders,

    // ==================== /list ====================
    ListHeaders,

    // ==================== /test ====================
    TestTranslation,
    TestBackTranslation,
    TranslationFailed,

    // ==================== Relay ====================
    TranslationUnavailable,
    PartialDelivery,
}

impl Text {
    /// The canonical (English) form of the template.
    pub fn english(self) -> &'static str {
        match self {
            Text::Example => "Example:",
            Text::Usage => "Usage:",
            Text::UnknownCommand => "Unknown command.",
            Text::NotAllowed => "You are not allowed to use this command.",
            Text::NotMember => "You are not a member of this group.",
            Text::SaveFailed => "The change could not be saved. Please try again.",
            Text::Commands => "Commands:",
            Text::LanguageError => "Choose a valid language.",
            Text::Languages => "Languages:",
            Text::RoleError => "Choose a valid role:",
            Text::PhoneError => {
                "A phone number contains only digits and a plus sign for the country code."
            }
            Text::NameError => "A username must be a single word without spaces.",
            Text::Exists => "User already exists.",
            Text::SuperOnly => "Only a superuser can add another superuser.",
            Text::Added => "New user added successfully.",
            Text::NotFound => "User not found.",
            Text::RemoveSelf => "You cannot remove yourself.",
            Text::RemoveSuper => "You cannot remove a superuser.",
            Text::RemoveLastSuper => "The last superuser cannot be removed.",
            Text::Removed => "User removed successfully.",
            Text::StatsError => "Invalid time frame.",
            Text::NoPosts => "There are no messages.",
            Text::StatsHeaders => "user, phone number, messages",
            Text::LastPostHeaders => "user, phone number, most recent message",
            Text::ListHeaders => "user, phone number, language, type",
            Text::TestTranslation => "Translation:",
            Text::TestBackTranslation => "Back-translation:",
            Text::TranslationFailed => "Translation failed. Please try again later.",
            Text::TranslationUnavailable => "translation unavailable",
            Text::PartialDelivery => "Your message could not be delivered to some members:",
        }
    }
}

/// Translates templates into members' languages, caching the results.
pub struct Localizer {
    translator: Arc<TranslationClient>,
    cache: Mutex<HashMap<(Language, Text), String>>,
}

impl Localizer {
    pub fn new(translator: Arc<TranslationClient>) -> Self {
        Self {
            translator,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `text` in `language`, falling back to English.
    pub async fn get(&self, text: Text, language: Language) -> String {
        if language.is_canonical() {
            return text.english().to_string();
        }

        if let Some(cached) = self.cached(text, language) {
            self.translator.metrics().record_cache_hit();
            return cached;
        }
        self.translator.metrics().record_cache_miss();

        match self
            .translator
            .translate(text.english(), Some(Language::canonical()), language)
            .await
        {
            Ok(translated) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert((language, text), translated.clone());
                }
                translated
            }
            Err(e) => {
                warn!("Falling back to English for {:?} in {}: {}", text, language, e);
                text.english().to_string()
            }
        }
    }

    /// `text` in `language` if it was already translated, otherwise English.
    /// Never calls the translator.
    pub fn cached_or_english(&self, text: Text, language: Language) -> String {
        if language.is_canonical() {
            return text.english().to_string();
        }
        self.cached(text, language)
            .unwrap_or_else(|| text.english().to_string())
    }

    /// Localize several templates, in order.
    pub async fn get_all(&self, texts: &[Text], language: Language) -> Vec<String> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.get(*text, language).await);
        }
        out
    }

    fn cached(&self, text: Text, language: Language) -> Option<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&(language, text)).cloned())
    }
}
