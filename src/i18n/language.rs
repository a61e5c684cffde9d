//! Validated language codes.

use crate::error::{RelayError, RelayResult};
use crate::i18n::{LanguageConfig, LanguageRegistry};

/// A language code that has been checked against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    code: &'static str,
}

impl Language {
    pub const ENGLISH: Language = Language { code: "en" };

    pub const SPANISH: Language = Language { code: "es" };

    /// Create a Language from a code string.
    ///
    /// # Returns
    /// * `Ok(Language)` if the registry knows the code
    /// * `Err(RelayError::InvalidLanguage)` otherwise
    pub fn from_code(code: &str) -> RelayResult<Language> {
        LanguageRegistry::get()
            .get_by_code(code.trim())
            .map(|config| Language { code: config.code })
            .ok_or_else(|| RelayError::InvalidLanguage(code.to_string()))
    }

    /// The language reply templates are authored in.
    pub fn canonical() -> Language {
        Language {
            code: LanguageRegistry::get().canonical().code,
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// # Panics
    /// Panics if the code is not in the registry, which cannot happen for a
    /// Language built through `from_code` or the constants.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    pub fn name(&self) -> &'static str {
        self.config().name
    }

    pub fn native_name(&self) -> &'static str {
        self.config().native_name
    }

    pub fn is_canonical(&self) -> bool {
        self.config().is_canonical
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code)
    }
}
