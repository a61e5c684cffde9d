//! Language registry: every language code the translation mirrors accept.
//!
//! The table mirrors the language list published by LibreTranslate. It is
//! immutable and built once on first access.

use std::sync::OnceLock;

/// Metadata for one supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// ISO 639-1 language code (e.g., "en", "es")
    pub code: &'static str,

    /// English name of the language (e.g., "Spanish")
    pub name: &'static str,

    /// Native name of the language (e.g., "Español")
    pub native_name: &'static str,

    /// Whether reply templates are authored in this language (exactly one)
    pub is_canonical: bool,
}

/// Global, read-only language table.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by code. Codes are matched case-insensitively.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
    }

    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// The language reply templates are written in.
    ///
    /// # Panics
    /// Panics if the table does not contain exactly one canonical language.
    pub fn canonical(&self) -> &LanguageConfig {
        let canonical_langs: Vec<_> = self
            .languages
            .iter()
            .filter(|lang| lang.is_canonical)
            .collect();

        match canonical_langs.len() {
            0 => panic!("No canonical language found in registry"),
            1 => canonical_langs[0],
            _ => panic!("Multiple canonical languages found in registry"),
        }
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }

    /// One `code (Name)` line per language, used in usage errors.
    pub fn describe(&self) -> String {
        self.languages
            .iter()
            .map(|lang| format!("{} ({})", lang.code, lang.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

macro_rules! lang {
    ($code:literal, $name:literal, $native:literal) => {
        LanguageConfig {
            code: $code,
            name: $name,
            native_name: $native,
            is_canonical: false,
        }
    };
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            code: "en",
            name: "English",
            native_name: "English",
            is_canonical: true,
        },
        lang!("ar", "Arabic", "العربية"),
        lang!("az", "Azerbaijani", "Azərbaycanca"),
        lang!("zh", "Chinese", "中文"),
        lang!("cs", "Czech", "Čeština"),
        lang!("da", "Danish", "Dansk"),
        lang!("nl", "Dutch", "Nederlands"),
        lang!("eo", "Esperanto", "Esperanto"),
        lang!("fi", "Finnish", "Suomi"),
        lang!("fr", "French", "Français"),
        lang!("de", "German", "Deutsch"),
        lang!("el", "Greek", "Ελληνικά"),
        lang!("he", "Hebrew", "עברית"),
        lang!("hi", "Hindi", "हिन्दी"),
        lang!("hu", "Hungarian", "Magyar"),
        lang!("id", "Indonesian", "Bahasa Indonesia"),
        lang!("ga", "Irish", "Gaeilge"),
        lang!("it", "Italian", "Italiano"),
        lang!("ja", "Japanese", "日本語"),
        lang!("ko", "Korean", "한국어"),
        lang!("fa", "Persian", "فارسی"),
        lang!("pl", "Polish", "Polski"),
        lang!("pt", "Portuguese", "Português"),
        lang!("ru", "Russian", "Русский"),
        lang!("sk", "Slovak", "Slovenčina"),
        lang!("es", "Spanish", "Español"),
        lang!("sv", "Swedish", "Svenska"),
        lang!("tr", "Turkish", "Türkçe"),
        lang!("uk", "Ukrainian", "Українська"),
    ]
}
