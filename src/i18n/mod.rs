//! Languages, reply templates, and translation metrics.
//!
//! - `registry`: the table of language codes the mirrors accept
//! - `language`: validated `Language` handle over the registry
//! - `strings`: canonical reply templates and the caching `Localizer`
//! - `metrics`: counters owned by the translation client

mod language;
mod metrics;
mod registry;
mod strings;

pub use language::Language;
pub use metrics::{MetricsReport, TranslationMetrics};
pub use registry::{LanguageConfig, LanguageRegistry};
pub use strings::{Localizer, Text};
