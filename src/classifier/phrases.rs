//! Versioned per-language phrase tables.
//!
//! The built-in table is embedded from `assets/phrase_table.json`. Deployments
//! can ship their own table with the same shape and load it at runtime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use super::fuzzy::normalize;
use crate::core::PhraseTableError;

const BUILTIN_TABLE: &str = include_str!("../../assets/phrase_table.json");

static BUILTIN: LazyLock<Arc<PhraseTable>> = LazyLock::new(|| {
    Arc::new(PhraseTable::from_json(BUILTIN_TABLE).expect("embedded phrase table is valid"))
});

/// Phrases recognised for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePhrases {
    /// Short acknowledgments that should not interrupt the AI.
    #[serde(default)]
    pub backchannel: Vec<String>,
    /// Requests to pause.
    #[serde(default)]
    pub soft_barge: Vec<String>,
}

impl LanguagePhrases {
    fn normalized(self) -> Self {
        let clean = |list: Vec<String>| {
            list.into_iter()
                .map(|p| normalize(&p))
                .filter(|p| !p.is_empty())
                .collect()
        };
        Self {
            backchannel: clean(self.backchannel),
            soft_barge: clean(self.soft_barge),
        }
    }
}

fn default_fallback() -> String {
    "en".to_string()
}

/// Lookup table keyed by base language code (`"en"`, `"ja"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseTable {
    /// Table revision, reported alongside classifications in logs.
    pub version: String,
    /// Language used when a request names an unknown language.
    #[serde(default = "default_fallback")]
    pub fallback_language: String,
    languages: HashMap<String, LanguagePhrases>,
}

impl PhraseTable {
    /// The table shipped with the crate.
    pub fn builtin() -> Arc<PhraseTable> {
        Arc::clone(&BUILTIN)
    }

    /// Parse a table from JSON. Phrases are normalised on load.
    pub fn from_json(json: &str) -> Result<Self, PhraseTableError> {
        let raw: PhraseTable = serde_json::from_str(json)?;
        let languages = raw
            .languages
            .into_iter()
            .map(|(code, phrases)| (language_key(&code), phrases.normalized()))
            .collect::<HashMap<_, _>>();

        let fallback_language = language_key(&raw.fallback_language);
        if !languages.contains_key(&fallback_language) {
            return Err(PhraseTableError::MissingFallback(fallback_language));
        }

        Ok(Self {
            version: raw.version,
            fallback_language,
            languages,
        })
    }

    /// Load a table from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PhraseTableError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Phrases for `language`, falling back to the fallback language.
    pub fn phrases(&self, language: &str) -> &LanguagePhrases {
        self.languages
            .get(&language_key(language))
            .or_else(|| self.languages.get(&self.fallback_language))
            .unwrap_or(&EMPTY)
    }

    /// Whether the table has its own entry for `language`.
    pub fn supports(&self, language: &str) -> bool {
        self.languages.contains_key(&language_key(language))
    }

    /// Languages present in the table, sorted.
    pub fn languages(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

static EMPTY: LanguagePhrases = LanguagePhrases {
    backchannel: Vec::new(),
    soft_barge: Vec::new(),
};

/// `"en-US"` and `"EN_gb"` both become `"en"`.
pub fn language_key(code: &str) -> String {
    code.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let table = PhraseTable::builtin();
        assert!(!table.version.is_empty());
        assert!(table.languages().len() >= 12);
        assert!(table.phrases("en").backchannel.contains(&"uh huh".to_string()));
    }

    #[test]
    fn test_language_key() {
        assert_eq!(language_key("en-US"), "en");
        assert_eq!(language_key("PT_br"), "pt");
        assert_eq!(language_key("ja"), "ja");
    }

    #[test]
    fn test_unknown_language_falls_back() {
        let table = PhraseTable::builtin();
        assert!(!table.supports("xx"));
        assert_eq!(table.phrases("xx"), table.phrases("en"));
    }

    #[test]
    fn test_phrases_are_normalized_on_load() {
        let table = PhraseTable::from_json(
            r#"{"version":"t1","languages":{"en":{"backchannel":["Uh-Huh!"],"soft_barge":["Hold  on"]}}}"#,
        )
        .unwrap();
        assert_eq!(table.phrases("en").backchannel, vec!["uh huh"]);
        assert_eq!(table.phrases("en").soft_barge, vec!["hold on"]);
    }

    #[test]
    fn test_missing_fallback_is_rejected() {
        let result = PhraseTable::from_json(
            r#"{"version":"t1","fallback_language":"de","languages":{"en":{}}}"#,
        );
        assert!(matches!(result, Err(PhraseTableError::MissingFallback(lang)) if lang == "de"));
    }
}
