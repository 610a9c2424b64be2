//! Language codes, the supported-language catalog and text language detection.

use std::fmt;

use isolang::Language;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BabelError, Result};

/// Short language tag such as `en` or `pt-br`, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new<S: AsRef<str>>(code: S) -> Result<Self> {
        let normalized = code.as_ref().trim().to_lowercase();
        let valid = !normalized.is_empty()
            && normalized.len() <= 8
            && normalized.starts_with(|c: char| c.is_ascii_alphabetic())
            && normalized.chars().all(|c| c.is_ascii_alphabetic() || c == '-');
        if !valid {
            return Err(BabelError::UnknownLanguage(code.as_ref().to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated list, skipping empty entries and duplicates.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        let mut codes: Vec<Self> = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let code = Self::new(part)?;
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        Ok(codes)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = BabelError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

/// Catalog entry shown to users when picking target languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub flag: &'static str,
}

/// Lookup collaborator: code to display name and flag, plus enumeration.
pub trait LanguageLookup: Send + Sync {
    fn info(&self, code: &LanguageCode) -> Result<LanguageInfo>;

    fn all(&self) -> Vec<LanguageInfo>;

    fn display_name(&self, code: &LanguageCode) -> Result<&'static str> {
        self.info(code).map(|info| info.name)
    }

    fn flag(&self, code: &LanguageCode) -> Result<&'static str> {
        self.info(code).map(|info| info.flag)
    }

    fn ensure_supported(&self, code: &LanguageCode) -> Result<()> {
        self.info(code).map(|_| ())
    }
}

const SUPPORTED_LANGUAGES: &[LanguageInfo] = &[
    LanguageInfo { code: "ar", name: "Arabic", flag: "🇸🇦" },
    LanguageInfo { code: "bg", name: "Bulgarian", flag: "🇧🇬" },
    LanguageInfo { code: "bn", name: "Bengali", flag: "🇧🇩" },
    LanguageInfo { code: "ca", name: "Catalan", flag: "🇦🇩" },
    LanguageInfo { code: "cs", name: "Czech", flag: "🇨🇿" },
    LanguageInfo { code: "da", name: "Danish", flag: "🇩🇰" },
    LanguageInfo { code: "de", name: "German", flag: "🇩🇪" },
    LanguageInfo { code: "el", name: "Greek", flag: "🇬🇷" },
    LanguageInfo { code: "en", name: "English", flag: "🇬🇧" },
    LanguageInfo { code: "es", name: "Spanish", flag: "🇪🇸" },
    LanguageInfo { code: "et", name: "Estonian", flag: "🇪🇪" },
    LanguageInfo { code: "fa", name: "Persian", flag: "🇮🇷" },
    LanguageInfo { code: "fi", name: "Finnish", flag: "🇫🇮" },
    LanguageInfo { code: "fr", name: "French", flag: "🇫🇷" },
    LanguageInfo { code: "he", name: "Hebrew", flag: "🇮🇱" },
    LanguageInfo { code: "hi", name: "Hindi", flag: "🇮🇳" },
    LanguageInfo { code: "hr", name: "Croatian", flag: "🇭🇷" },
    LanguageInfo { code: "hu", name: "Hungarian", flag: "🇭🇺" },
    LanguageInfo { code: "id", name: "Indonesian", flag: "🇮🇩" },
    LanguageInfo { code: "it", name: "Italian", flag: "🇮🇹" },
    LanguageInfo { code: "ja", name: "Japanese", flag: "🇯🇵" },
    LanguageInfo { code: "ko", name: "Korean", flag: "🇰🇷" },
    LanguageInfo { code: "lt", name: "Lithuanian", flag: "🇱🇹" },
    LanguageInfo { code: "lv", name: "Latvian", flag: "🇱🇻" },
    LanguageInfo { code: "ms", name: "Malay", flag: "🇲🇾" },
    LanguageInfo { code: "nl", name: "Dutch", flag: "🇳🇱" },
    LanguageInfo { code: "no", name: "Norwegian", flag: "🇳🇴" },
    LanguageInfo { code: "pl", name: "Polish", flag: "🇵🇱" },
    LanguageInfo { code: "pt", name: "Portuguese", flag: "🇵🇹" },
    LanguageInfo { code: "ro", name: "Romanian", flag: "🇷🇴" },
    LanguageInfo { code: "ru", name: "Russian", flag: "🇷🇺" },
    LanguageInfo { code: "sk", name: "Slovak", flag: "🇸🇰" },
    LanguageInfo { code: "sl", name: "Slovenian", flag: "🇸🇮" },
    LanguageInfo { code: "sr", name: "Serbian", flag: "🇷🇸" },
    LanguageInfo { code: "sv", name: "Swedish", flag: "🇸🇪" },
    LanguageInfo { code: "th", name: "Thai", flag: "🇹🇭" },
    LanguageInfo { code: "tl", name: "Tagalog", flag: "🇵🇭" },
    LanguageInfo { code: "tr", name: "Turkish", flag: "🇹🇷" },
    LanguageInfo { code: "uk", name: "Ukrainian", flag: "🇺🇦" },
    LanguageInfo { code: "ur", name: "Urdu", flag: "🇵🇰" },
    LanguageInfo { code: "vi", name: "Vietnamese", flag: "🇻🇳" },
    LanguageInfo { code: "zh", name: "Chinese", flag: "🇨🇳" },
];

/// Built-in catalog backed by a static table.
#[derive(Debug, Clone, Default)]
pub struct LanguageCatalog;

impl LanguageLookup for LanguageCatalog {
    fn info(&self, code: &LanguageCode) -> Result<LanguageInfo> {
        SUPPORTED_LANGUAGES
            .iter()
            .find(|info| info.code == code.as_str())
            .cloned()
            .ok_or_else(|| BabelError::UnknownLanguage(code.to_string()))
    }

    fn all(&self) -> Vec<LanguageInfo> {
        let mut all = SUPPORTED_LANGUAGES.to_vec();
        all.sort_by(|a, b| a.name.cmp(b.name));
        all
    }
}

/// Classifies plain text into a language code.
pub trait LanguageClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<LanguageCode>;
}

/// Statistical trigram classifier.
#[derive(Debug, Clone)]
pub struct WhatlangClassifier {
    min_confidence: f64,
}

impl WhatlangClassifier {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }
}

impl LanguageClassifier for WhatlangClassifier {
    fn classify(&self, text: &str) -> Result<LanguageCode> {
        if text.trim().is_empty() {
            return Err(BabelError::LanguageDetection(
                "transcript contains no text".to_string(),
            ));
        }

        let info = whatlang::detect(text).ok_or_else(|| {
            BabelError::LanguageDetection("no language could be identified".to_string())
        })?;
        debug!(
            "Detected {:?} with confidence {:.2} (reliable: {})",
            info.lang(),
            info.confidence(),
            info.is_reliable()
        );

        if info.confidence() < self.min_confidence {
            return Err(BabelError::LanguageDetection(format!(
                "best guess {} has confidence {:.2}, below {:.2}",
                info.lang().code(),
                info.confidence(),
                self.min_confidence
            )));
        }

        LanguageCode::new(iso_639_1(info.lang().code())?)
    }
}

fn iso_639_1(code_639_3: &str) -> Result<&'static str> {
    // whatlang reports Mandarin as `cmn`, which has no two-letter code of its own
    let lookup = if code_639_3 == "cmn" { "zho" } else { code_639_3 };
    Language::from_639_3(lookup)
        .and_then(|lang| lang.to_639_1())
        .ok_or_else(|| {
            BabelError::LanguageDetection(format!(
                "detected language {} has no two-letter code",
                code_639_3
            ))
        })
}
