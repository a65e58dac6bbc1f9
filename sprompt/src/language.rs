//! Keyword-signature language detection.
//!
//! ```rust
//! use sprompt::{Language, detect_language};
//!
//! assert_eq!(detect_language("¿Qué pasó con el servidor?", Language::English), Language::Spanish);
//! assert_eq!(detect_language("12345", Language::Spanish), Language::Spanish);
//! ```

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en", alias = "english")]
    English,
    #[serde(rename = "es", alias = "spanish")]
    Spanish,
}

const ENGLISH_SIGNATURE: &[&str] = &[
    "the", "what", "which", "how", "why", "where", "when", "please", "show", "find", "with",
    "is", "are", "did", "does", "and", "from",
];

const SPANISH_SIGNATURE: &[&str] = &[
    "el", "la", "los", "las", "qué", "que", "cómo", "como", "por", "favor", "dónde", "donde",
    "cuándo", "está", "es", "son", "con", "para", "una", "del",
];

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "es" | "spanish" | "español" => Some(Self::Spanish),
            _ => None,
        }
    }

    fn signature(self) -> &'static [&'static str] {
        match self {
            Self::English => ENGLISH_SIGNATURE,
            Self::Spanish => SPANISH_SIGNATURE,
        }
    }

    /// Closing instructions appended to every composite prompt.
    pub fn response_guidelines(self) -> &'static str {
        match self {
            Self::English => {
                "Response guidelines:\n- Respond in English.\n- Be concise and cite the evidence you relied on.\n- Say so plainly when the available context is insufficient."
            }
            Self::Spanish => {
                "Pautas de respuesta:\n- Responde en español.\n- Sé conciso y cita la evidencia utilizada.\n- Indica claramente cuando el contexto disponible no sea suficiente."
            }
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Picks the language whose signature matches when exactly one does.
pub fn detect_language(text: &str, default: Language) -> Language {
    let lowered = text.to_lowercase();
    let words = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<BTreeSet<_>>();

    let english = matches_signature(&words, Language::English);
    let spanish = matches_signature(&words, Language::Spanish);

    match (english, spanish) {
        (true, false) => Language::English,
        (false, true) => Language::Spanish,
        _ => default,
    }
}

fn matches_signature(words: &BTreeSet<&str>, language: Language) -> bool {
    language
        .signature()
        .iter()
        .any(|keyword| words.contains(keyword))
}
