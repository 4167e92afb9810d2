/// First and last code point of the Arabic block.
const ALTERNATE_SCRIPT_RANGE: std::ops::RangeInclusive<char> = '\u{0600}'..='\u{06FF}';

/// Response-language mode selected from the user's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageMode {
    /// Respond in English.
    #[default]
    Default,
    /// The message contains Arabic script; respond in Arabic.
    AlternateScript,
}

impl LanguageMode {
    /// Fixed instruction block appended to the system prompt for this mode.
    pub fn mandate(self) -> &'static str {
        match self {
            LanguageMode::Default => concat!(
                "STRICT MANDATE: Respond in ENGLISH ONLY. ",
                "Maintain a sophisticated, premium tone suitable for a high-end interface."
            ),
            LanguageMode::AlternateScript => concat!(
                "STRICT MANDATE: The user is speaking ARABIC. ",
                "You MUST respond in ARABIC ONLY. ",
                "Use professional, minimalist, and deep Arabic that fits a premium dark-themed AI interface. ",
                "Avoid emojis unless absolutely necessary for the persona. ",
                "Maintain a serious, high-fidelity tone."
            ),
        }
    }

    pub fn language_name(self) -> &'static str {
        match self {
            LanguageMode::Default => "English",
            LanguageMode::AlternateScript => "Arabic",
        }
    }
}

/// Classifies `text` by script. Pure; empty input is [`LanguageMode::Default`].
pub fn classify(text: &str) -> LanguageMode {
    if text.chars().any(|c| ALTERNATE_SCRIPT_RANGE.contains(&c)) {
        LanguageMode::AlternateScript
    } else {
        LanguageMode::Default
    }
}
