//! Builds the ordered message list sent to the provider.
//!
//! The output is always `system`, then one `user`/`assistant` pair per turn of
//! history in the order received, then the new `user` message, so its length
//! is `2 + 2 * history.len()`.

use crate::api::ChatMessage;
use crate::core::language::LanguageMode;
use crate::core::message::Turn;

/// Tone and branding instructions shared by every persona.
pub const PRODUCT_CONTEXT: &str = concat!(
    "CONTEXT: You are the AI core of 'Persona', a high-end, dark-mode chat interface. ",
    "Your aesthetic is #0A0908 (Deep Black) and #E3D5CA (Cream). ",
    "Your responses must feel visually and intellectually 'expensive'."
);

/// Attribution the model must give when asked who built it.
pub const CREDIT_LINE: &str =
    "I was designed and developed by Mariam Maysara, a Computer Science graduate.";

/// [`CREDIT_LINE`] as it must be delivered to Arabic speakers.
pub const CREDIT_LINE_ARABIC: &str =
    "تم تصميمي وتطويري بواسطة مريم ميسرة، خريجة علوم الحاسب.";

/// Returns the attribution sentence for `mode`.
pub fn credit_line(mode: LanguageMode) -> &'static str {
    match mode {
        LanguageMode::Default => CREDIT_LINE,
        LanguageMode::AlternateScript => CREDIT_LINE_ARABIC,
    }
}

fn credit_mandate() -> String {
    format!(
        "CREDIT MANDATE: If asked 'Who designed you?', 'Who created you?', or 'Min sammamk?' (Arabic), \
you MUST answer: '{CREDIT_LINE}' \
(Translate this to Arabic if the user asks in Arabic: '{CREDIT_LINE_ARABIC}')"
    )
}

/// Persona prompt, product context, credit mandate and language mandate,
/// separated by blank lines.
pub fn system_instruction(persona_prompt: &str, mode: LanguageMode) -> String {
    format!(
        "{persona_prompt}\n\n{PRODUCT_CONTEXT}\n\n{}\n\n{}",
        credit_mandate(),
        mode.mandate()
    )
}

pub fn compose(
    persona_prompt: &str,
    mode: LanguageMode,
    history: &[Turn],
    message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + 2 * history.len());
    messages.push(ChatMessage::system(system_instruction(persona_prompt, mode)));

    for turn in history {
        messages.push(ChatMessage::user(turn.user.clone()));
        messages.push(ChatMessage::assistant(turn.assistant.clone()));
    }

    messages.push(ChatMessage::user(message));
    messages
}
