//! System preambles that frame the assistant for a conversation.

/// A named system preamble prepended to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Short label, used in logs.
    pub name: String,
    /// Text of the system message.
    pub system_prompt: String,
}

impl Persona {
    /// A persona with an arbitrary preamble.
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// The app-wide history tutor.
    #[must_use]
    pub fn history_tutor() -> Self {
        Self::new(
            "history-tutor",
            "You are a professional history assistant for the HistoriaQuest learning app. \
             You help learners with Chinese history, world history, lessons, museums and \
             cultural relics. Answer in a friendly, accurate and easy-to-follow way. If a \
             question is unrelated to history, gently steer the conversation back to history.",
        )
    }

    /// A historical figure the learner chats with in character.
    ///
    /// `system_prompt` is the figure's own role-play instruction.
    pub fn historical_figure(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self::new(name, system_prompt)
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::history_tutor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_history_tutor() {
        let persona = Persona::default();
        assert_eq!(persona.name, "history-tutor");
        assert!(persona.system_prompt.contains("history"));
    }

    #[test]
    fn figure_keeps_its_prompt() {
        let persona = Persona::historical_figure(
            "Li Bai",
            "You are Li Bai, poet of the Tang dynasty. Stay in character.",
        );
        assert_eq!(persona.name, "Li Bai");
        assert!(persona.system_prompt.starts_with("You are Li Bai"));
    }
}
