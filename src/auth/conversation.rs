//! Conversation callback used during the credential exchange.

use inquire::{Password, PasswordDisplayMode, Text};

/// Kind of message the authentication module sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// Ask for input without echoing it (passwords, one-time codes).
    PromptEchoOff,
    PromptEchoOn,
    ErrorMsg,
    TextInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("conversation aborted: {0}")]
pub struct ConversationError(pub String);

/// Answers prompts from the authentication module.
///
/// Prompts return `Some(answer)`; informational messages return `None`.
pub trait Conversation {
    fn respond(
        &self,
        style: MessageStyle,
        message: &str,
    ) -> Result<Option<String>, ConversationError>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConversation;

impl Conversation for TerminalConversation {
    fn respond(
        &self,
        style: MessageStyle,
        message: &str,
    ) -> Result<Option<String>, ConversationError> {
        let message = message.trim_end();
        match style {
            MessageStyle::PromptEchoOff => Password::new(message)
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Hidden)
                .prompt()
                .map(Some)
                .map_err(|e| ConversationError(e.to_string())),
            MessageStyle::PromptEchoOn => Text::new(message)
                .prompt()
                .map(Some)
                .map_err(|e| ConversationError(e.to_string())),
            MessageStyle::ErrorMsg | MessageStyle::TextInfo => {
                eprintln!("{message}");
                Ok(None)
            }
        }
    }
}
