//! Structured model for the interactive recovery dialog.
//!
//! A [`Prompt`] is a titled dialog with a body text, one or more rows of
//! buttons and an optional footer button. Each button carries the command
//! string the host should run when it is pressed. The engine only builds
//! these; rendering is the host's job through the
//! [`PromptScreen`](crate::hardware::PromptScreen) trait.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptButton {
    pub label: String,
    pub command: String,
}

impl PromptButton {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub headline: String,
    pub text: String,
    pub groups: Vec<Vec<PromptButton>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<PromptButton>,
}

impl Prompt {
    pub fn new(headline: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            text: text.into(),
            groups: Vec::new(),
            footer: None,
        }
    }

    pub fn with_group(mut self, buttons: Vec<PromptButton>) -> Self {
        self.groups.push(buttons);
        self
    }

    pub fn with_footer(mut self, button: PromptButton) -> Self {
        self.footer = Some(button);
        self
    }

    /// Whether any button (group or footer) carries the given label.
    pub fn has_button(&self, label: &str) -> bool {
        self.groups
            .iter()
            .flatten()
            .chain(self.footer.iter())
            .any(|b| b.label == label)
    }
}
