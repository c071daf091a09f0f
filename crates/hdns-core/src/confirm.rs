//! Two-button confirmation dialogs
//!
//! Each button is an [`ActionDescriptor`] that owns its handler. Whatever the
//! handler needs is captured by the closure; the dialog only supplies a
//! [`ConfirmContext`] describing how it was answered.

use std::fmt;

/// Visual weight of a button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionStyle {
    #[default]
    Primary,
    Secondary,
    Danger,
}

/// What the dialog knows at the time it is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfirmContext {
    /// State of the dialog's optional checkbox
    pub option_checked: bool,
}

type Handler = Box<dyn FnOnce(&ConfirmContext) + Send>;

pub struct ActionDescriptor {
    pub label: String,
    pub style: ActionStyle,
    handler: Option<Handler>,
}

impl ActionDescriptor {
    pub fn new<F>(label: impl Into<String>, style: ActionStyle, handler: F) -> Self
    where
        F: FnOnce(&ConfirmContext) + Send + 'static,
    {
        Self {
            label: label.into(),
            style,
            handler: Some(Box::new(handler)),
        }
    }

    /// A button that only closes the dialog
    pub fn dismiss(label: impl Into<String>, style: ActionStyle) -> Self {
        Self {
            label: label.into(),
            style,
            handler: None,
        }
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("label", &self.label)
            .field("style", &self.style)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Left,
    Right,
}

#[derive(Debug)]
pub struct Confirmation {
    pub message: String,
    pub hint: Option<String>,
    pub left: ActionDescriptor,
    pub right: ActionDescriptor,
}

impl Confirmation {
    pub fn new(message: impl Into<String>, left: ActionDescriptor, right: ActionDescriptor) -> Self {
        Self {
            message: message.into(),
            hint: None,
            left,
            right,
        }
    }

    /// "Okay" runs `on_accept`, "Cancel" only closes the dialog
    pub fn accept_or_cancel<F>(message: impl Into<String>, on_accept: F) -> Self
    where
        F: FnOnce(&ConfirmContext) + Send + 'static,
    {
        Self::new(
            message,
            ActionDescriptor::new("Okay", ActionStyle::Primary, on_accept),
            ActionDescriptor::dismiss("Cancel", ActionStyle::Danger),
        )
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Answer the dialog, running the chosen button's handler
    ///
    /// Consumes the dialog; the other handler is dropped without running.
    pub fn resolve(self, choice: Choice, option_checked: bool) {
        let action = match choice {
            Choice::Left => self.left,
            Choice::Right => self.right,
        };
        if let Some(handler) = action.handler {
            handler(&ConfirmContext { option_checked });
        }
    }
}
