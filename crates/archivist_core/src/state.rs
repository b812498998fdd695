use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-side effect attached to a state button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonAction {
    #[default]
    None,
    OpenLog,
    ExportArchive,
    Terminate,
}

/// One selectable response offered by an interactive state.
///
/// `client_object` is echoed back by the client in `STATE_INPUT` when the
/// button is pressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub text: String,
    #[serde(default)]
    pub shared_action: ButtonAction,
    #[serde(default = "default_client_object")]
    pub client_object: Value,
}

fn default_client_object() -> Value {
    Value::Bool(true)
}

impl ButtonConfig {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            shared_action: ButtonAction::None,
            client_object: default_client_object(),
        }
    }

    pub fn with_action(mut self, action: ButtonAction) -> Self {
        self.shared_action = action;
        self
    }
}

/// Immutable descriptor of one point in a job's lifecycle.
///
/// A state is interactive exactly when it offers buttons; the job suspends on
/// interactive states until the client answers. Progressive states only
/// report status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub note: String,
    #[serde(default)]
    hint: String,
    #[serde(default)]
    button_configs: Option<Vec<ButtonConfig>>,
    #[serde(default = "default_indeterminate")]
    pub indeterminate: bool,
}

fn default_indeterminate() -> bool {
    true
}

impl JobState {
    pub fn progressive(note: impl Into<String>) -> Self {
        Self {
            note: note.into(),
            hint: String::new(),
            button_configs: None,
            indeterminate: true,
        }
    }

    /// An interactive state with at least one button.
    pub fn interactive(
        note: impl Into<String>,
        first: ButtonConfig,
        rest: Vec<ButtonConfig>,
    ) -> Self {
        let mut buttons = Vec::with_capacity(1 + rest.len());
        buttons.push(first);
        buttons.extend(rest);
        Self {
            note: note.into(),
            hint: String::new(),
            button_configs: Some(buttons),
            indeterminate: true,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    /// Progress for this state is reported as a fraction rather than a spinner.
    pub fn determinate(mut self) -> Self {
        self.indeterminate = false;
        self
    }

    pub fn hint(&self) -> Option<&str> {
        if self.hint.is_empty() {
            None
        } else {
            Some(&self.hint)
        }
    }

    pub fn buttons(&self) -> Option<&[ButtonConfig]> {
        self.button_configs.as_deref()
    }

    pub fn is_interactive(&self) -> bool {
        self.button_configs.is_some()
    }

    pub fn is_progressive(&self) -> bool {
        !self.is_interactive()
    }

    /// Wire form of the state. Every field is a string, bool or JSON value,
    /// so serialization cannot fail.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    // Lifecycle states shared by every job kind.

    pub fn initializing() -> Self {
        Self::progressive("Initializing... Please wait...")
    }

    pub fn auth_required() -> Self {
        Self::interactive("Please sign in to continue.", ButtonConfig::new("Proceed"), vec![])
            .with_hint("Sign in on the browser before pressing 'Proceed'")
    }

    pub fn validating_session() -> Self {
        Self::progressive("Validating session...")
    }

    pub fn session_invalid() -> Self {
        Self::interactive("Session invalid. Please try again.", ButtonConfig::new("OK"), vec![])
    }

    pub fn network_error(code: &str) -> Self {
        Self::interactive(
            "Network error. Please check your connection.",
            ButtonConfig::new("Retry"),
            vec![],
        )
        .with_hint(code)
    }

    pub fn attempting_reconnect() -> Self {
        Self::progressive("Attempting to reconnect...")
    }

    pub fn archiving() -> Self {
        Self::progressive("Archiving...")
            .with_hint("Please do not interfere with the browser.")
            .determinate()
    }

    pub fn result_available() -> Self {
        Self::interactive(
            "Operation completed successfully.",
            ButtonConfig::new("Export").with_action(ButtonAction::ExportArchive),
            vec![ButtonConfig::new("Close").with_action(ButtonAction::Terminate)],
        )
    }

    pub fn internal_error() -> Self {
        Self::interactive(
            "An internal error occurred. Open log?",
            ButtonConfig::new("OK").with_action(ButtonAction::OpenLog),
            vec![ButtonConfig::new("Close").with_action(ButtonAction::Terminate)],
        )
        .with_hint("Please notify the developer (Help → Report Bug)")
    }
}
