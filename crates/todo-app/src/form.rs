//! Login/sign-up form state and its action buttons.

use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    SignIn,
    SignUp,
}

impl FormAction {
    pub fn label(&self) -> &'static str {
        match self {
            FormAction::SignIn => "Sign In",
            FormAction::SignUp => "Sign Up",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonColors {
    pub background_color: String,
    pub text_color: String,
}

impl Default for ButtonColors {
    fn default() -> Self {
        Self {
            background_color: "#3ECF8E".into(),
            text_color: "#fff".into(),
        }
    }
}

/// Render description of one action button.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonSpec {
    pub action: FormAction,
    pub colors: ButtonColors,
    pub disabled: bool,
}

impl ButtonSpec {
    pub fn label(&self) -> &'static str {
        self.action.label()
    }

    /// Half opacity while pressed or disabled.
    pub fn opacity(&self, pressed: bool) -> f32 {
        if pressed || self.disabled {
            0.5
        } else {
            1.0
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        match field {
            Field::Email => self.email = value.into(),
            Field::Password => self.password = value.into(),
        }
    }

    /// Both fields filled in.
    pub fn is_valid(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }

    pub fn buttons(&self) -> [ButtonSpec; 2] {
        let disabled = !self.is_valid();
        [
            ButtonSpec {
                action: FormAction::SignIn,
                colors: ButtonColors::default(),
                disabled,
            },
            ButtonSpec {
                action: FormAction::SignUp,
                colors: ButtonColors {
                    background_color: "#6B7280".into(),
                    text_color: "#fff".into(),
                },
                disabled,
            },
        ]
    }

    /// Press an action button. Returns whether the press was accepted.
    ///
    /// Neither action is wired to a backend call yet.
    pub fn press(&self, action: FormAction) -> bool {
        if !self.is_valid() {
            debug!("{} pressed while disabled", action.label());
            return false;
        }
        debug!("{} pressed", action.label());
        true
    }
}
